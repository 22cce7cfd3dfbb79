//! Stack memory access for the manual scanner.

use std::mem::size_of;

use crate::types::Address;

const WORD: usize = size_of::<usize>();

/// Word-granular reads of the crashed thread's stack.
///
/// Reads must never fault: an unreadable word ends the read early.
pub trait StackMemory
{
    /// Fill `out` with consecutive words starting at `start`.
    ///
    /// Returns how many leading words of `out` were actually read.
    fn read_words(&self, start: Address, out: &mut [usize]) -> usize;
}

impl<M: StackMemory + ?Sized> StackMemory for &M
{
    fn read_words(&self, start: Address, out: &mut [usize]) -> usize
    {
        (**self).read_words(start, out)
    }
}

/// Half-open range `[start, end)` of stack addresses the scanner may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSpan
{
    pub start: Address,
    pub end: Address,
}

impl StackSpan
{
    pub const fn new(start: Address, end: Address) -> Self
    {
        Self { start, end }
    }

    /// A span starting at the stack pointer with no known upper bound.
    pub const fn from_pointer(stack_pointer: Address) -> Self
    {
        Self {
            start: stack_pointer,
            end: Address::new(usize::MAX),
        }
    }

    /// Whole words available from `at` to the end of the span.
    pub fn words_from(&self, at: Address) -> usize
    {
        if at < self.start {
            return 0;
        }
        self.end.offset_from(at).map_or(0, |bytes| bytes / WORD)
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}
