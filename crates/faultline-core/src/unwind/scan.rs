//! Heuristic stack scanning.
//!
//! With no unwinding library available, the best remaining evidence of the
//! call chain is the stack itself: return addresses pushed by each call are
//! still there, mixed in with locals and spilled registers. The scanner walks
//! upward from the stack pointer and keeps every word that the frame
//! validator accepts as a return address into application code.
//!
//! The scan looks at a bounded window of words per step. The first plausible
//! word in the window becomes the next frame and the next window starts just
//! past it; a window with nothing plausible ends the scan.

use std::mem::size_of;

use super::memory::{StackMemory, StackSpan};
use crate::config::MAX_SCAN_WINDOW_WORDS;
use crate::symbols::{is_plausible_return_address, SymbolResolver};
use crate::types::{Address, RawTrace};

/// Scan `span` for return addresses and append them to `trace`.
///
/// `program_counter` is recorded first when it is itself plausible. Returns
/// the number of frames in `trace` afterwards. Never allocates; the window
/// lives on the stack and is capped at [`MAX_SCAN_WINDOW_WORDS`].
pub fn scan_stack<M, R>(
    program_counter: Address,
    span: StackSpan,
    memory: &M,
    resolver: &R,
    window_words: usize,
    trace: &mut RawTrace,
) -> usize
where
    M: StackMemory + ?Sized,
    R: SymbolResolver + ?Sized,
{
    let window_words = window_words.clamp(1, MAX_SCAN_WINDOW_WORDS);
    let mut window = [0usize; MAX_SCAN_WINDOW_WORDS];

    if is_plausible_return_address(resolver, program_counter) {
        trace.push(program_counter);
    }

    let mut cursor = span.start;
    while !trace.is_full() {
        let wanted = span.words_from(cursor).min(window_words);
        if wanted == 0 {
            break;
        }

        let read = memory.read_words(cursor, &mut window[..wanted]);
        let hit = window[..read]
            .iter()
            .position(|&word| is_plausible_return_address(resolver, Address::new(word)));
        let Some(index) = hit else {
            break;
        };

        trace.push(Address::new(window[index]));

        match cursor.checked_add((index + 1) * size_of::<usize>()) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    trace.len()
}
