//! Runtime-located unwinding libraries, seen through narrow traits.
//!
//! The selector never talks to `libunwind` or `libcorkscrew` directly. It asks
//! an [`UnwindBackends`] for each library on every crash and gets back a
//! [`Capability`]: either a usable handle or `Unavailable`. The live
//! implementation looks the libraries up with `dlopen`; tests hand in fakes.

use crate::platform::MachineContext;
use crate::types::{Address, MethodName, MAX_FRAMES, METHOD_NAME_CAPACITY};

/// Words reserved for an opaque `unw_cursor_t`. The ARM cursor is the largest
/// at 32 KiB.
pub const CURSOR_WORDS: usize = 4096;

/// Words reserved for an `unw_context_t` seeded from the signal context.
pub const CONTEXT_WORDS: usize = 1024;

/// A runtime-resolved library: present with all required entry points, or not.
#[derive(Debug)]
pub enum Capability<T>
{
    Available(T),
    Unavailable,
}

impl<T> Capability<T>
{
    pub fn is_available(&self) -> bool
    {
        matches!(self, Capability::Available(_))
    }

    pub fn into_option(self) -> Option<T>
    {
        match self {
            Capability::Available(value) => Some(value),
            Capability::Unavailable => None,
        }
    }
}

impl<T> From<Option<T>> for Capability<T>
{
    fn from(value: Option<T>) -> Self
    {
        match value {
            Some(value) => Capability::Available(value),
            None => Capability::Unavailable,
        }
    }
}

/// A positioned cursor of a full unwinder.
pub trait UnwindCursor
{
    /// Instruction pointer of the current frame.
    fn instruction_pointer(&mut self) -> Option<Address>;

    /// Write the current procedure's name into `name` and return the
    /// instruction's offset into that procedure. Zero means the unwinder
    /// knows no procedure here, which ends the walk.
    fn procedure_name(&mut self, name: &mut MethodName) -> usize;

    /// Move to the caller's frame. `false` when there is none.
    fn step(&mut self) -> bool;
}

/// A library able to walk the stack frame by frame from a machine context.
pub trait FullUnwinder
{
    /// Seed a cursor from `context` and hand it to `walk`.
    ///
    /// Returns `false` without calling `walk` when the cursor cannot be
    /// initialised.
    fn with_cursor(
        &self,
        context: &MachineContext,
        scratch: &mut UnwindScratch,
        walk: &mut dyn FnMut(&mut dyn UnwindCursor),
    ) -> bool;
}

/// One frame of a legacy one-shot backtrace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyFrame<'a>
{
    /// Absolute program counter of the frame.
    pub address: Address,
    /// Symbol name, when the library found one.
    pub symbol: Option<&'a str>,
    /// Name of the mapping (file) containing `address`.
    pub map: Option<&'a str>,
}

/// A library that produces a whole symbolised backtrace in one call.
pub trait LegacyBacktrace
{
    /// Capture at most `max_depth` frames and pass each to `visit`, innermost first.
    fn backtrace(
        &self,
        context: &MachineContext,
        scratch: &mut UnwindScratch,
        max_depth: usize,
        visit: &mut dyn FnMut(LegacyFrame<'_>),
    );
}

/// Source of unwinding libraries, consulted fresh on every crash.
pub trait UnwindBackends
{
    type Full: FullUnwinder;
    type Legacy: LegacyBacktrace;

    fn full_unwinder(&self) -> Capability<Self::Full>;

    fn legacy_backtrace(&self) -> Capability<Self::Legacy>;
}

/// Memory the unwinding libraries write into, sized once at install.
pub struct UnwindScratch
{
    pub(crate) cursor: Box<[u64]>,
    pub(crate) context: Box<[u64]>,
    pub(crate) name: Box<[u8]>,
    pub(crate) legacy_frames: Box<[[usize; 3]]>,
    pub(crate) legacy_symbols: Box<[[usize; 5]]>,
}

impl UnwindScratch
{
    pub fn new() -> Self
    {
        Self {
            cursor: vec![0; CURSOR_WORDS].into_boxed_slice(),
            context: vec![0; CONTEXT_WORDS].into_boxed_slice(),
            name: vec![0; METHOD_NAME_CAPACITY].into_boxed_slice(),
            legacy_frames: vec![[0; 3]; MAX_FRAMES].into_boxed_slice(),
            legacy_symbols: vec![[0; 5]; MAX_FRAMES].into_boxed_slice(),
        }
    }

    /// Zero every buffer.
    pub fn wipe(&mut self)
    {
        self.cursor.fill(0);
        self.context.fill(0);
        self.name.fill(0);
        self.legacy_frames.fill([0; 3]);
        self.legacy_symbols.fill([0; 5]);
    }
}

impl Default for UnwindScratch
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl std::fmt::Debug for UnwindScratch
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("UnwindScratch")
            .field("cursor_words", &self.cursor.len())
            .field("context_words", &self.context.len())
            .finish_non_exhaustive()
    }
}

/// Backends with no library at all. Every crash goes straight to the stack scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackends;

/// Uninhabited unwinder used by [`NoBackends`].
#[derive(Debug)]
pub enum Never {}

impl FullUnwinder for Never
{
    fn with_cursor(&self, _: &MachineContext, _: &mut UnwindScratch, _: &mut dyn FnMut(&mut dyn UnwindCursor)) -> bool
    {
        match *self {}
    }
}

impl LegacyBacktrace for Never
{
    fn backtrace(&self, _: &MachineContext, _: &mut UnwindScratch, _: usize, _: &mut dyn FnMut(LegacyFrame<'_>))
    {
        match *self {}
    }
}

impl UnwindBackends for NoBackends
{
    type Full = Never;
    type Legacy = Never;

    fn full_unwinder(&self) -> Capability<Never>
    {
        Capability::Unavailable
    }

    fn legacy_backtrace(&self) -> Capability<Never>
    {
        Capability::Unavailable
    }
}
