//! Raw and classified stack frame types.

use std::fmt;

use super::{Address, BoundedStr};

/// Maximum stored length of a method (procedure/symbol) name, in bytes.
pub const METHOD_NAME_CAPACITY: usize = 1024;

/// Maximum stored length of an owning file path, in bytes.
pub const FILE_PATH_CAPACITY: usize = 512;

/// Capacity of both the raw trace and the report's frame array.
pub const MAX_FRAMES: usize = 200;

/// Method name buffer used by raw and classified frames.
pub type MethodName = BoundedStr<METHOD_NAME_CAPACITY>;

/// File path buffer used by classified frames.
pub type FilePath = BoundedStr<FILE_PATH_CAPACITY>;

/// One unclassified entry produced by an unwind strategy.
#[derive(Debug, Clone, Default)]
pub struct RawFrame
{
    /// Return address (or the program counter for the innermost frame).
    pub address: Address,
    /// Procedure name reported by the unwinder, empty when it gave none.
    pub name: MethodName,
}

impl RawFrame
{
    fn reset(&mut self)
    {
        self.address = Address::ZERO;
        self.name.clear();
    }
}

/// Pre-allocated, depth-limited sequence of [`RawFrame`]s.
///
/// The backing slots are allocated once (at install) and every capture starts
/// with [`RawTrace::begin`], which wipes all of them and sets the depth limit
/// for this run. Nothing past the limit can be recorded.
pub struct RawTrace
{
    slots: Box<[RawFrame]>,
    len: usize,
    limit: usize,
}

impl RawTrace
{
    /// Allocate `capacity` empty slots.
    pub fn with_capacity(capacity: usize) -> Self
    {
        Self {
            slots: (0..capacity).map(|_| RawFrame::default()).collect(),
            len: 0,
            limit: capacity,
        }
    }

    /// Wipe every slot and accept at most `max_depth` frames from now on.
    pub fn begin(&mut self, max_depth: usize)
    {
        for slot in self.slots.iter_mut() {
            slot.reset();
        }
        self.len = 0;
        self.limit = max_depth.min(self.slots.len());
    }

    /// Drop every recorded frame but keep the current depth limit.
    pub fn discard(&mut self)
    {
        for slot in &mut self.slots[..self.len] {
            slot.reset();
        }
        self.len = 0;
    }

    pub fn len(&self) -> usize
    {
        self.len
    }

    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// Depth limit of the current run.
    pub fn limit(&self) -> usize
    {
        self.limit
    }

    pub fn is_full(&self) -> bool
    {
        self.len >= self.limit
    }

    /// Record a frame with no name. Returns `false` once the limit is reached.
    pub fn push(&mut self, address: Address) -> bool
    {
        self.push_named(address, "")
    }

    /// Record a frame with a name. Returns `false` once the limit is reached.
    pub fn push_named(&mut self, address: Address, name: &str) -> bool
    {
        let Some(slot) = self.pending_mut() else {
            return false;
        };
        slot.address = address;
        slot.name.set(name);
        self.commit();
        true
    }

    /// The next free slot, cleared, without counting it yet.
    ///
    /// Fill it in and call [`RawTrace::commit`] to keep it; leaving it
    /// uncommitted means the next call hands out the same slot again.
    pub fn pending_mut(&mut self) -> Option<&mut RawFrame>
    {
        if self.is_full() {
            return None;
        }
        let slot = &mut self.slots[self.len];
        slot.reset();
        Some(slot)
    }

    /// Count the slot handed out by [`RawTrace::pending_mut`].
    pub fn commit(&mut self)
    {
        if !self.is_full() {
            self.len += 1;
        }
    }

    /// Recorded frames, innermost first.
    pub fn frames(&self) -> &[RawFrame]
    {
        &self.slots[..self.len]
    }

    /// Recorded addresses, mostly useful for assertions.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_
    {
        self.frames().iter().map(|frame| frame.address)
    }
}

impl fmt::Debug for RawTrace
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("RawTrace")
            .field("frames", &self.frames())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Which strategy produced a raw trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwindStrategy
{
    /// Nothing captured yet.
    #[default]
    None,
    /// Runtime-loaded libunwind cursor walk.
    FullUnwinder,
    /// Legacy libcorkscrew one-shot backtrace.
    LegacyBacktrace,
    /// Heuristic scan of stack memory.
    StackScan,
    /// Only the program counter.
    Basic,
}

impl UnwindStrategy
{
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::None => "none",
            Self::FullUnwinder => "libunwind",
            Self::LegacyBacktrace => "libcorkscrew",
            Self::StackScan => "stack-scan",
            Self::Basic => "basic",
        }
    }
}

impl fmt::Display for UnwindStrategy
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// A resolved and classified frame as it appears in the crash report.
#[derive(Debug, Clone, Default)]
pub struct StackFrame
{
    /// Path of the object file that owns the address.
    pub file: FilePath,
    /// The raw frame address.
    pub frame_address: Address,
    /// Unwinder-supplied name, or the nearest dynamic symbol.
    pub method: MethodName,
    /// Load base of the owning file.
    pub file_address: Address,
    /// Start of the nearest preceding symbol, when one was found.
    pub method_address: Option<Address>,
    /// `frame_address - file_address`.
    pub file_offset: usize,
    /// `frame_address - method_address`, present only with `method_address`.
    pub method_offset: Option<usize>,
    /// `false` for system libraries and compiler helper routines.
    pub in_project: bool,
}

impl StackFrame
{
    /// Overwrite every field, including the full string buffers.
    pub fn clear(&mut self)
    {
        self.file.clear();
        self.frame_address = Address::ZERO;
        self.method.clear();
        self.file_address = Address::ZERO;
        self.method_address = None;
        self.file_offset = 0;
        self.method_offset = None;
        self.in_project = false;
    }
}
