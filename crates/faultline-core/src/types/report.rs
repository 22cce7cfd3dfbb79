//! Crash report model.
//!
//! A [`CrashReport`] is created once at install time from the metadata the
//! host supplies and is then reused for every capture. Only the technical
//! fields (fault info, message, class, frames) are touched on the crash path,
//! and all of them are wiped before a capture writes into them.

use std::path::{Path, PathBuf};

use super::frame::{StackFrame, UnwindStrategy, MAX_FRAMES};
use super::signal::FaultInfo;
use super::BoundedStr;

/// Maximum length of the exception message.
pub const MESSAGE_CAPACITY: usize = 256;

/// Maximum length of the exception class.
pub const ERROR_CLASS_CAPACITY: usize = 64;

/// One host-supplied metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry
{
    /// Grouping such as `"app"`, `"device"` or `"user"`.
    pub section: String,
    pub key: String,
    pub value: String,
}

/// Application/user metadata populated by the host before install.
///
/// The engine never reads or modifies it; it is handed to the serializer
/// untouched with every report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata
{
    entries: Vec<MetadataEntry>,
}

impl ReportMetadata
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append an entry, builder style.
    #[must_use]
    pub fn with(mut self, section: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self
    {
        self.insert(section, key, value);
        self
    }

    /// Append an entry.
    pub fn insert(&mut self, section: impl Into<String>, key: impl Into<String>, value: impl Into<String>)
    {
        self.entries.push(MetadataEntry {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn entries(&self) -> &[MetadataEntry]
    {
        &self.entries
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

/// The report handed to the serializer once per captured crash.
pub struct CrashReport
{
    fault: FaultInfo,
    message: BoundedStr<MESSAGE_CAPACITY>,
    error_class: BoundedStr<ERROR_CLASS_CAPACITY>,
    frames: Box<[StackFrame]>,
    frames_used: usize,
    unwinder: UnwindStrategy,
    timestamp: i64,
    storage_dir: PathBuf,
    metadata: ReportMetadata,
}

impl CrashReport
{
    /// Allocate a report skeleton with [`MAX_FRAMES`] frame slots.
    pub fn new(storage_dir: impl Into<PathBuf>, metadata: ReportMetadata) -> Self
    {
        Self::with_frame_capacity(storage_dir, metadata, MAX_FRAMES)
    }

    /// Allocate a report skeleton with a custom number of frame slots.
    pub fn with_frame_capacity(storage_dir: impl Into<PathBuf>, metadata: ReportMetadata, capacity: usize) -> Self
    {
        Self {
            fault: FaultInfo::default(),
            message: BoundedStr::new(),
            error_class: BoundedStr::new(),
            frames: (0..capacity).map(|_| StackFrame::default()).collect(),
            frames_used: 0,
            unwinder: UnwindStrategy::None,
            timestamp: 0,
            storage_dir: storage_dir.into(),
            metadata,
        }
    }

    /// Wipe every technical field, including all frame slots.
    pub fn reset(&mut self)
    {
        self.fault = FaultInfo::default();
        self.message.clear();
        self.error_class.clear();
        for frame in self.frames.iter_mut() {
            frame.clear();
        }
        self.frames_used = 0;
        self.unwinder = UnwindStrategy::None;
        self.timestamp = 0;
    }

    pub fn fault(&self) -> FaultInfo
    {
        self.fault
    }

    pub fn message(&self) -> &str
    {
        self.message.as_str()
    }

    pub fn error_class(&self) -> &str
    {
        self.error_class.as_str()
    }

    /// The classified frames actually used, innermost first.
    pub fn stack_trace(&self) -> &[StackFrame]
    {
        &self.frames[..self.frames_used]
    }

    pub fn frames_used(&self) -> usize
    {
        self.frames_used
    }

    pub fn frame_capacity(&self) -> usize
    {
        self.frames.len()
    }

    /// Strategy that produced the raw trace behind this report.
    pub fn unwinder(&self) -> UnwindStrategy
    {
        self.unwinder
    }

    /// Unix time (seconds) of the capture.
    pub fn timestamp(&self) -> i64
    {
        self.timestamp
    }

    pub fn storage_dir(&self) -> &Path
    {
        &self.storage_dir
    }

    pub fn metadata(&self) -> &ReportMetadata
    {
        &self.metadata
    }

    pub(crate) fn set_fault(&mut self, fault: FaultInfo)
    {
        self.fault = fault;
    }

    pub(crate) fn set_unwinder(&mut self, unwinder: UnwindStrategy)
    {
        self.unwinder = unwinder;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: i64)
    {
        self.timestamp = timestamp;
    }

    pub(crate) fn message_mut(&mut self) -> &mut BoundedStr<MESSAGE_CAPACITY>
    {
        &mut self.message
    }

    pub(crate) fn error_class_mut(&mut self) -> &mut BoundedStr<ERROR_CLASS_CAPACITY>
    {
        &mut self.error_class
    }

    /// Next unused frame slot, already cleared, or `None` when the report is full.
    pub(crate) fn next_frame_slot(&mut self) -> Option<&mut StackFrame>
    {
        let slot = self.frames.get_mut(self.frames_used)?;
        slot.clear();
        Some(slot)
    }

    /// Count the slot returned by [`CrashReport::next_frame_slot`].
    pub(crate) fn commit_frame(&mut self)
    {
        if self.frames_used < self.frames.len() {
            self.frames_used += 1;
        }
    }
}

impl std::fmt::Debug for CrashReport
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CrashReport")
            .field("fault", &self.fault)
            .field("message", &self.message)
            .field("error_class", &self.error_class)
            .field("frames_used", &self.frames_used)
            .field("unwinder", &self.unwinder)
            .field("storage_dir", &self.storage_dir)
            .finish_non_exhaustive()
    }
}
