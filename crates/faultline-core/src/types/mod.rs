//! # Types
//!
//! Data model shared by every component of the engine: addresses, bounded
//! strings, raw and classified frames, fault information and the crash report.
//!
//! Everything here that is touched from the signal handler is fixed-capacity
//! and allocated up front; filling it never allocates.

pub mod address;
pub mod arch;
pub mod bounded;
pub mod frame;
pub mod report;
pub mod signal;

// Re-export all public types
pub use address::Address;
pub use arch::Architecture;
pub use bounded::BoundedStr;
pub use frame::{
    FilePath, MethodName, RawFrame, RawTrace, StackFrame, UnwindStrategy, FILE_PATH_CAPACITY, MAX_FRAMES,
    METHOD_NAME_CAPACITY,
};
pub use report::{CrashReport, MetadataEntry, ReportMetadata, ERROR_CLASS_CAPACITY, MESSAGE_CAPACITY};
pub use signal::{signal_name, FatalSignal, FaultInfo};
