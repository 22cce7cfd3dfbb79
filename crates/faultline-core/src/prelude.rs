//! Common module for library exports

pub use crate::config::CaptureConfig;
pub use crate::error::{CaptureError, CaptureResult};
pub use crate::handler::CrashHandler;
pub use crate::report::{JsonSerializer, ReportSerializer};
pub use crate::types::address::Address;
pub use crate::types::{CrashReport, FatalSignal, FaultInfo, ReportMetadata, StackFrame, UnwindStrategy};
