//! # Crash Reports
//!
//! Turning a raw trace into a report and getting that report onto disk:
//!
//! - [`builder`]: classifies raw frames and fills the exception summary
//! - [`persist`]: report file naming and the raw-fd output sink
//! - [`json`]: the reference [`ReportSerializer`]
//!
//! The report format itself is pluggable. The engine calls the installed
//! serializer exactly once per captured crash, after classification and
//! before the previous signal disposition runs.

pub mod builder;
pub mod json;
pub mod persist;

use std::fmt;

pub use builder::build_report;
pub use json::JsonSerializer;
pub use persist::{write_report, FdSink, ReportPath};

use crate::types::CrashReport;

/// Writes a [`CrashReport`] in some output format.
///
/// Called from the signal handler: implementations must not allocate, lock
/// or panic. Everything needed is already in the report.
pub trait ReportSerializer: Send + Sync
{
    /// File extension for persisted reports, without the dot.
    fn extension(&self) -> &'static str;

    /// Write the whole report to `sink`.
    fn serialize(&self, report: &CrashReport, sink: &mut dyn fmt::Write) -> fmt::Result;
}

impl<S: ReportSerializer + ?Sized> ReportSerializer for Box<S>
{
    fn extension(&self) -> &'static str
    {
        (**self).extension()
    }

    fn serialize(&self, report: &CrashReport, sink: &mut dyn fmt::Write) -> fmt::Result
    {
        (**self).serialize(report, sink)
    }
}
