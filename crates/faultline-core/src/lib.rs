//! # faultline-core
//!
//! Native crash capture for processes that host a managed runtime.
//!
//! When native code dies on a fatal signal, this crate records a best-effort
//! stack trace of the faulting thread, classifies each frame as application
//! or system code, and hands a structured report to a serializer that writes
//! it to disk. The previous signal disposition then runs as if nothing had
//! intervened, so normal termination and tombstones are unaffected.
//!
//! ## Components
//!
//! - [`handler`]: install/teardown and the signal handler itself
//! - [`unwind`]: strategy selector (`libunwind`, `libcorkscrew`, stack scan, PC only)
//! - [`symbols`]: frame validator and system/application classification
//! - [`report`]: report assembly, the serializer trait and JSON output
//! - [`platform`]: `sigaction`, `ucontext_t`, `dladdr`, `dlopen` and raw I/O
//!
//! ## Platform Support
//!
//! - **Android / Linux**: 32- and 64-bit ARM, x86 and x86-64
//! - Anything else fails to build
//!
//! ## Why unsafe code is needed
//!
//! A signal handler receives raw kernel pointers and may only call
//! async-signal-safe functions, most of which are plain libc. Unsafe calls are
//! kept in [`platform`] and the handler entry point, behind safe wrappers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::prelude::*;
//!
//! let config = CaptureConfig::new("/data/data/com.example/crashes");
//! let metadata = ReportMetadata::new().with("app", "version", "1.2.0");
//! let handler = CrashHandler::install(config, metadata, JsonSerializer)?;
//! // ... run native code ...
//! handler.teardown();
//! # Ok::<(), faultline_core::error::CaptureError>(())
//! ```

#![allow(unsafe_code)] // Required for signal handling and libc calls

pub mod config;
pub mod error;
pub mod handler;
pub mod platform;
pub mod prelude;
pub mod report;
pub mod symbols;
pub mod types;
pub mod unwind;

pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult};
pub use handler::{CaptureGate, CrashHandler, GateEntry};
pub use report::{JsonSerializer, ReportSerializer};
pub use types::{CrashReport, FatalSignal, ReportMetadata};
