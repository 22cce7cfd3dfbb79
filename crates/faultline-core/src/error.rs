//! # Error Types
//!
//! Errors for the parts of the engine that run on a normal thread: install,
//! teardown and configuration.
//!
//! The capture path inside the signal handler never produces these. It has
//! no channel to report failures other than leaving data out of the report,
//! so every failure there is handled locally and silently.
//!
//! We use `thiserror` to generate the `Error` implementations.

use std::io;

use thiserror::Error;

/// Main error type for engine setup.
///
/// ## Error Categories
///
/// 1. **Lifecycle errors**: AlreadyInstalled
/// 2. **Configuration errors**: InvalidConfig
/// 3. **Platform errors**: SignalInstall
/// 4. **I/O errors**: Io (storage directory checks)
#[derive(Error, Debug)]
pub enum CaptureError
{
    /// A crash handler is already installed in this process
    ///
    /// The engine keeps one process-wide installation. Tear the existing
    /// [`CrashHandler`](crate::CrashHandler) down before installing again.
    #[error("Crash handler is already installed")]
    AlreadyInstalled,

    /// Configuration rejected by [`CaptureConfig::validate`](crate::config::CaptureConfig::validate)
    ///
    /// Examples:
    /// - max depth of zero or above the frame capacity
    /// - scan window of zero or above the window cap
    /// - storage directory that is not an existing directory
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `sigaction` refused to install the handler for a signal
    ///
    /// Any dispositions replaced before the failure have already been put
    /// back when this is returned.
    #[error("Failed to install handler for signal {signal}: {source}")]
    SignalInstall
    {
        /// Raw signal number
        signal: i32,
        /// `errno` reported by `sigaction`
        #[source]
        source: io::Error,
    },

    /// I/O error while checking the storage directory
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience type alias for `Result<T, CaptureError>`
///
/// ```rust
/// use faultline_core::error::CaptureResult;
/// fn foo() -> CaptureResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
