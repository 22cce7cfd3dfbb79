//! # Capture Configuration
//!
//! Settings fixed at install time. The host (normally the managed-runtime
//! bridge) decides where reports go; the unwinding limits have defaults that
//! suit mobile stacks and rarely need changing.
//!
//! ## Environment Variables
//!
//! [`CaptureConfig::from_env`] reads:
//!
//! - `FAULTLINE_STORAGE_DIR`: directory reports are written to (required)
//! - `FAULTLINE_MAX_FRAMES`: maximum raw frames per capture
//! - `FAULTLINE_SCAN_WINDOW`: stack words examined per manual-scan step

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CaptureError, CaptureResult};
use crate::types::MAX_FRAMES;

/// Number of innermost raw frames that belong to the handler itself and are
/// never classified.
pub const HANDLER_FRAMES_TO_SKIP: usize = 2;

/// Default number of stack words the manual scanner examines per frame.
pub const DEFAULT_SCAN_WINDOW_WORDS: usize = 40;

/// Upper bound on the scan window; sizes the scanner's stack buffer.
pub const MAX_SCAN_WINDOW_WORDS: usize = 256;

/// Install-time settings for the crash handler.
///
/// ## Example
///
/// ```rust
/// use faultline_core::config::CaptureConfig;
///
/// let config = CaptureConfig::new("/data/local/tmp/crashes")
///     .with_max_depth(64)
///     .with_scan_window(16);
/// assert_eq!(config.max_depth(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig
{
    storage_dir: PathBuf,
    max_depth: usize,
    scan_window: usize,
}

impl CaptureConfig
{
    /// Defaults for everything but the storage directory.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self
    {
        Self {
            storage_dir: storage_dir.into(),
            max_depth: MAX_FRAMES,
            scan_window: DEFAULT_SCAN_WINDOW_WORDS,
        }
    }

    /// Build a configuration from `FAULTLINE_*` environment variables.
    ///
    /// ## Errors
    ///
    /// - `InvalidConfig`: `FAULTLINE_STORAGE_DIR` is missing, or a numeric
    ///   variable does not parse
    pub fn from_env() -> CaptureResult<Self>
    {
        let storage_dir = env::var_os("FAULTLINE_STORAGE_DIR")
            .ok_or_else(|| CaptureError::InvalidConfig("FAULTLINE_STORAGE_DIR is not set".to_string()))?;
        let mut config = Self::new(storage_dir);

        if let Some(depth) = read_usize("FAULTLINE_MAX_FRAMES")? {
            config = config.with_max_depth(depth);
        }
        if let Some(window) = read_usize("FAULTLINE_SCAN_WINDOW")? {
            config = config.with_scan_window(window);
        }

        debug!(?config, "capture configuration read from environment");
        Ok(config)
    }

    /// Maximum number of raw frames collected per crash.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self
    {
        self.max_depth = max_depth;
        self
    }

    /// Number of stack words examined per manual-scan step.
    #[must_use]
    pub fn with_scan_window(mut self, words: usize) -> Self
    {
        self.scan_window = words;
        self
    }

    pub fn storage_dir(&self) -> &Path
    {
        &self.storage_dir
    }

    pub fn max_depth(&self) -> usize
    {
        self.max_depth
    }

    pub fn scan_window(&self) -> usize
    {
        self.scan_window
    }

    /// Check limits and that the storage directory exists.
    ///
    /// ## Errors
    ///
    /// - `InvalidConfig`: a limit is out of range or the storage path is not a directory
    /// - `Io`: the storage path could not be inspected
    pub fn validate(&self) -> CaptureResult<()>
    {
        if self.max_depth == 0 || self.max_depth > MAX_FRAMES {
            return Err(CaptureError::InvalidConfig(format!(
                "max depth must be between 1 and {MAX_FRAMES}, got {}",
                self.max_depth
            )));
        }
        if self.scan_window == 0 || self.scan_window > MAX_SCAN_WINDOW_WORDS {
            return Err(CaptureError::InvalidConfig(format!(
                "scan window must be between 1 and {MAX_SCAN_WINDOW_WORDS} words, got {}",
                self.scan_window
            )));
        }
        if !std::fs::metadata(&self.storage_dir)?.is_dir() {
            return Err(CaptureError::InvalidConfig(format!(
                "{} is not a directory",
                self.storage_dir.display()
            )));
        }
        Ok(())
    }
}

fn read_usize(name: &str) -> CaptureResult<Option<usize>>
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| CaptureError::InvalidConfig(format!("{name}={raw}: {err}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(CaptureError::InvalidConfig(format!("{name}: {err}"))),
    }
}
