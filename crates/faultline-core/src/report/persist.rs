//! Writing reports to the storage directory.
//!
//! One file per crash, named `<storage dir>/<unix seconds>.<extension>`. The
//! path is formatted into a fixed buffer and the file is written through a
//! raw descriptor with a small stack buffer, so persisting a report needs
//! nothing beyond `open`, `write`, `fsync` and `close`.
//!
//! Failure anywhere means the report is dropped. There is nobody to tell.

use std::ffi::CStr;
use std::fmt::{self, Write};
use std::path::Path;

use libc::c_int;

use super::ReportSerializer;
use crate::error::{CaptureError, CaptureResult};
use crate::types::{BoundedStr, CrashReport, FILE_PATH_CAPACITY};

/// Room for the storage prefix plus `<timestamp>.<extension>` and a NUL.
pub const REPORT_PATH_CAPACITY: usize = FILE_PATH_CAPACITY + 64;

/// Full path of one report file.
pub type ReportPath = BoundedStr<REPORT_PATH_CAPACITY>;

/// Storage directory with a guaranteed trailing `/`.
pub type StoragePrefix = BoundedStr<FILE_PATH_CAPACITY>;

const SINK_BUFFER_LEN: usize = 512;

/// Turn the configured storage directory into the prefix used for report paths.
///
/// ## Errors
///
/// - `InvalidConfig`: the path is not UTF-8 or does not fit in [`FILE_PATH_CAPACITY`]
pub fn storage_prefix(dir: &Path) -> CaptureResult<StoragePrefix>
{
    let text = dir
        .to_str()
        .ok_or_else(|| CaptureError::InvalidConfig(format!("{} is not valid UTF-8", dir.display())))?;

    let mut prefix = StoragePrefix::new();
    prefix.set(text);
    if !text.ends_with('/') {
        prefix.push_str("/");
    }
    if prefix.is_truncated() {
        return Err(CaptureError::InvalidConfig(format!(
            "storage directory path is longer than {FILE_PATH_CAPACITY} bytes"
        )));
    }
    Ok(prefix)
}

/// `<prefix><timestamp>.<extension>`. Check `is_truncated()` before use.
pub fn report_path(prefix: &str, timestamp: i64, extension: &str) -> ReportPath
{
    let mut path = ReportPath::new();
    let _ = write!(path, "{prefix}{timestamp}.{extension}");
    path
}

/// Current wall-clock time in unix seconds.
pub fn unix_timestamp() -> i64
{
    // SAFETY: timespec is plain data; clock_gettime is async-signal-safe and only writes `now`.
    let mut now: libc::timespec = unsafe { std::mem::zeroed() };
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return 0;
    }
    now.tv_sec as i64
}

/// Serialize `report` into its file under `prefix`.
///
/// Returns `false` if the file could not be created or fully written.
pub fn write_report<S: ReportSerializer + ?Sized>(prefix: &str, report: &CrashReport, serializer: &S) -> bool
{
    let mut path = report_path(prefix, report.timestamp(), serializer.extension());
    if path.is_truncated() {
        return false;
    }
    let Some(path) = path.as_c_str() else {
        return false;
    };
    let Some(mut sink) = FdSink::create(path) else {
        return false;
    };

    let serialized = serializer.serialize(report, &mut sink).is_ok();
    sink.finish() && serialized
}

/// Buffered `fmt::Write` over a raw file descriptor.
///
/// After the first failed `write` every further write is refused, so a
/// serializer stops early instead of producing a file with holes.
pub struct FdSink
{
    fd: c_int,
    buffer: [u8; SINK_BUFFER_LEN],
    len: usize,
    failed: bool,
}

impl FdSink
{
    /// Create (or truncate) `path` with mode `0644`.
    pub fn create(path: &CStr) -> Option<Self>
    {
        // SAFETY: `path` is NUL-terminated; open reports failure with -1.
        let fd = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
                0o644 as libc::c_uint,
            )
        };
        if fd < 0 {
            return None;
        }
        Some(Self {
            fd,
            buffer: [0; SINK_BUFFER_LEN],
            len: 0,
            failed: false,
        })
    }

    /// Flush, `fsync` and close. `true` if every byte reached the file.
    pub fn finish(mut self) -> bool
    {
        self.flush();
        // SAFETY: the descriptor is open until drop.
        if !self.failed && unsafe { libc::fsync(self.fd) } != 0 {
            self.failed = true;
        }
        !self.failed
    }

    fn flush(&mut self)
    {
        let mut written = 0;
        while written < self.len && !self.failed {
            let pending = &self.buffer[written..self.len];
            // SAFETY: `pending` is initialised memory owned by `self`.
            let result = unsafe { libc::write(self.fd, pending.as_ptr().cast(), pending.len()) };
            if result > 0 {
                written += result as usize;
            } else if result < 0 && errno() == libc::EINTR {
                continue;
            } else {
                self.failed = true;
            }
        }
        self.len = 0;
    }
}

fn errno() -> c_int
{
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

impl fmt::Write for FdSink
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        let mut rest = s.as_bytes();
        while !rest.is_empty() {
            if self.failed {
                return Err(fmt::Error);
            }
            let room = SINK_BUFFER_LEN - self.len;
            let take = room.min(rest.len());
            self.buffer[self.len..self.len + take].copy_from_slice(&rest[..take]);
            self.len += take;
            rest = &rest[take..];
            if self.len == SINK_BUFFER_LEN {
                self.flush();
            }
        }
        if self.failed {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

impl Drop for FdSink
{
    fn drop(&mut self)
    {
        // SAFETY: the descriptor was opened by `create` and is closed only here.
        unsafe {
            libc::close(self.fd);
        }
    }
}
