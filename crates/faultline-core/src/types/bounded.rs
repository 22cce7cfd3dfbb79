//! Fixed-capacity string buffers.
//!
//! Everything the signal handler formats (method names, file paths, the
//! exception message) lands in one of these. They live inside buffers that
//! were allocated at install time, so filling them never touches the heap.
//!
//! Writes past the capacity are truncated at the last whole UTF-8 character
//! that fits and the buffer remembers that it was truncated.

use std::ffi::CStr;
use std::fmt;

/// UTF-8 string stored inline in a `[u8; N]`.
///
/// ## Example
///
/// ```rust
/// use std::fmt::Write;
///
/// use faultline_core::types::BoundedStr;
///
/// let mut name = BoundedStr::<8>::new();
/// write!(name, "signal {}", 11).unwrap();
/// assert_eq!(name.as_str(), "signal 1");
/// assert!(name.is_truncated());
/// ```
#[derive(Clone)]
pub struct BoundedStr<const N: usize>
{
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> BoundedStr<N>
{
    /// Empty, zeroed buffer.
    pub const fn new() -> Self
    {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Maximum number of bytes this buffer can hold.
    pub const fn capacity(&self) -> usize
    {
        N
    }

    pub const fn len(&self) -> usize
    {
        self.len
    }

    pub const fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// `true` once any write had to drop bytes.
    pub const fn is_truncated(&self) -> bool
    {
        self.truncated
    }

    pub fn as_str(&self) -> &str
    {
        // Only whole characters are ever copied in, so this cannot fail.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    /// Zero the whole backing array, not just the used prefix.
    pub fn clear(&mut self)
    {
        self.buf.fill(0);
        self.len = 0;
        self.truncated = false;
    }

    /// Replace the contents with `value`.
    pub fn set(&mut self, value: &str)
    {
        self.clear();
        self.push_str(value);
    }

    /// Replace the contents with the valid UTF-8 prefix of a C string.
    pub fn set_c_str(&mut self, value: &CStr)
    {
        self.set(utf8_prefix(value.to_bytes()));
    }

    /// Append as much of `value` as fits.
    pub fn push_str(&mut self, value: &str)
    {
        let room = N - self.len;
        let mut take = value.len().min(room);
        if take < value.len() {
            while take > 0 && !value.is_char_boundary(take) {
                take -= 1;
            }
            self.truncated = true;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&value.as_bytes()[..take]);
        self.len += take;
    }

    /// NUL-terminated view for passing to libc.
    ///
    /// Returns `None` when the buffer is full (no room for the terminator) or
    /// the contents contain an interior NUL.
    pub fn as_c_str(&mut self) -> Option<&CStr>
    {
        if self.len >= N {
            return None;
        }
        self.buf[self.len] = 0;
        CStr::from_bytes_with_nul(&self.buf[..=self.len]).ok()
    }
}

/// Longest prefix of `bytes` that is valid UTF-8.
pub(crate) fn utf8_prefix(bytes: &[u8]) -> &str
{
    match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => std::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
    }
}

impl<const N: usize> Default for BoundedStr<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for BoundedStr<N>
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        self.push_str(s);
        Ok(())
    }
}

impl<const N: usize> fmt::Display for BoundedStr<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for BoundedStr<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> PartialEq<str> for BoundedStr<N>
{
    fn eq(&self, other: &str) -> bool
    {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for BoundedStr<N>
{
    fn eq(&self, other: &&str) -> bool
    {
        self.as_str() == *other
    }
}
