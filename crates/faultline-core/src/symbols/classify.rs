//! System-code classification.
//!
//! A frame is "in project" unless its owning file or its method name starts
//! with one of the fixed system prefixes below. The result depends on nothing
//! but the two strings, so the same frame always classifies the same way.

/// Owning-file prefixes that mark platform code.
///
/// Platform libraries under `/system/`, the C library, the legacy Dalvik and
/// cutils libraries, and the `[heap]` pseudo-mapping.
pub const SYSTEM_FILE_PREFIXES: [&str; 5] = ["/system/", "libc.so", "libdvm.so", "libcutils.so", "[heap]"];

/// Method-name prefixes that mark compiler-injected helpers.
///
/// The ARM EABI arithmetic helpers (`__aeabi_idiv`, `__aeabi_uldivmod`, ...)
/// get linked into application binaries but are never where a bug lives.
pub const SYSTEM_METHOD_PREFIXES: [&str; 1] = ["__aeabi_"];

/// `true` if `file` starts with a system-file prefix. A missing file is not a system file.
pub fn is_system_file(file: Option<&str>) -> bool
{
    file.is_some_and(|file| SYSTEM_FILE_PREFIXES.iter().any(|prefix| file.starts_with(prefix)))
}

/// `true` if `method` starts with a system-method prefix. A missing method is not a system method.
pub fn is_system_method(method: Option<&str>) -> bool
{
    method.is_some_and(|method| SYSTEM_METHOD_PREFIXES.iter().any(|prefix| method.starts_with(prefix)))
}

/// Classify a frame as application code.
///
/// ```rust
/// use faultline_core::symbols::classify::in_project;
///
/// assert!(!in_project(Some("/system/lib/libfoo.so"), Some("")));
/// assert!(!in_project(Some("/data/app/lib/libgame.so"), Some("__aeabi_idiv")));
/// assert!(in_project(Some("/data/app/lib/libgame.so"), Some("Game::tick")));
/// ```
pub fn in_project(file: Option<&str>, method: Option<&str>) -> bool
{
    !(is_system_file(file) || is_system_method(method))
}
