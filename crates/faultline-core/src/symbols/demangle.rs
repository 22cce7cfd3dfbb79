//! Symbol demangling utilities.
//!
//! Method names are kept exactly as the unwinder or the dynamic loader
//! reported them (classification matches prefixes on the raw name). The
//! serializer may additionally emit a readable form; this module produces it
//! without allocating, since `rustc_demangle` formats straight into any
//! `fmt::Write`.
//!
//! ## Language Detection
//!
//! - Rust symbols: start with `_R` (v0) or are legacy `_ZN...17h<hash>E` names
//! - C++ symbols: start with `_Z` (Itanium mangling)
//! - C symbols: everything else

use std::fmt;

use rustc_demangle::try_demangle;

/// Source language guessed from a symbol's mangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    Rust,
    Cpp,
    Unknown,
}

impl SymbolLanguage
{
    /// Guess the language of a raw symbol name.
    pub fn detect(raw: &str) -> Self
    {
        if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) {
            SymbolLanguage::Rust
        } else if raw.starts_with("_Z") {
            SymbolLanguage::Cpp
        } else {
            SymbolLanguage::Unknown
        }
    }
}

/// Write the demangled form of a Rust symbol into `out`.
///
/// Returns `None` if `raw` is not a Rust symbol, leaving `out` untouched.
/// The trailing hash of legacy symbols is omitted.
pub fn write_demangled<W: fmt::Write + ?Sized>(raw: &str, out: &mut W) -> Option<fmt::Result>
{
    let demangled = try_demangle(raw).ok()?;
    Some(write!(out, "{demangled:#}"))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::MethodName;

    #[test]
    fn test_demangles_legacy_rust_symbol()
    {
        let mut out = MethodName::new();
        let result = write_demangled("_ZN4core9panicking5panic17h0123456789abcdefE", &mut out);
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(out.as_str(), "core::panicking::panic");
    }

    #[test]
    fn test_leaves_c_symbols_alone()
    {
        let mut out = MethodName::new();
        assert!(write_demangled("crash_now", &mut out).is_none());
        assert!(out.is_empty());
        assert_eq!(SymbolLanguage::detect("crash_now"), SymbolLanguage::Unknown);
        assert_eq!(SymbolLanguage::detect("_Z3foov"), SymbolLanguage::Cpp);
    }
}
