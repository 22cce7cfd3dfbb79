//! Address introspection and the frame validator.

use super::classify;
use crate::types::Address;

/// What dynamic-symbol lookup knows about an address.
///
/// The strings borrow from the resolver (for the live resolver they point
/// into the dynamic loader's own tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo<'a>
{
    /// Path of the shared object or executable containing the address.
    pub file: &'a str,
    /// Load base of that object.
    pub file_base: Address,
    /// Nearest symbol at or below the address, if any.
    pub symbol: Option<&'a str>,
    /// Start address of `symbol`.
    pub symbol_address: Option<Address>,
}

/// Resolves an address to its owning file and nearest symbol.
///
/// Implementations used from the signal handler must not allocate or lock.
/// The live implementation is a thin wrapper around `dladdr`.
pub trait SymbolResolver
{
    /// Returns `None` when no owning file is known for `address`.
    fn resolve(&self, address: Address) -> Option<SymbolInfo<'_>>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R
{
    fn resolve(&self, address: Address) -> Option<SymbolInfo<'_>>
    {
        (**self).resolve(address)
    }
}

/// Does `address` look like a real return address into application code?
///
/// Passes only when the address is non-null, resolves to an owning file, and
/// neither that file nor the nearest symbol is system code.
pub fn is_plausible_return_address<R: SymbolResolver + ?Sized>(resolver: &R, address: Address) -> bool
{
    if address.is_null() {
        return false;
    }
    match resolver.resolve(address) {
        Some(info) => classify::in_project(Some(info.file), info.symbol),
        None => false,
    }
}
