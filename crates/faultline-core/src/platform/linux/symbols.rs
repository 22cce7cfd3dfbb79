//! `dladdr`-based address resolution.

use std::ffi::CStr;
use std::mem;

use crate::symbols::{SymbolInfo, SymbolResolver};
use crate::types::bounded::utf8_prefix;
use crate::types::Address;

/// Resolves addresses through the dynamic loader's symbol tables.
///
/// Only exported (dynamic) symbols are visible. Safe to call from a signal
/// handler on the platforms we target: `dladdr` neither allocates nor takes
/// the loader lock on the lookup path in bionic, and glibc only reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DlAddrResolver;

impl SymbolResolver for DlAddrResolver
{
    fn resolve(&self, address: Address) -> Option<SymbolInfo<'_>>
    {
        if address.is_null() {
            return None;
        }

        // SAFETY: Dl_info is plain data and dladdr only writes into it.
        let mut info: libc::Dl_info = unsafe { mem::zeroed() };
        // SAFETY: dladdr accepts any address value.
        if unsafe { libc::dladdr(address.as_ptr(), &mut info) } == 0 || info.dli_fname.is_null() {
            return None;
        }

        // SAFETY: the loader keeps these strings alive while the object stays
        // mapped, which covers the crash path.
        let file = utf8_prefix(unsafe { CStr::from_ptr(info.dli_fname) }.to_bytes());
        let symbol = if info.dli_sname.is_null() {
            None
        } else {
            // SAFETY: as above.
            Some(utf8_prefix(unsafe { CStr::from_ptr(info.dli_sname) }.to_bytes()))
        };
        let symbol_address = if info.dli_saddr.is_null() {
            None
        } else {
            Some(Address::new(info.dli_saddr as usize))
        };

        Some(SymbolInfo {
            file,
            file_base: Address::new(info.dli_fbase as usize),
            symbol,
            symbol_address,
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[inline(never)]
    extern "C" fn faultline_resolver_target() -> i32
    {
        7
    }

    #[test]
    fn test_resolves_own_function()
    {
        let address = Address::new(faultline_resolver_target as usize);
        let info = DlAddrResolver.resolve(address).expect("own text resolves");
        assert!(address.offset_from(info.file_base).is_some());
    }

    #[test]
    fn test_null_does_not_resolve()
    {
        assert!(DlAddrResolver.resolve(Address::ZERO).is_none());
    }
}
