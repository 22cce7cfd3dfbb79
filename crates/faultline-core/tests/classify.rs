//! Tests for system/application frame classification and the frame validator

use faultline_core::symbols::classify::{in_project, is_system_file, is_system_method};
use faultline_core::symbols::{is_plausible_return_address, SymbolInfo, SymbolResolver};
use faultline_core::types::Address;

#[test]
fn test_system_library_with_empty_method_is_not_in_project()
{
    assert!(!in_project(Some("/system/lib/libfoo.so"), Some("")));
}

#[test]
fn test_every_system_file_prefix()
{
    for file in [
        "/system/lib64/libart.so",
        "libc.so",
        "libdvm.so",
        "libcutils.so",
        "[heap]",
    ] {
        assert!(is_system_file(Some(file)), "{file}");
        assert!(!in_project(Some(file), Some("main")), "{file}");
    }
}

#[test]
fn test_prefix_match_is_anchored()
{
    // Prefixes match at the start only.
    assert!(!is_system_file(Some("/data/app/system/libgame.so")));
    assert!(!is_system_file(Some("/vendor/lib/libc.so")));
    assert!(!is_system_method(Some("my__aeabi_idiv")));
}

#[test]
fn test_compiler_helpers_are_not_in_project()
{
    assert!(is_system_method(Some("__aeabi_idiv")));
    assert!(!in_project(Some("/data/app/lib/libgame.so"), Some("__aeabi_uldivmod")));
}

#[test]
fn test_application_frames_are_in_project()
{
    assert!(in_project(Some("/data/app/com.example-1/lib/arm/libgame.so"), Some("Java_com_example_crash")));
    assert!(in_project(Some("/data/app/lib/libgame.so"), None));
    assert!(in_project(None, None));
}

#[test]
fn test_classification_is_deterministic()
{
    let inputs = [
        (Some("/system/lib/libc.so"), Some("abort")),
        (Some("/data/app/lib/libgame.so"), Some("tick")),
        (Some("[heap]"), None),
        (None, Some("__aeabi_memcpy")),
    ];
    for (file, method) in inputs {
        let first = in_project(file, method);
        for _ in 0..10 {
            assert_eq!(in_project(file, method), first);
        }
    }
}

struct OneObject;

impl SymbolResolver for OneObject
{
    fn resolve(&self, address: Address) -> Option<SymbolInfo<'_>>
    {
        match address.value() {
            0x1000..=0x1fff => Some(SymbolInfo {
                file: "/data/app/lib/libgame.so",
                file_base: Address::new(0x1000),
                symbol: Some("tick"),
                symbol_address: Some(Address::new(0x1100)),
            }),
            0x2000..=0x2fff => Some(SymbolInfo {
                file: "/data/app/lib/libgame.so",
                file_base: Address::new(0x1000),
                symbol: Some("__aeabi_idiv"),
                symbol_address: Some(Address::new(0x2000)),
            }),
            0x3000..=0x3fff => Some(SymbolInfo {
                file: "/system/lib/libc.so",
                file_base: Address::new(0x3000),
                symbol: None,
                symbol_address: None,
            }),
            _ => None,
        }
    }
}

#[test]
fn test_validator_accepts_only_application_code()
{
    assert!(is_plausible_return_address(&OneObject, Address::new(0x1234)));
    assert!(!is_plausible_return_address(&OneObject, Address::new(0x2004)));
    assert!(!is_plausible_return_address(&OneObject, Address::new(0x3004)));
    assert!(!is_plausible_return_address(&OneObject, Address::new(0x9000)));
    assert!(!is_plausible_return_address(&OneObject, Address::ZERO));
}
