//! Build script for faultline-core
//!
//! This script checks requirements before compilation:
//! - Minimum Rust version (C string literals and inline `const` blocks need 1.79.0+)
//! - Target operating system (Linux or Android)
//! - Target architecture (arm, aarch64, x86, x86_64)
//!
//! The same checks exist as `compile_error!`s in the crate; failing here
//! gives a clearer message before any code is compiled.

const SUPPORTED_OS: [&str; 2] = ["linux", "android"];
const SUPPORTED_ARCH: [&str; 4] = ["arm", "aarch64", "x86", "x86_64"];

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 79, 0);
            if rustc_version < min_rust_version {
                panic!(
                    "faultline-core requires Rust {} or newer, found {}",
                    min_rust_version, rustc_version
                );
            }
        }
        // Some build environments hide the compiler version.
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    // Cargo describes the target, not the host, through these variables.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if !SUPPORTED_OS.contains(&target_os.as_str()) {
        panic!(
            "faultline-core supports {} targets only, not {target_os}",
            SUPPORTED_OS.join(" and ")
        );
    }
    if !SUPPORTED_ARCH.contains(&target_arch.as_str()) {
        panic!(
            "faultline-core has no machine-context accessors for {target_arch} (supported: {})",
            SUPPORTED_ARCH.join(", ")
        );
    }
}
