//! Target architecture.

use std::fmt;

/// CPU architectures the engine knows how to read machine context for.
///
/// The engine only ever runs on the architecture it was compiled for; there
/// is no "unknown" variant because unsupported targets fail to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture
{
    /// 32-bit ARM (armeabi-v7a)
    Arm,
    /// 64-bit ARM (arm64-v8a)
    Arm64,
    /// 32-bit x86
    X86,
    /// 64-bit x86
    X86_64,
}

impl Architecture
{
    /// Architecture of the running binary, fixed at compile time.
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "arm")]
        {
            Architecture::Arm
        }

        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86")]
        {
            Architecture::X86
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }
    }

    /// Size of a pointer (and of one scanned stack word) in bytes.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> usize
    {
        match self {
            Architecture::Arm | Architecture::X86 => 4,
            Architecture::Arm64 | Architecture::X86_64 => 8,
        }
    }

    pub const fn name(self) -> &'static str
    {
        match self {
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}
