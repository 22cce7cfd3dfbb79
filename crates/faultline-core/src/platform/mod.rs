//! # Platform-Specific Implementations
//!
//! Everything that touches the operating system lives here: signal
//! dispositions, the machine context handed to a `SA_SIGINFO` handler, the
//! dynamic loader (`dlopen`/`dladdr`), own-process memory reads and raw-fd
//! file output.
//!
//! - **Linux / Android**: see [`linux`]. Both share the same kernel ABI for
//!   signals and `ucontext_t`; only the available unwinding libraries differ.
//!   - See: [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)
//!   - See: [dladdr(3) man page](https://man7.org/linux/man-pages/man3/dladdr.3.html)
//!
//! Other operating systems are rejected at build time.

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod linux;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::{
    context::MachineContext, memory::LiveStack, symbols::DlAddrResolver, unwinders::DynamicBackends,
};

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("faultline-core supports Linux and Android targets only");
