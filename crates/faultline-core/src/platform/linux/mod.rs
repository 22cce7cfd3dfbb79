//! # Linux / Android Implementation
//!
//! - [`signals`]: `sigaction` wrappers, saved dispositions and chaining
//! - [`context`]: program counter / stack pointer from `ucontext_t`
//! - [`symbols`]: `dladdr` address resolution
//! - [`memory`]: fault-free stack reads through `process_vm_readv`
//! - [`dynlib`]: RAII `dlopen` handles
//! - [`unwinders`]: `libunwind` and `libcorkscrew` behind the unwinding traits
//!
//! Everything reachable from the signal handler sticks to calls that are
//! safe there, except the `dlopen` of an unwinding library, which is
//! inherent in looking the library up at crash time.

pub mod context;
pub mod dynlib;
pub mod memory;
pub mod signals;
pub mod symbols;
pub mod unwinders;

/// Kernel thread id of the calling thread. Async-signal-safe.
pub fn current_thread_id() -> i32
{
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}
