//! Machine context extraction.
//!
//! A `SA_SIGINFO` handler receives the interrupted thread's registers as an
//! opaque `ucontext_t`. Only two of them matter to the scanner (program
//! counter and stack pointer), and where they live in `uc_mcontext` differs
//! per architecture. Exactly one accessor pair is compiled in.

use libc::{c_void, siginfo_t, ucontext_t};

use crate::types::Address;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        fn program_counter(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.gregs[libc::REG_RIP as usize] as usize
        }

        fn stack_pointer(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.gregs[libc::REG_RSP as usize] as usize
        }
    } else if #[cfg(target_arch = "x86")] {
        fn program_counter(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.gregs[libc::REG_EIP as usize] as usize
        }

        fn stack_pointer(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.gregs[libc::REG_ESP as usize] as usize
        }
    } else if #[cfg(target_arch = "aarch64")] {
        fn program_counter(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.pc as usize
        }

        fn stack_pointer(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.sp as usize
        }
    } else if #[cfg(target_arch = "arm")] {
        fn program_counter(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.arm_pc as usize
        }

        fn stack_pointer(uc: &ucontext_t) -> usize
        {
            uc.uc_mcontext.arm_sp as usize
        }
    } else {
        compile_error!("unsupported target architecture: no machine context accessors");
    }
}

/// CPU state of the interrupted thread, as handed to the signal handler.
///
/// Read-only. Program counter and stack pointer are extracted once when the
/// context is built; the raw pointers are kept for the unwinding libraries,
/// which want the whole snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MachineContext
{
    info: *const siginfo_t,
    ucontext: *const ucontext_t,
    program_counter: Address,
    stack_pointer: Address,
}

impl MachineContext
{
    /// Wrap the arguments of a `SA_SIGINFO` handler.
    ///
    /// # Safety
    ///
    /// `info` and `ucontext` must be null or the pointers the kernel passed to
    /// the running handler, and the returned value must not outlive it.
    pub unsafe fn from_signal(info: *const siginfo_t, ucontext: *const c_void) -> Self
    {
        let ucontext = ucontext.cast::<ucontext_t>();
        // SAFETY: caller guarantees the pointer is null or a live ucontext_t.
        let (program_counter, stack_pointer) = match unsafe { ucontext.as_ref() } {
            Some(uc) => (program_counter(uc), stack_pointer(uc)),
            None => (0, 0),
        };

        Self {
            info,
            ucontext,
            program_counter: Address::new(program_counter),
            stack_pointer: Address::new(stack_pointer),
        }
    }

    /// A context carrying only a program counter and stack pointer.
    ///
    /// Unwinding libraries need the full register snapshot and report
    /// themselves unavailable for a detached context; the stack scanner and
    /// the basic strategy work as usual.
    pub const fn from_registers(program_counter: Address, stack_pointer: Address) -> Self
    {
        Self {
            info: std::ptr::null(),
            ucontext: std::ptr::null(),
            program_counter,
            stack_pointer,
        }
    }

    pub const fn program_counter(&self) -> Address
    {
        self.program_counter
    }

    pub const fn stack_pointer(&self) -> Address
    {
        self.stack_pointer
    }

    /// `true` when there is no OS register snapshot behind this context.
    pub fn is_detached(&self) -> bool
    {
        self.ucontext.is_null()
    }

    pub(crate) fn raw_info(&self) -> *const siginfo_t
    {
        self.info
    }

    pub(crate) fn raw_ucontext(&self) -> *const ucontext_t
    {
        self.ucontext
    }
}
