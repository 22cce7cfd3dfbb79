//! Signal disposition plumbing.
//!
//! Saved dispositions are read and written with the raw `rt_sigaction`
//! syscall in the kernel's own layout, so a disposition that goes back at
//! teardown is bit-for-bit the one that was read at install. The C library
//! wrapper is used only to install the engine's own handler, which needs the
//! signal-return trampoline the C library supplies.
//!
//! Also holds the table of dispositions that were in place before the engine
//! took over, and the logic for handing a signal back to them once a report
//! has been written.

use std::io;
use std::mem;
use std::ptr;

use libc::{c_int, c_ulong, c_void, siginfo_t};

use crate::types::FaultInfo;

/// `SA_SIGINFO` handler signature.
pub type SigInfoHandler = extern "C" fn(c_int, *mut siginfo_t, *mut c_void);

type PlainHandler = extern "C" fn(c_int);

/// Slots in the prior-disposition table; covers every Linux signal number.
pub const SIGNAL_TABLE_LEN: usize = 65;

/// Set by the C library on everything it installs; not part of what the caller asked for.
const SA_RESTORER: u32 = 0x0400_0000;

/// Words in the kernel's 64-signal mask.
const KERNEL_MASK_WORDS: usize = 64 / c_ulong::BITS as usize;

/// A signal disposition exactly as the kernel stores it.
///
/// Same layout as the kernel's `struct sigaction` on x86, x86-64, ARM and
/// AArch64: handler, flags, restorer, then a 64-bit mask.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition
{
    handler: usize,
    flags: c_ulong,
    restorer: usize,
    mask: [c_ulong; KERNEL_MASK_WORDS],
}

impl Disposition
{
    /// `SIG_DFL`, no flags, empty mask.
    pub const fn default_action() -> Self
    {
        Self {
            handler: libc::SIG_DFL,
            flags: 0,
            restorer: 0,
            mask: [0; KERNEL_MASK_WORDS],
        }
    }

    /// Handler address, or `SIG_DFL` / `SIG_IGN`.
    pub const fn handler(&self) -> usize
    {
        self.handler
    }

    /// `sa_flags` as the kernel holds them, `SA_RESTORER` included.
    pub const fn flags(&self) -> c_ulong
    {
        self.flags
    }

    /// Trampoline address, zero when none was set.
    pub const fn restorer(&self) -> usize
    {
        self.restorer
    }

    pub const fn has_siginfo(&self) -> bool
    {
        self.flags as u32 & libc::SA_SIGINFO as u32 != 0
    }

    /// `true` when `action` names the same handler with the same flags,
    /// ignoring the `SA_RESTORER` bit the C library adds on its own.
    pub fn same_handler_as(&self, action: &libc::sigaction) -> bool
    {
        self.handler == action.sa_sigaction
            && (self.flags as u32 & !SA_RESTORER) == (action.sa_flags as u32 & !SA_RESTORER)
    }
}

impl Default for Disposition
{
    fn default() -> Self
    {
        Self::default_action()
    }
}

fn rt_sigaction(signo: c_int, action: Option<&Disposition>, previous: Option<&mut Disposition>) -> io::Result<()>
{
    let action = action.map_or(ptr::null(), |action| action as *const Disposition);
    let previous = previous.map_or(ptr::null_mut(), |previous| previous as *mut Disposition);
    // SAFETY: both pointers are null or point at a `Disposition`, which has
    // the kernel layout; the mask size matches that layout.
    let result = unsafe {
        libc::syscall(
            libc::SYS_rt_sigaction,
            signo,
            action,
            previous,
            mem::size_of::<[c_ulong; KERNEL_MASK_WORDS]>(),
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// The disposition currently installed for `signo`. Async-signal-safe.
pub fn query(signo: c_int) -> io::Result<Disposition>
{
    let mut current = Disposition::default_action();
    rt_sigaction(signo, None, Some(&mut current))?;
    Ok(current)
}

/// Install `handler` for `signo` with `SA_SIGINFO` and an empty mask.
///
/// Returns the disposition it replaced, as the C library reports it.
pub fn replace(signo: c_int, handler: SigInfoHandler) -> io::Result<libc::sigaction>
{
    // SAFETY: `action` is fully initialised before use and `handler` has the
    // SA_SIGINFO signature.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_SIGINFO;
        action.sa_sigaction = handler as usize;

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(signo, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(previous)
    }
}

/// Put a disposition from the C library back for `signo`.
pub fn reinstall(signo: c_int, action: &libc::sigaction) -> io::Result<()>
{
    // SAFETY: `action` came from a previous sigaction call.
    if unsafe { libc::sigaction(signo, action, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Put `action` back as the disposition of `signo`, bit for bit. Async-signal-safe.
pub fn restore(signo: c_int, action: &Disposition) -> io::Result<()>
{
    rt_sigaction(signo, Some(action), None)
}

/// Dispositions saved at install time, indexed by signal number.
pub struct PriorDispositionTable
{
    slots: [Option<Disposition>; SIGNAL_TABLE_LEN],
}

impl PriorDispositionTable
{
    pub fn new() -> Self
    {
        Self {
            slots: [None; SIGNAL_TABLE_LEN],
        }
    }

    /// Remember the disposition `signo` had. `false` if `signo` is out of range.
    pub fn record(&mut self, signo: c_int, action: Disposition) -> bool
    {
        match slot_index(signo) {
            Some(index) => {
                self.slots[index] = Some(action);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, signo: c_int) -> Option<&Disposition>
    {
        self.slots.get(slot_index(signo)?)?.as_ref()
    }

    /// Signal numbers with a saved disposition, ascending.
    pub fn recorded(&self) -> impl Iterator<Item = c_int> + '_
    {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as c_int)
    }

    /// Reinstall every saved disposition.
    ///
    /// Keeps going past failures and returns the first error.
    pub fn restore_all(&self) -> io::Result<()>
    {
        let mut first_error = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(action) = slot {
                if let Err(err) = restore(index as c_int, action) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for PriorDispositionTable
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl std::fmt::Debug for PriorDispositionTable
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_list().entries(self.recorded()).finish()
    }
}

fn slot_index(signo: c_int) -> Option<usize>
{
    usize::try_from(signo).ok().filter(|index| *index > 0 && *index < SIGNAL_TABLE_LEN)
}

/// Hand a signal to the disposition that was active before ours.
///
/// A saved handler function is called directly with the original arguments.
/// A saved `SIG_DFL`/`SIG_IGN` is reinstalled instead and the signal is
/// [redelivered](redeliver) to it.
///
/// # Safety
///
/// Must be called from the signal handler for `signo`, with the `info` and
/// `ucontext` pointers it received.
pub unsafe fn chain(prior: &Disposition, signo: c_int, info: *mut siginfo_t, ucontext: *mut c_void)
{
    let handler = prior.handler();

    if handler == libc::SIG_DFL || handler == libc::SIG_IGN {
        if restore(signo, prior).is_ok() {
            // SAFETY: forwarded from the caller.
            unsafe { redeliver(signo, info) };
        }
        return;
    }

    if prior.has_siginfo() {
        // SAFETY: SA_SIGINFO dispositions hold a three-argument handler.
        let handler: SigInfoHandler = unsafe { mem::transmute::<usize, SigInfoHandler>(handler) };
        handler(signo, info, ucontext);
    } else {
        // SAFETY: without SA_SIGINFO the slot holds a one-argument handler.
        let handler: PlainHandler = unsafe { mem::transmute::<usize, PlainHandler>(handler) };
        handler(signo);
    }
}

/// Let whatever disposition `signo` has now deal with this delivery.
///
/// A hardware fault re-executes the faulting instruction once the handler
/// returns and is delivered again then. A signal sent by a process is raised
/// again, and arrives when the handler returns and unblocks it.
///
/// # Safety
///
/// `info` must be null or the siginfo of the delivery being handled.
pub unsafe fn redeliver(signo: c_int, info: *const siginfo_t)
{
    // SAFETY: null or the kernel's siginfo for this delivery.
    let fault = match unsafe { info.as_ref() } {
        Some(info) => FaultInfo::new(signo, info.si_code, 0),
        None => FaultInfo::new(signo, 0, 0),
    };
    if fault.is_user_sent() {
        // SAFETY: raise is async-signal-safe.
        unsafe {
            libc::raise(signo);
        }
    }
}

/// Install `SIG_DFL` for `signo`. Async-signal-safe.
pub fn reset_to_default(signo: c_int) -> io::Result<()>
{
    restore(signo, &Disposition::default_action())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_table_rejects_out_of_range_signals()
    {
        let action = Disposition::default_action();
        let mut table = PriorDispositionTable::new();
        assert!(!table.record(0, action));
        assert!(!table.record(SIGNAL_TABLE_LEN as c_int, action));
        assert!(!table.record(-1, action));
        assert!(table.record(libc::SIGSEGV, action));
        assert!(table.get(libc::SIGSEGV).is_some());
        assert!(table.get(libc::SIGBUS).is_none());
        assert_eq!(table.recorded().collect::<Vec<_>>(), vec![libc::SIGSEGV]);
    }

    #[test]
    fn test_query_matches_restored_bits()
    {
        let before = query(libc::SIGUSR1).unwrap();
        restore(libc::SIGUSR1, &before).unwrap();
        assert_eq!(query(libc::SIGUSR1).unwrap(), before);
    }

    #[test]
    fn test_default_action_restores_without_restorer()
    {
        let before = query(libc::SIGUSR2).unwrap();

        reset_to_default(libc::SIGUSR2).unwrap();
        let reset = query(libc::SIGUSR2).unwrap();
        assert_eq!(reset.handler(), libc::SIG_DFL);
        assert_eq!(reset.flags(), 0);
        assert_eq!(reset.restorer(), 0);

        restore(libc::SIGUSR2, &before).unwrap();
    }

    #[test]
    fn test_same_handler_ignores_restorer_flag()
    {
        // SAFETY: plain data.
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = libc::SIG_DFL;
        action.sa_flags = SA_RESTORER as c_int;
        assert!(Disposition::default_action().same_handler_as(&action));

        action.sa_flags |= libc::SA_SIGINFO;
        assert!(!Disposition::default_action().same_handler_as(&action));
    }
}
