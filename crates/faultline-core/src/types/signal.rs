//! Fatal signals intercepted by the engine.

use std::fmt;

/// The synchronous fault signals the engine installs itself for.
///
/// Values are the platform's libc constants, so `FatalSignal::Segv as i32`
/// is the raw signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FatalSignal
{
    /// Illegal instruction
    Ill = libc::SIGILL,
    /// Trace/breakpoint trap
    Trap = libc::SIGTRAP,
    /// `abort()`
    Abrt = libc::SIGABRT,
    /// Bus error (misaligned or non-existent physical address)
    Bus = libc::SIGBUS,
    /// Arithmetic fault
    Fpe = libc::SIGFPE,
    /// Invalid memory reference
    Segv = libc::SIGSEGV,
}

impl FatalSignal
{
    /// Every signal the handler is installed for, in installation order.
    pub const ALL: [FatalSignal; 6] = [
        FatalSignal::Ill,
        FatalSignal::Trap,
        FatalSignal::Abrt,
        FatalSignal::Bus,
        FatalSignal::Fpe,
        FatalSignal::Segv,
    ];

    pub const fn try_from_raw(signo: i32) -> Option<Self>
    {
        match signo {
            libc::SIGILL => Some(Self::Ill),
            libc::SIGTRAP => Some(Self::Trap),
            libc::SIGABRT => Some(Self::Abrt),
            libc::SIGBUS => Some(Self::Bus),
            libc::SIGFPE => Some(Self::Fpe),
            libc::SIGSEGV => Some(Self::Segv),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_raw(self) -> i32
    {
        self as i32
    }

    /// Canonical `SIGxxx` name.
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::Ill => "SIGILL",
            Self::Trap => "SIGTRAP",
            Self::Abrt => "SIGABRT",
            Self::Bus => "SIGBUS",
            Self::Fpe => "SIGFPE",
            Self::Segv => "SIGSEGV",
        }
    }

    /// Parse `"segv"`, `"SIGSEGV"` or `"11"`.
    pub fn parse(input: &str) -> Option<Self>
    {
        let input = input.trim();
        if let Ok(num) = input.parse::<i32>() {
            return Self::try_from_raw(num);
        }
        let name = input
            .strip_prefix("SIG")
            .or_else(|| input.strip_prefix("sig"))
            .unwrap_or(input);
        Self::ALL
            .into_iter()
            .find(|signal| signal.name()[3..].eq_ignore_ascii_case(name))
    }
}

/// Name used in report text for any raw signal number.
///
/// Signals outside the intercepted set render as `"UNKNOWN"`.
pub const fn signal_name(signo: i32) -> &'static str
{
    match FatalSignal::try_from_raw(signo) {
        Some(signal) => signal.name(),
        None => "UNKNOWN",
    }
}

impl fmt::Display for FatalSignal
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Fault details copied out of `siginfo_t` when the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultInfo
{
    /// Raw signal number (`si_signo`).
    pub signal: i32,
    /// Signal code (`si_code`), e.g. `SEGV_MAPERR`.
    pub code: i32,
    /// Faulting address for memory faults, zero otherwise.
    pub fault_address: usize,
}

impl FaultInfo
{
    pub const fn new(signal: i32, code: i32, fault_address: usize) -> Self
    {
        Self {
            signal,
            code,
            fault_address,
        }
    }

    /// `true` when the signal was sent by a process (`kill`, `raise`, `abort`)
    /// rather than raised by the CPU.
    pub const fn is_user_sent(&self) -> bool
    {
        self.code <= 0
    }
}
