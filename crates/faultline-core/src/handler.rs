//! # Crash Handler
//!
//! Process-wide installation of the fatal-signal handler and the capture
//! pipeline it runs.
//!
//! ## Lifecycle
//!
//! `Uninstalled → Installed` with [`CrashHandler::install`]. On a fault the
//! handler captures (unwind, classify, persist) and then hands the signal to
//! whatever disposition was installed before. [`CrashHandler::teardown`] (or
//! dropping the handle) puts those dispositions back and frees every buffer.
//!
//! ## Inside the handler
//!
//! Everything the capture touches was allocated at install. Only one thread
//! captures at a time, guarded by a [`CaptureGate`]; a thread that finds the
//! gate held (another thread is capturing, or this thread faulted inside its
//! own capture) skips straight to the previous disposition.

use std::cell::UnsafeCell;
use std::{io, ptr};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use libc::{c_int, c_void, siginfo_t};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::platform::linux::{current_thread_id, signals};
use crate::platform::{DlAddrResolver, DynamicBackends, LiveStack, MachineContext};
use crate::report::persist::{self, StoragePrefix};
use crate::report::{build_report, ReportSerializer};
use crate::types::{CrashReport, FatalSignal, FaultInfo, RawTrace, ReportMetadata, MAX_FRAMES};
use crate::unwind::{StackUnwinder, UnwindScratch};

static INSTALLED: AtomicBool = AtomicBool::new(false);
static ENGINE: AtomicPtr<EngineState> = AtomicPtr::new(ptr::null_mut());
/// Handler invocations currently holding a reference to the engine state.
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// How long teardown waits for a capture on another thread to finish.
const TEARDOWN_WAIT: Duration = Duration::from_secs(2);

/// Outcome of [`CaptureGate::try_enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEntry
{
    /// The caller now owns the gate and must [`leave`](CaptureGate::leave) it.
    Entered,
    /// The calling thread already owns the gate: a fault during capture.
    Recursive,
    /// Another thread is capturing.
    Busy,
}

/// Handler-wide lock recording which kernel thread is capturing.
///
/// Lock-free (a single compare-exchange), so it can be taken from a signal handler.
#[derive(Debug)]
pub struct CaptureGate
{
    owner: AtomicI32,
}

impl CaptureGate
{
    pub const fn new() -> Self
    {
        Self {
            owner: AtomicI32::new(0),
        }
    }

    /// Try to take the gate for `thread` (a non-zero kernel thread id).
    pub fn try_enter(&self, thread: i32) -> GateEntry
    {
        match self.owner.compare_exchange(0, thread, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => GateEntry::Entered,
            Err(current) if current == thread => GateEntry::Recursive,
            Err(_) => GateEntry::Busy,
        }
    }

    /// Release the gate if `thread` holds it.
    pub fn leave(&self, thread: i32)
    {
        let _ = self
            .owner
            .compare_exchange(thread, 0, Ordering::Release, Ordering::Relaxed);
    }

    /// Thread currently capturing, if any.
    pub fn owner(&self) -> Option<i32>
    {
        match self.owner.load(Ordering::Acquire) {
            0 => None,
            thread => Some(thread),
        }
    }
}

impl Default for CaptureGate
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Buffers written by the capture path. Only the gate owner touches them.
struct CaptureBuffers
{
    trace: RawTrace,
    scratch: UnwindScratch,
    report: CrashReport,
}

struct EngineState
{
    gate: CaptureGate,
    priors: signals::PriorDispositionTable,
    max_depth: usize,
    scan_window: usize,
    storage_prefix: StoragePrefix,
    serializer: Box<dyn ReportSerializer>,
    buffers: UnsafeCell<CaptureBuffers>,
}

// SAFETY: `buffers` is only accessed by the thread holding `gate`; every
// other field is read-only once the state is published.
unsafe impl Sync for EngineState {}

impl EngineState
{
    /// Run one capture.
    ///
    /// # Safety
    ///
    /// The caller must hold `self.gate` and pass the handler's own arguments.
    unsafe fn capture(&self, signo: c_int, info: *mut siginfo_t, ucontext: *mut c_void)
    {
        // SAFETY: exclusive access is guaranteed by the gate.
        let buffers = unsafe { &mut *self.buffers.get() };
        // SAFETY: both pointers come straight from the kernel.
        let context = unsafe { MachineContext::from_signal(info, ucontext) };
        let fault = fault_info(signo, info);

        buffers.scratch.wipe();
        let stack = LiveStack::new();
        let strategy = StackUnwinder::new(&DynamicBackends, &stack, &DlAddrResolver)
            .with_scan_window(self.scan_window)
            .unwind(&context, &mut buffers.scratch, self.max_depth, &mut buffers.trace);

        build_report(
            &mut buffers.report,
            fault,
            strategy,
            &buffers.trace,
            &DlAddrResolver,
            persist::unix_timestamp(),
        );
        persist::write_report(self.storage_prefix.as_str(), &buffers.report, &*self.serializer);
    }
}

fn fault_info(signo: c_int, info: *const siginfo_t) -> FaultInfo
{
    // SAFETY: null or the kernel's siginfo for this delivery.
    match unsafe { info.as_ref() } {
        // SAFETY: si_addr is defined for every fatal signal.
        Some(info) => FaultInfo::new(signo, info.si_code, unsafe { info.si_addr() } as usize),
        None => FaultInfo::new(signo, 0, 0),
    }
}

extern "C" fn handle_fatal_signal(signo: c_int, info: *mut siginfo_t, ucontext: *mut c_void)
{
    // SeqCst pairs with release_engine: either this increment is visible to
    // teardown, or the engine pointer loaded here is already null.
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);

    let engine = ENGINE.load(Ordering::SeqCst);
    // SAFETY: teardown does not free the state while IN_FLIGHT is non-zero.
    let prior = unsafe { engine.as_ref() }.map(|state| {
        let thread = current_thread_id();
        if state.gate.try_enter(thread) == GateEntry::Entered {
            // SAFETY: we hold the gate.
            unsafe { state.capture(signo, info, ucontext) };
            state.gate.leave(thread);
        }
        state.priors.get(signo).copied().unwrap_or_default()
    });

    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);

    match prior {
        // SAFETY: called from the handler for `signo` with its own arguments.
        Some(prior) => unsafe { signals::chain(&prior, signo, info, ucontext) },
        None => redeliver_after_teardown(signo, info),
    }
}

/// The engine is gone, so teardown has already put the old dispositions
/// back. Leave them as they are and let the current one take the signal.
fn redeliver_after_teardown(signo: c_int, info: *const siginfo_t)
{
    let still_ours = signals::query(signo).map_or(true, |current| current.handler() == handle_fatal_signal as usize);
    if still_ours && signals::reset_to_default(signo).is_err() {
        return;
    }
    // SAFETY: `info` is the siginfo of the delivery being handled.
    unsafe { signals::redeliver(signo, info) };
}

/// Handle to the installed crash handler.
///
/// There is at most one per process. Dropping it tears the handler down.
#[derive(Debug)]
pub struct CrashHandler
{
    _private: (),
}

impl CrashHandler
{
    /// Install the handler for every [`FatalSignal`].
    ///
    /// Report buffers are allocated here, sized by `config`; `metadata` is
    /// copied into every report unchanged and `serializer` writes them.
    ///
    /// ## Errors
    ///
    /// - `AlreadyInstalled`: another `CrashHandler` is live
    /// - `InvalidConfig` / `Io`: `config` failed validation
    /// - `SignalInstall`: `sigaction` failed; nothing stays installed
    pub fn install<S>(config: CaptureConfig, metadata: ReportMetadata, serializer: S) -> CaptureResult<Self>
    where
        S: ReportSerializer + 'static,
    {
        if INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::AlreadyInstalled);
        }

        match install_engine(&config, metadata, Box::new(serializer)) {
            Ok(()) => {
                info!(
                    storage_dir = %config.storage_dir().display(),
                    max_depth = config.max_depth(),
                    scan_window = config.scan_window(),
                    "crash handler installed"
                );
                Ok(Self { _private: () })
            }
            Err(err) => {
                INSTALLED.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// `true` while a handler is installed in this process.
    pub fn is_installed() -> bool
    {
        INSTALLED.load(Ordering::Acquire)
    }

    /// Restore the previous dispositions and release all buffers.
    pub fn teardown(self)
    {
        drop(self);
    }
}

impl Drop for CrashHandler
{
    fn drop(&mut self)
    {
        uninstall_engine();
        INSTALLED.store(false, Ordering::Release);
        info!("crash handler torn down");
    }
}

/// Attempts before giving up on a disposition that keeps changing under install.
const INSTALL_ATTEMPTS: usize = 3;

/// Why a single install pass did not complete.
enum InstallFailure
{
    /// `sigaction` failed.
    Failed(CaptureError),
    /// Another thread changed the disposition of this signal between reading
    /// it and replacing it.
    Raced(FatalSignal),
}

fn install_engine(config: &CaptureConfig, metadata: ReportMetadata, serializer: Box<dyn ReportSerializer>) -> CaptureResult<()>
{
    config.validate()?;
    let storage_prefix = persist::storage_prefix(config.storage_dir())?;

    let mut state = Box::new(EngineState {
        gate: CaptureGate::new(),
        priors: signals::PriorDispositionTable::new(),
        max_depth: config.max_depth(),
        scan_window: config.scan_window(),
        storage_prefix,
        serializer,
        buffers: UnsafeCell::new(CaptureBuffers {
            trace: RawTrace::with_capacity(MAX_FRAMES),
            scratch: UnwindScratch::new(),
            report: CrashReport::new(config.storage_dir(), metadata),
        }),
    });

    let mut last_raced = FatalSignal::ALL[0];
    for attempt in 1..=INSTALL_ATTEMPTS {
        for signal in FatalSignal::ALL {
            let current = signals::query(signal.as_raw()).map_err(|source| CaptureError::SignalInstall {
                signal: signal.as_raw(),
                source,
            })?;
            state.priors.record(signal.as_raw(), current);
        }

        ENGINE.store(Box::into_raw(state), Ordering::SeqCst);

        match replace_all() {
            Ok(()) => return Ok(()),
            Err(InstallFailure::Failed(err)) => {
                release_engine();
                return Err(err);
            }
            Err(InstallFailure::Raced(signal)) => {
                debug!(signal = signal.name(), attempt, "disposition changed during install, retrying");
                last_raced = signal;
                match unpublish_engine() {
                    Some(reclaimed) => state = reclaimed,
                    None => return Err(raced_error(signal)),
                }
            }
        }
    }

    Err(raced_error(last_raced))
}

fn raced_error(signal: FatalSignal) -> CaptureError
{
    CaptureError::SignalInstall {
        signal: signal.as_raw(),
        source: io::Error::other("disposition kept changing during install"),
    }
}

/// Swap the engine's handler in for every fatal signal.
///
/// Each displaced disposition is checked against the one recorded before
/// publication. On any failure every signal is back to its state before the
/// call.
fn replace_all() -> Result<(), InstallFailure>
{
    let engine = ENGINE.load(Ordering::SeqCst);
    // SAFETY: published by install_engine and not freed until it returns.
    let Some(state) = (unsafe { engine.as_ref() }) else {
        return Ok(());
    };

    for (index, signal) in FatalSignal::ALL.iter().enumerate() {
        let displaced = match signals::replace(signal.as_raw(), handle_fatal_signal) {
            Ok(displaced) => displaced,
            Err(source) => {
                warn!(signal = signal.name(), %source, "sigaction failed, rolling back");
                restore_priors(state, &FatalSignal::ALL[..index]);
                return Err(InstallFailure::Failed(CaptureError::SignalInstall {
                    signal: signal.as_raw(),
                    source,
                }));
            }
        };

        let recorded = state.priors.get(signal.as_raw()).copied().unwrap_or_default();
        if !recorded.same_handler_as(&displaced) {
            let _ = signals::reinstall(signal.as_raw(), &displaced);
            restore_priors(state, &FatalSignal::ALL[..index]);
            return Err(InstallFailure::Raced(*signal));
        }
        debug!(signal = signal.name(), "handler installed");
    }

    Ok(())
}

fn restore_priors(state: &EngineState, signals_to_restore: &[FatalSignal])
{
    for signal in signals_to_restore {
        if let Some(prior) = state.priors.get(signal.as_raw()) {
            let _ = signals::restore(signal.as_raw(), prior);
        }
    }
}

fn uninstall_engine()
{
    let engine = ENGINE.load(Ordering::SeqCst);
    // SAFETY: published by install_engine and not yet freed.
    let Some(state) = (unsafe { engine.as_ref() }) else {
        return;
    };
    if let Err(err) = state.priors.restore_all() {
        warn!(%err, "failed to restore a signal disposition");
    }
    release_engine();
}

/// Unpublish the engine state and free it once no handler can still see it.
fn release_engine()
{
    drop(unpublish_engine());
}

/// Take the engine state back from the handler.
///
/// `None` when nothing was published, or when a capture on another thread
/// is still using the state after [`TEARDOWN_WAIT`]; the state is leaked then.
fn unpublish_engine() -> Option<Box<EngineState>>
{
    let engine = ENGINE.swap(ptr::null_mut(), Ordering::SeqCst);
    if engine.is_null() {
        return None;
    }

    let deadline = Instant::now() + TEARDOWN_WAIT;
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        if Instant::now() >= deadline {
            warn!("capture still in flight after {:?}; leaking engine state", TEARDOWN_WAIT);
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }

    // SAFETY: created by Box::into_raw in install_engine, unpublished above,
    // and no handler holds a reference any more.
    Some(unsafe { Box::from_raw(engine) })
}

#[cfg(test)]
mod tests
{
    use std::mem;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    static TRAP_CALLS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn count_trap(_signo: c_int, _info: *mut siginfo_t, _ucontext: *mut c_void)
    {
        TRAP_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_late_signal_keeps_restored_disposition()
    {
        assert!(ENGINE.load(Ordering::SeqCst).is_null());
        let original = signals::query(libc::SIGTRAP).unwrap();
        signals::replace(libc::SIGTRAP, count_trap).unwrap();
        let restored = signals::query(libc::SIGTRAP).unwrap();

        // SAFETY: plain data; a zero si_code is SI_USER, as from kill(2).
        let mut info: siginfo_t = unsafe { mem::zeroed() };
        info.si_signo = libc::SIGTRAP;
        info.si_code = 0;
        handle_fatal_signal(libc::SIGTRAP, &mut info, ptr::null_mut());

        let after = signals::query(libc::SIGTRAP).unwrap();
        signals::restore(libc::SIGTRAP, &original).unwrap();

        assert_eq!(after, restored);
        assert_eq!(TRAP_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unpublish_without_engine()
    {
        assert!(unpublish_engine().is_none());
    }
}
