//! Tests for crash handler installation, teardown and capture
//!
//! Signal dispositions are process-wide, so every test that installs a
//! handler holds `LOCK`.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use faultline_core::platform::linux::signals::{self, Disposition};
use faultline_core::prelude::*;
use faultline_core::report::ReportSerializer;
use faultline_core::types::CrashReport;
use faultline_core::{CaptureGate, GateEntry};
use libc::{c_int, c_void, siginfo_t};

static LOCK: Mutex<()> = Mutex::new(());

fn serialize_tests() -> MutexGuard<'static, ()>
{
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn all_dispositions() -> Vec<Disposition>
{
    FatalSignal::ALL
        .iter()
        .map(|signal| signals::query(signal.as_raw()).unwrap())
        .collect()
}

fn report_files(dir: &Path) -> Vec<std::path::PathBuf>
{
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[test]
fn test_install_and_teardown_restore_dispositions()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();
    let before = all_dispositions();

    let handler = CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), JsonSerializer).unwrap();
    assert!(CrashHandler::is_installed());
    for signal in FatalSignal::ALL {
        let action = signals::query(signal.as_raw()).unwrap();
        assert!(action.has_siginfo(), "{signal}");
    }
    assert_ne!(all_dispositions(), before);

    handler.teardown();
    assert!(!CrashHandler::is_installed());
    assert_eq!(all_dispositions(), before);
}

#[test]
fn test_teardown_restores_default_without_restorer()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();
    let original = signals::query(libc::SIGFPE).unwrap();
    signals::reset_to_default(libc::SIGFPE).unwrap();

    let handler = CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), JsonSerializer).unwrap();
    handler.teardown();
    let restored = signals::query(libc::SIGFPE).unwrap();
    signals::restore(libc::SIGFPE, &original).unwrap();

    assert_eq!(restored, Disposition::default_action());
    assert_eq!(restored.flags(), 0);
    assert_eq!(restored.restorer(), 0);
}

#[test]
fn test_second_install_is_rejected()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();

    let handler = CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), JsonSerializer).unwrap();
    let second = CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), JsonSerializer);
    assert!(matches!(second, Err(CaptureError::AlreadyInstalled)));
    assert!(CrashHandler::is_installed());

    drop(handler);
    assert!(!CrashHandler::is_installed());

    let again = CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), JsonSerializer).unwrap();
    again.teardown();
}

#[test]
fn test_invalid_config_installs_nothing()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();
    let before = all_dispositions();

    let missing = CrashHandler::install(
        CaptureConfig::new(dir.path().join("missing")),
        ReportMetadata::new(),
        JsonSerializer,
    );
    assert!(matches!(missing, Err(CaptureError::Io(_))));

    let zero_window = CrashHandler::install(
        CaptureConfig::new(dir.path()).with_scan_window(0),
        ReportMetadata::new(),
        JsonSerializer,
    );
    assert!(matches!(zero_window, Err(CaptureError::InvalidConfig(_))));

    assert!(!CrashHandler::is_installed());
    assert_eq!(all_dispositions(), before);
}

static PRIOR_CALLS: AtomicUsize = AtomicUsize::new(0);
static PRIOR_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn prior_handler(signo: c_int, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    PRIOR_SIGNAL.store(signo, Ordering::SeqCst);
    PRIOR_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_capture_writes_report_and_chains_to_prior()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();
    let original = signals::query(libc::SIGTRAP).unwrap();
    signals::replace(libc::SIGTRAP, prior_handler).unwrap();
    PRIOR_CALLS.store(0, Ordering::SeqCst);

    let metadata = ReportMetadata::new().with("app", "name", "handler-test");
    let handler = CrashHandler::install(CaptureConfig::new(dir.path()), metadata, JsonSerializer).unwrap();

    // SAFETY: the prior SIGTRAP disposition is a handler that just records the call.
    unsafe {
        libc::raise(libc::SIGTRAP);
    }

    handler.teardown();
    let restored = signals::query(libc::SIGTRAP).unwrap();
    signals::restore(libc::SIGTRAP, &original).unwrap();

    assert_eq!(PRIOR_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(PRIOR_SIGNAL.load(Ordering::SeqCst), libc::SIGTRAP);
    assert_eq!(restored.handler(), prior_handler as usize);

    let reports = report_files(dir.path());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].extension().and_then(|ext| ext.to_str()), Some("json"));

    let written = std::fs::read_to_string(&reports[0]).unwrap();
    assert!(written.contains("\"app\":{\"name\":\"handler-test\"}"));
    assert!(written.contains("\"errorClass\":\"Native Error: SIGTRAP\""));
    assert!(written.contains(&format!("\"signal\":{}", libc::SIGTRAP)));
}

static BUS_CALLS: AtomicUsize = AtomicUsize::new(0);
static TRAP_CALLS: AtomicUsize = AtomicUsize::new(0);
static SERIALIZE_CALLS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn record_bus(_signo: c_int, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    BUS_CALLS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn record_trap(_signo: c_int, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    TRAP_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// Faults with SIGBUS halfway through writing each report.
struct FaultingSerializer;

impl ReportSerializer for FaultingSerializer
{
    fn extension(&self) -> &'static str
    {
        "json"
    }

    fn serialize(&self, report: &CrashReport, sink: &mut dyn fmt::Write) -> fmt::Result
    {
        SERIALIZE_CALLS.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the prior SIGBUS disposition is a handler that just records the call.
        unsafe {
            libc::raise(libc::SIGBUS);
        }
        JsonSerializer.serialize(report, sink)
    }
}

#[test]
fn test_fault_during_capture_goes_to_prior_handler()
{
    let _guard = serialize_tests();
    let dir = tempfile::tempdir().unwrap();
    let original_bus = signals::query(libc::SIGBUS).unwrap();
    let original_trap = signals::query(libc::SIGTRAP).unwrap();
    signals::replace(libc::SIGBUS, record_bus).unwrap();
    signals::replace(libc::SIGTRAP, record_trap).unwrap();
    BUS_CALLS.store(0, Ordering::SeqCst);
    TRAP_CALLS.store(0, Ordering::SeqCst);
    SERIALIZE_CALLS.store(0, Ordering::SeqCst);

    let handler =
        CrashHandler::install(CaptureConfig::new(dir.path()), ReportMetadata::new(), FaultingSerializer).unwrap();

    // SAFETY: both prior dispositions are handlers that just record the call.
    unsafe {
        libc::raise(libc::SIGTRAP);
    }

    handler.teardown();
    signals::restore(libc::SIGBUS, &original_bus).unwrap();
    signals::restore(libc::SIGTRAP, &original_trap).unwrap();

    assert_eq!(SERIALIZE_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(BUS_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(TRAP_CALLS.load(Ordering::SeqCst), 1);

    let reports = report_files(dir.path());
    assert_eq!(reports.len(), 1);
    let written = std::fs::read_to_string(&reports[0]).unwrap();
    assert!(written.contains("\"errorClass\":\"Native Error: SIGTRAP\""));
}

#[test]
fn test_capture_gate_states()
{
    let gate = CaptureGate::new();
    assert_eq!(gate.owner(), None);

    assert_eq!(gate.try_enter(100), GateEntry::Entered);
    assert_eq!(gate.try_enter(100), GateEntry::Recursive);
    assert_eq!(gate.try_enter(200), GateEntry::Busy);
    assert_eq!(gate.owner(), Some(100));

    gate.leave(200);
    assert_eq!(gate.owner(), Some(100));

    gate.leave(100);
    assert_eq!(gate.owner(), None);
    assert_eq!(gate.try_enter(200), GateEntry::Entered);
}

#[test]
fn test_capture_gate_across_threads()
{
    let gate = CaptureGate::new();
    assert_eq!(gate.try_enter(1), GateEntry::Entered);

    std::thread::scope(|scope| {
        scope.spawn(|| assert_eq!(gate.try_enter(2), GateEntry::Busy));
    });

    gate.leave(1);
    std::thread::scope(|scope| {
        scope.spawn(|| assert_eq!(gate.try_enter(2), GateEntry::Entered));
    });
    assert_eq!(gate.owner(), Some(2));
}
