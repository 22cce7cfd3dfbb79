//! Tests for report assembly and persistence

use std::fmt::Write;

use faultline_core::config::HANDLER_FRAMES_TO_SKIP;
use faultline_core::report::persist::{report_path, storage_prefix, write_report};
use faultline_core::report::{build_report, JsonSerializer, ReportSerializer};
use faultline_core::symbols::{SymbolInfo, SymbolResolver};
use faultline_core::types::{
    Address, CrashReport, FaultInfo, RawTrace, ReportMetadata, UnwindStrategy, MAX_FRAMES,
};

const GAME_BASE: usize = 0x40_0000;
const LIBC_BASE: usize = 0x50_0000;
const HANDLER: usize = 0x60_0000;

struct FakeResolver;

impl SymbolResolver for FakeResolver
{
    fn resolve(&self, address: Address) -> Option<SymbolInfo<'_>>
    {
        match address.value() {
            value if (GAME_BASE..GAME_BASE + 0x1000).contains(&value) => Some(SymbolInfo {
                file: "/data/app/com.example/lib/arm64/libgame.so",
                file_base: Address::new(GAME_BASE),
                symbol: Some("game_update"),
                symbol_address: Some(Address::new(GAME_BASE + 0x100)),
            }),
            value if (GAME_BASE + 0x1000..GAME_BASE + 0x2000).contains(&value) => Some(SymbolInfo {
                file: "/data/app/com.example/lib/arm64/libgame.so",
                file_base: Address::new(GAME_BASE),
                symbol: None,
                symbol_address: None,
            }),
            value if (LIBC_BASE..LIBC_BASE + 0x1000).contains(&value) => Some(SymbolInfo {
                file: "/system/lib64/libc.so",
                file_base: Address::new(LIBC_BASE),
                symbol: Some("abort"),
                symbol_address: Some(Address::new(LIBC_BASE)),
            }),
            value if (HANDLER..HANDLER + 0x1000).contains(&value) => Some(SymbolInfo {
                file: "/data/app/com.example/lib/arm64/libfaultline.so",
                file_base: Address::new(HANDLER),
                symbol: Some("handle_fatal_signal"),
                symbol_address: Some(Address::new(HANDLER)),
            }),
            _ => None,
        }
    }
}

/// Two handler frames followed by `frames`.
fn trace_of(frames: &[(usize, &str)]) -> RawTrace
{
    let mut trace = RawTrace::with_capacity(MAX_FRAMES);
    trace.begin(MAX_FRAMES);
    trace.push_named(Address::new(HANDLER + 0x10), "handle_fatal_signal");
    trace.push(Address::new(HANDLER + 0x20));
    for &(address, name) in frames {
        trace.push_named(Address::new(address), name);
    }
    trace
}

fn segv() -> FaultInfo
{
    FaultInfo::new(libc::SIGSEGV, 1, 0)
}

#[test]
fn test_message_and_error_class()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x120, "")]);

    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 1_700_000_000);

    assert_eq!(
        report.message(),
        format!("Fatal signal from native: {} (SIGSEGV), code 1", libc::SIGSEGV)
    );
    assert_eq!(report.error_class(), "Native Error: SIGSEGV");
    assert_eq!(report.unwinder(), UnwindStrategy::StackScan);
    assert_eq!(report.timestamp(), 1_700_000_000);
    assert_eq!(report.fault(), segv());
}

#[test]
fn test_unknown_signal_name()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[]);

    build_report(
        &mut report,
        FaultInfo::new(libc::SIGUSR2, 0, 0),
        UnwindStrategy::Basic,
        &trace,
        &FakeResolver,
        0,
    );

    assert_eq!(report.error_class(), "Native Error: UNKNOWN");
    assert!(report.message().contains("(UNKNOWN)"));
}

#[test]
fn test_handler_frames_are_skipped()
{
    assert_eq!(HANDLER_FRAMES_TO_SKIP, 2);

    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x120, ""), (LIBC_BASE + 0x40, "")]);

    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 0);

    assert_eq!(report.frames_used(), 2);
    assert!(report
        .stack_trace()
        .iter()
        .all(|frame| frame.file.as_str() != "/data/app/com.example/lib/arm64/libfaultline.so"));
}

#[test]
fn test_frame_offsets_and_classification()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x120, ""), (LIBC_BASE + 0x40, "")]);

    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 0);

    let game = &report.stack_trace()[0];
    assert_eq!(game.file.as_str(), "/data/app/com.example/lib/arm64/libgame.so");
    assert_eq!(game.method.as_str(), "game_update");
    assert_eq!(game.frame_address, Address::new(GAME_BASE + 0x120));
    assert_eq!(game.file_address, Address::new(GAME_BASE));
    assert_eq!(game.file_offset, 0x120);
    assert_eq!(game.method_address, Some(Address::new(GAME_BASE + 0x100)));
    assert_eq!(game.method_offset, Some(0x20));
    assert!(game.in_project);

    let libc_frame = &report.stack_trace()[1];
    assert_eq!(libc_frame.method.as_str(), "abort");
    assert_eq!(libc_frame.file_offset, 0x40);
    assert!(!libc_frame.in_project);
}

#[test]
fn test_frame_without_symbol_has_no_method_offset()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x1010, "")]);

    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 0);

    let frame = &report.stack_trace()[0];
    assert!(frame.method.is_empty());
    assert_eq!(frame.method_address, None);
    assert_eq!(frame.method_offset, None);
    assert_eq!(frame.file_offset, 0x1010);
    assert!(frame.in_project);
}

#[test]
fn test_unresolved_frames_are_dropped()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(0x10, "lost"), (GAME_BASE + 0x120, ""), (0xdead_0000, "")]);

    build_report(&mut report, segv(), UnwindStrategy::LegacyBacktrace, &trace, &FakeResolver, 0);

    assert_eq!(report.frames_used(), 1);
    assert_eq!(report.stack_trace()[0].frame_address, Address::new(GAME_BASE + 0x120));
}

#[test]
fn test_unwinder_name_wins_over_symbol()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x120, "inlined_helper"), (GAME_BASE + 0x130, "")]);

    build_report(&mut report, segv(), UnwindStrategy::FullUnwinder, &trace, &FakeResolver, 0);

    assert_eq!(report.stack_trace()[0].method.as_str(), "inlined_helper");
    assert_eq!(report.stack_trace()[1].method.as_str(), "game_update");
}

#[test]
fn test_frame_capacity_limits_report()
{
    let mut report = CrashReport::with_frame_capacity("/tmp", ReportMetadata::new(), 2);
    let frames: Vec<(usize, &str)> = (0..5).map(|index| (GAME_BASE + 0x200 + index * 4, "")).collect();
    let trace = trace_of(&frames);

    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 0);

    assert_eq!(report.frames_used(), 2);
    assert_eq!(report.frame_capacity(), 2);
}

#[test]
fn test_rebuild_leaves_no_stale_data()
{
    let mut report = CrashReport::new("/tmp", ReportMetadata::new());
    let first = trace_of(&[(GAME_BASE + 0x120, "first"), (LIBC_BASE + 0x40, "second")]);
    build_report(&mut report, segv(), UnwindStrategy::FullUnwinder, &first, &FakeResolver, 10);

    let abort = FaultInfo::new(libc::SIGABRT, -6, 0);
    let second = trace_of(&[(GAME_BASE + 0x1010, "")]);
    build_report(&mut report, abort, UnwindStrategy::StackScan, &second, &FakeResolver, 20);

    assert_eq!(report.frames_used(), 1);
    let frame = &report.stack_trace()[0];
    assert!(frame.method.is_empty());
    assert_eq!(frame.method_address, None);
    assert_eq!(report.error_class(), "Native Error: SIGABRT");
    assert_eq!(report.unwinder(), UnwindStrategy::StackScan);
    assert_eq!(report.timestamp(), 20);
}

#[test]
fn test_storage_prefix_has_trailing_slash()
{
    let dir = tempfile::tempdir().unwrap();
    let prefix = storage_prefix(dir.path()).unwrap();
    assert!(prefix.as_str().ends_with('/'));
    assert!(!prefix.as_str().ends_with("//"));

    let already = storage_prefix(std::path::Path::new("/data/crashes/")).unwrap();
    assert_eq!(already.as_str(), "/data/crashes/");
}

#[test]
fn test_storage_prefix_rejects_long_paths()
{
    let long = format!("/{}", "d".repeat(600));
    assert!(storage_prefix(std::path::Path::new(&long)).is_err());
}

#[test]
fn test_report_path_format()
{
    let path = report_path("/data/crashes/", 1_700_000_000, "json");
    assert_eq!(path.as_str(), "/data/crashes/1700000000.json");
    assert!(!path.is_truncated());
}

#[test]
fn test_write_report_creates_json_file()
{
    let dir = tempfile::tempdir().unwrap();
    let prefix = storage_prefix(dir.path()).unwrap();
    let metadata = ReportMetadata::new()
        .with("app", "version", "1.2.0")
        .with("device", "model", "Pixel \"7\"")
        .with("app", "build", "42");
    let mut report = CrashReport::new(dir.path(), metadata);
    let trace = trace_of(&[(GAME_BASE + 0x120, ""), (LIBC_BASE + 0x40, "")]);
    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 1_700_000_000);

    assert!(write_report(prefix.as_str(), &report, &JsonSerializer));

    let written = std::fs::read_to_string(dir.path().join("1700000000.json")).unwrap();
    assert!(written.starts_with("{\"metadata\":{\"app\":{\"version\":\"1.2.0\",\"build\":\"42\"},"));
    assert!(written.contains("\"device\":{\"model\":\"Pixel \\\"7\\\"\"}"));
    assert!(written.contains("\"errorClass\":\"Native Error: SIGSEGV\""));
    assert!(written.contains("\"unwinder\":\"stack-scan\""));
    assert!(written.contains("\"framesUsed\":2"));
    assert!(written.contains("\"method\":\"game_update\""));
    assert!(written.contains("\"inProject\":true"));
    assert!(written.contains("\"inProject\":false"));
    assert!(written.contains("\"timestamp\":1700000000"));
    assert!(written.ends_with("}\n"));
}

#[test]
fn test_write_report_overwrites_same_second()
{
    let dir = tempfile::tempdir().unwrap();
    let prefix = storage_prefix(dir.path()).unwrap();
    let mut report = CrashReport::new(dir.path(), ReportMetadata::new());

    let trace = trace_of(&[(GAME_BASE + 0x120, ""), (LIBC_BASE + 0x40, "")]);
    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 5);
    assert!(write_report(prefix.as_str(), &report, &JsonSerializer));

    let trace = trace_of(&[]);
    build_report(&mut report, segv(), UnwindStrategy::Basic, &trace, &FakeResolver, 5);
    assert!(write_report(prefix.as_str(), &report, &JsonSerializer));

    let written = std::fs::read_to_string(dir.path().join("5.json")).unwrap();
    assert!(written.contains("\"framesUsed\":0"));
    assert!(!written.contains("game_update"));
}

#[test]
fn test_write_report_to_missing_directory_fails()
{
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone");
    let prefix = storage_prefix(&missing).unwrap();
    let report = CrashReport::new(&missing, ReportMetadata::new());

    assert!(!write_report(prefix.as_str(), &report, &JsonSerializer));
}

/// Serializer that only records the frame count, in its own format.
struct CountOnly;

impl ReportSerializer for CountOnly
{
    fn extension(&self) -> &'static str
    {
        "txt"
    }

    fn serialize(&self, report: &CrashReport, sink: &mut dyn std::fmt::Write) -> std::fmt::Result
    {
        write!(sink, "{} frames", report.frames_used())
    }
}

#[test]
fn test_custom_serializer_extension()
{
    let dir = tempfile::tempdir().unwrap();
    let prefix = storage_prefix(dir.path()).unwrap();
    let mut report = CrashReport::new(dir.path(), ReportMetadata::new());
    let trace = trace_of(&[(GAME_BASE + 0x120, "")]);
    build_report(&mut report, segv(), UnwindStrategy::StackScan, &trace, &FakeResolver, 77);

    let boxed: Box<dyn ReportSerializer> = Box::new(CountOnly);
    assert!(write_report(prefix.as_str(), &report, &boxed));

    let written = std::fs::read_to_string(dir.path().join("77.txt")).unwrap();
    assert_eq!(written, "1 frames");
}
