//! Frame classification and report assembly.

use std::fmt::Write;

use crate::config::HANDLER_FRAMES_TO_SKIP;
use crate::symbols::{classify, SymbolInfo, SymbolResolver};
use crate::types::{signal_name, CrashReport, FaultInfo, RawFrame, RawTrace, StackFrame, UnwindStrategy};

/// Fill `report` from a raw trace captured at `timestamp` (unix seconds).
///
/// The report is wiped first. The innermost [`HANDLER_FRAMES_TO_SKIP`] raw
/// frames belong to the signal handler and are ignored; of the rest, every
/// frame whose owning file resolves becomes one classified stack frame, until
/// the report's frame capacity is used up.
pub fn build_report<R: SymbolResolver + ?Sized>(
    report: &mut CrashReport,
    fault: FaultInfo,
    unwinder: UnwindStrategy,
    trace: &RawTrace,
    resolver: &R,
    timestamp: i64,
)
{
    report.reset();
    report.set_fault(fault);
    report.set_unwinder(unwinder);
    report.set_timestamp(timestamp);

    let name = signal_name(fault.signal);
    // BoundedStr writes never fail; overlong text is truncated.
    let _ = write!(
        report.message_mut(),
        "Fatal signal from native: {} ({}), code {}",
        fault.signal,
        name,
        fault.code
    );
    let _ = write!(report.error_class_mut(), "Native Error: {name}");

    for raw in trace.frames().iter().skip(HANDLER_FRAMES_TO_SKIP) {
        let Some(info) = resolver.resolve(raw.address) else {
            continue;
        };
        let Some(slot) = report.next_frame_slot() else {
            break;
        };
        classify_frame(slot, raw, &info);
        report.commit_frame();
    }
}

/// Populate one report frame from a raw frame and what the resolver knows about it.
fn classify_frame(slot: &mut StackFrame, raw: &RawFrame, info: &SymbolInfo<'_>)
{
    slot.file.set(info.file);
    slot.frame_address = raw.address;

    if raw.name.is_empty() {
        slot.method.set(info.symbol.unwrap_or(""));
    } else {
        slot.method.set(raw.name.as_str());
    }

    slot.file_address = info.file_base;
    slot.file_offset = raw.address.value().wrapping_sub(info.file_base.value());

    slot.method_address = info.symbol_address;
    slot.method_offset = info
        .symbol_address
        .map(|base| raw.address.value().wrapping_sub(base.value()));

    let method = (!slot.method.is_empty()).then(|| slot.method.as_str());
    slot.in_project = classify::in_project(Some(slot.file.as_str()), method);
}
