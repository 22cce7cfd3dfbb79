//! # Stack Unwinding
//!
//! Best-effort reconstruction of the crashed thread's call stack, from inside
//! the signal handler. Strategies are tried in order and the first acceptable
//! result wins:
//!
//! 1. **Full unwinder** (`libunwind`): cursor walk seeded from the machine
//!    context. Accepted when it records at least one frame.
//! 2. **Legacy backtrace** (`libcorkscrew`): one-shot symbolised backtrace.
//!    Accepted only when at least one frame lies outside system code.
//! 3. **Stack scan**: heuristic search of stack memory, see [`scan`].
//! 4. **Basic**: the program counter alone.
//!
//! Libraries are looked up again on every crash. Every strategy writes into
//! the pre-allocated [`RawTrace`] and [`UnwindScratch`], so nothing here
//! allocates or takes a lock.

pub mod backends;
pub mod memory;
pub mod scan;

pub use backends::{
    Capability, FullUnwinder, LegacyBacktrace, LegacyFrame, NoBackends, UnwindBackends, UnwindCursor, UnwindScratch,
};
pub use memory::{StackMemory, StackSpan};
pub use scan::scan_stack;

use crate::config::DEFAULT_SCAN_WINDOW_WORDS;
use crate::platform::MachineContext;
use crate::symbols::{classify, SymbolResolver};
use crate::types::{Address, RawTrace, UnwindStrategy};

/// Strategy selector over a set of backends, stack memory and a resolver.
pub struct StackUnwinder<'a, B: ?Sized, M: ?Sized, R: ?Sized>
{
    backends: &'a B,
    memory: &'a M,
    resolver: &'a R,
    scan_window: usize,
    stack_end: Option<Address>,
}

impl<'a, B, M, R> StackUnwinder<'a, B, M, R>
where
    B: UnwindBackends + ?Sized,
    M: StackMemory + ?Sized,
    R: SymbolResolver + ?Sized,
{
    pub fn new(backends: &'a B, memory: &'a M, resolver: &'a R) -> Self
    {
        Self {
            backends,
            memory,
            resolver,
            scan_window: DEFAULT_SCAN_WINDOW_WORDS,
            stack_end: None,
        }
    }

    /// Words examined per manual-scan step.
    #[must_use]
    pub fn with_scan_window(mut self, words: usize) -> Self
    {
        self.scan_window = words;
        self
    }

    /// Highest stack address (exclusive) the manual scan may read.
    #[must_use]
    pub fn with_stack_end(mut self, end: Address) -> Self
    {
        self.stack_end = Some(end);
        self
    }

    /// Fill `trace` with at most `max_depth` frames and report which strategy produced them.
    ///
    /// `trace` is reset first. The result always holds at least one frame
    /// unless `max_depth` is zero.
    pub fn unwind(
        &self,
        context: &MachineContext,
        scratch: &mut UnwindScratch,
        max_depth: usize,
        trace: &mut RawTrace,
    ) -> UnwindStrategy
    {
        trace.begin(max_depth);

        if self.try_full_unwinder(context, scratch, trace) {
            return UnwindStrategy::FullUnwinder;
        }
        trace.discard();

        if self.try_legacy_backtrace(context, scratch, trace) {
            return UnwindStrategy::LegacyBacktrace;
        }
        trace.discard();

        let span = match self.stack_end {
            Some(end) => StackSpan::new(context.stack_pointer(), end),
            None => StackSpan::from_pointer(context.stack_pointer()),
        };
        if scan_stack(context.program_counter(), span, self.memory, self.resolver, self.scan_window, trace) > 0 {
            return UnwindStrategy::StackScan;
        }

        trace.push(context.program_counter());
        UnwindStrategy::Basic
    }

    fn try_full_unwinder(&self, context: &MachineContext, scratch: &mut UnwindScratch, trace: &mut RawTrace) -> bool
    {
        let Capability::Available(unwinder) = self.backends.full_unwinder() else {
            return false;
        };

        let started = unwinder.with_cursor(context, scratch, &mut |cursor| {
            while let Some(slot) = trace.pending_mut() {
                let Some(ip) = cursor.instruction_pointer() else {
                    break;
                };
                slot.address = ip;
                // A zero offset means no procedure covers this frame; it is not recorded.
                if cursor.procedure_name(&mut slot.name) == 0 {
                    break;
                }
                trace.commit();
                if !cursor.step() {
                    break;
                }
            }
        });

        started && !trace.is_empty()
    }

    fn try_legacy_backtrace(&self, context: &MachineContext, scratch: &mut UnwindScratch, trace: &mut RawTrace) -> bool
    {
        let Capability::Available(legacy) = self.backends.legacy_backtrace() else {
            return false;
        };

        let mut found_application_frame = false;
        let max_depth = trace.limit();
        legacy.backtrace(context, scratch, max_depth, &mut |frame| {
            trace.push_named(frame.address, frame.symbol.unwrap_or(""));
            if frame.map.is_some() && classify::in_project(frame.map, frame.symbol) {
                found_application_frame = true;
            }
        });

        found_application_frame
    }
}
