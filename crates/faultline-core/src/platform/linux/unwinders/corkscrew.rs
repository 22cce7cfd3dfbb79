//! Runtime-loaded `libcorkscrew`, the unwinder of older Android releases.
//!
//! One call unwinds from the signal context, a second symbolises the result
//! against the process's map list. The library owns the symbol strings until
//! `free_backtrace_symbols`, so frames are visited before that call.

use std::ffi::CStr;
use std::mem::size_of;

use libc::{c_char, c_void, siginfo_t};

use super::super::dynlib::DynamicLibrary;
use crate::platform::MachineContext;
use crate::types::bounded::utf8_prefix;
use crate::types::Address;
use crate::unwind::backends::{LegacyBacktrace, LegacyFrame, UnwindScratch};

#[repr(C)]
#[allow(dead_code)]
struct BacktraceFrame
{
    absolute_pc: usize,
    stack_top: usize,
    stack_size: usize,
}

#[repr(C)]
#[allow(dead_code)]
struct BacktraceSymbol
{
    relative_pc: usize,
    relative_symbol_addr: usize,
    map_name: *mut c_char,
    symbol_name: *mut c_char,
    demangled_name: *mut c_char,
}

const _: () = assert!(size_of::<BacktraceFrame>() == size_of::<[usize; 3]>());
const _: () = assert!(size_of::<BacktraceSymbol>() == size_of::<[usize; 5]>());

type UnwindSignal = unsafe extern "C" fn(
    info: *mut siginfo_t,
    context: *mut c_void,
    maps: *const c_void,
    frames: *mut BacktraceFrame,
    ignore_depth: usize,
    max_depth: usize,
) -> isize;
type AcquireMaps = unsafe extern "C" fn() -> *mut c_void;
type ReleaseMaps = unsafe extern "C" fn(maps: *mut c_void);
type GetSymbols = unsafe extern "C" fn(frames: *const BacktraceFrame, count: usize, symbols: *mut BacktraceSymbol);
type FreeSymbols = unsafe extern "C" fn(symbols: *mut BacktraceSymbol, count: usize);

/// `libcorkscrew` with every entry point resolved.
pub struct Corkscrew
{
    unwind_signal: UnwindSignal,
    acquire_maps: AcquireMaps,
    release_maps: ReleaseMaps,
    get_symbols: GetSymbols,
    free_symbols: FreeSymbols,
    _library: DynamicLibrary,
}

impl Corkscrew
{
    pub fn load() -> Option<Self>
    {
        let library = DynamicLibrary::open(c"libcorkscrew.so")?;
        // SAFETY: the types mirror <corkscrew/backtrace.h>.
        unsafe {
            Some(Self {
                unwind_signal: library.function(c"unwind_backtrace_signal_arch")?,
                acquire_maps: library.function(c"acquire_my_map_info_list")?,
                release_maps: library.function(c"release_my_map_info_list")?,
                get_symbols: library.function(c"get_backtrace_symbols")?,
                free_symbols: library.function(c"free_backtrace_symbols")?,
                _library: library,
            })
        }
    }
}

fn optional_str<'a>(raw: *const c_char) -> Option<&'a str>
{
    if raw.is_null() {
        return None;
    }
    // SAFETY: non-null, NUL-terminated, owned by the library until freed.
    Some(utf8_prefix(unsafe { CStr::from_ptr(raw) }.to_bytes()))
}

impl LegacyBacktrace for Corkscrew
{
    fn backtrace(
        &self,
        context: &MachineContext,
        scratch: &mut UnwindScratch,
        max_depth: usize,
        visit: &mut dyn FnMut(LegacyFrame<'_>),
    )
    {
        if context.is_detached() {
            return;
        }

        let depth = max_depth.min(scratch.legacy_frames.len()).min(scratch.legacy_symbols.len());
        let frames = scratch.legacy_frames.as_mut_ptr().cast::<BacktraceFrame>();
        let symbols = scratch.legacy_symbols.as_mut_ptr().cast::<BacktraceSymbol>();

        // SAFETY: `frames` holds at least `depth` entries; the context
        // pointers come from the running handler.
        let captured = unsafe {
            let maps = (self.acquire_maps)();
            let captured = (self.unwind_signal)(
                context.raw_info().cast_mut(),
                context.raw_ucontext().cast_mut().cast(),
                maps,
                frames,
                0,
                depth,
            );
            (self.release_maps)(maps);
            captured
        };
        if captured <= 0 {
            return;
        }
        let count = (captured as usize).min(depth);

        // SAFETY: `symbols` holds at least `count` entries.
        unsafe { (self.get_symbols)(frames, count, symbols) };
        for index in 0..count {
            // SAFETY: both arrays were filled for `count` entries above.
            let (frame, symbol) = unsafe { (&*frames.add(index), &*symbols.add(index)) };
            visit(LegacyFrame {
                address: Address::new(frame.absolute_pc),
                symbol: optional_str(symbol.symbol_name),
                map: optional_str(symbol.map_name),
            });
        }
        // SAFETY: releases what get_backtrace_symbols allocated.
        unsafe { (self.free_symbols)(symbols, count) };
    }
}
