//! Runtime-loaded `libunwind` (the nongnu implementation shipped by Android).
//!
//! The library exports its API under architecture-prefixed names
//! (`_Uarm_step`, `_Ux86_64_step`, ...), so the entry points are resolved by
//! prefix at crash time. The cursor and the seeded context both live in the
//! pre-allocated [`UnwindScratch`].

use std::ffi::CStr;
use std::mem::size_of;

use libc::{c_char, c_int, c_void};

use super::super::dynlib::DynamicLibrary;
use crate::platform::MachineContext;
use crate::types::bounded::utf8_prefix;
use crate::types::{Address, MethodName};
use crate::unwind::backends::{FullUnwinder, UnwindCursor, UnwindScratch, CONTEXT_WORDS};

type InitLocal = unsafe extern "C" fn(cursor: *mut c_void, context: *mut c_void) -> c_int;
type Step = unsafe extern "C" fn(cursor: *mut c_void) -> c_int;
type GetReg = unsafe extern "C" fn(cursor: *mut c_void, register: c_int, value: *mut usize) -> c_int;
type GetProcName =
    unsafe extern "C" fn(cursor: *mut c_void, name: *mut c_char, len: usize, offset: *mut usize) -> c_int;

struct EntryPoints
{
    init_local: &'static CStr,
    step: &'static CStr,
    get_reg: &'static CStr,
    get_proc_name: &'static CStr,
    /// `UNW_REG_IP` for this architecture.
    ip_register: c_int,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        const ENTRY_POINTS: EntryPoints = EntryPoints {
            init_local: c"_Ux86_64_init_local",
            step: c"_Ux86_64_step",
            get_reg: c"_Ux86_64_get_reg",
            get_proc_name: c"_Ux86_64_get_proc_name",
            ip_register: 16,
        };
    } else if #[cfg(target_arch = "x86")] {
        const ENTRY_POINTS: EntryPoints = EntryPoints {
            init_local: c"_Ux86_init_local",
            step: c"_Ux86_step",
            get_reg: c"_Ux86_get_reg",
            get_proc_name: c"_Ux86_get_proc_name",
            ip_register: 8,
        };
    } else if #[cfg(target_arch = "aarch64")] {
        const ENTRY_POINTS: EntryPoints = EntryPoints {
            init_local: c"_Uaarch64_init_local",
            step: c"_Uaarch64_step",
            get_reg: c"_Uaarch64_get_reg",
            get_proc_name: c"_Uaarch64_get_proc_name",
            ip_register: 30,
        };
    } else if #[cfg(target_arch = "arm")] {
        const ENTRY_POINTS: EntryPoints = EntryPoints {
            init_local: c"_Uarm_init_local",
            step: c"_Uarm_step",
            get_reg: c"_Uarm_get_reg",
            get_proc_name: c"_Uarm_get_proc_name",
            // UNW_TDEP_IP is r14 on ARM.
            ip_register: 14,
        };
    }
}

const _: () = assert!(size_of::<libc::ucontext_t>() <= CONTEXT_WORDS * size_of::<u64>());

/// `libunwind` with every entry point resolved.
pub struct LibUnwind
{
    init_local: InitLocal,
    step: Step,
    get_reg: GetReg,
    get_proc_name: GetProcName,
    // Keeps the function pointers above valid; must be dropped last.
    _library: DynamicLibrary,
}

impl LibUnwind
{
    /// Open `libunwind.so` and resolve the entry points for this architecture.
    pub fn load() -> Option<Self>
    {
        let library = DynamicLibrary::open(c"libunwind.so")?;
        // SAFETY: the types mirror libunwind's public prototypes.
        unsafe {
            Some(Self {
                init_local: library.function(ENTRY_POINTS.init_local)?,
                step: library.function(ENTRY_POINTS.step)?,
                get_reg: library.function(ENTRY_POINTS.get_reg)?,
                get_proc_name: library.function(ENTRY_POINTS.get_proc_name)?,
                _library: library,
            })
        }
    }
}

/// Copy the interrupted registers into libunwind's context layout.
///
/// On ARM `unw_context_t` is just r0..r15; everywhere else it is the
/// `ucontext_t` itself.
fn seed_context(context: &MachineContext, out: &mut [u64])
{
    let ucontext = context.raw_ucontext();

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            // SAFETY: non-null (checked by the caller) and live for the handler.
            let mc = unsafe { &(*ucontext).uc_mcontext };
            let regs: [libc::c_ulong; 16] = [
                mc.arm_r0, mc.arm_r1, mc.arm_r2, mc.arm_r3, mc.arm_r4, mc.arm_r5, mc.arm_r6, mc.arm_r7,
                mc.arm_r8, mc.arm_r9, mc.arm_r10, mc.arm_fp, mc.arm_ip, mc.arm_sp, mc.arm_lr, mc.arm_pc,
            ];
            // SAFETY: 16 words fit easily in the context buffer.
            unsafe {
                std::ptr::copy_nonoverlapping(regs.as_ptr().cast::<u8>(), out.as_mut_ptr().cast::<u8>(), size_of::<[libc::c_ulong; 16]>());
            }
        } else {
            // SAFETY: non-null (checked by the caller); the buffer is at least
            // as large as ucontext_t (asserted at compile time).
            unsafe {
                std::ptr::copy_nonoverlapping(
                    ucontext.cast::<u8>(),
                    out.as_mut_ptr().cast::<u8>(),
                    size_of::<libc::ucontext_t>(),
                );
            }
        }
    }
}

impl FullUnwinder for LibUnwind
{
    fn with_cursor(
        &self,
        context: &MachineContext,
        scratch: &mut UnwindScratch,
        walk: &mut dyn FnMut(&mut dyn UnwindCursor),
    ) -> bool
    {
        if context.is_detached() {
            return false;
        }

        seed_context(context, &mut scratch.context);
        let cursor = scratch.cursor.as_mut_ptr().cast::<c_void>();
        // SAFETY: both buffers are large enough for the library's structures.
        if unsafe { (self.init_local)(cursor, scratch.context.as_mut_ptr().cast()) } < 0 {
            return false;
        }

        let mut live = LiveCursor {
            api: self,
            cursor,
            name: &mut scratch.name,
        };
        walk(&mut live);
        true
    }
}

struct LiveCursor<'a>
{
    api: &'a LibUnwind,
    cursor: *mut c_void,
    name: &'a mut [u8],
}

impl UnwindCursor for LiveCursor<'_>
{
    fn instruction_pointer(&mut self) -> Option<Address>
    {
        let mut ip = 0usize;
        // SAFETY: the cursor was initialised by init_local.
        if unsafe { (self.api.get_reg)(self.cursor, ENTRY_POINTS.ip_register, &mut ip) } < 0 {
            return None;
        }
        Some(Address::new(ip))
    }

    fn procedure_name(&mut self, name: &mut MethodName) -> usize
    {
        let mut offset = 0usize;
        self.name.fill(0);
        // SAFETY: the library writes at most `len` bytes including the NUL.
        unsafe {
            (self.api.get_proc_name)(self.cursor, self.name.as_mut_ptr().cast(), self.name.len(), &mut offset);
        }

        let end = self.name.iter().position(|&byte| byte == 0).unwrap_or(self.name.len());
        name.set(utf8_prefix(&self.name[..end]));
        offset
    }

    fn step(&mut self) -> bool
    {
        // SAFETY: the cursor was initialised by init_local.
        unsafe { (self.api.step)(self.cursor) > 0 }
    }
}
