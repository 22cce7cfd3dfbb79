//! # RAII Guard for Runtime-Loaded Libraries
//!
//! Unwinding libraries are optional: they exist on some devices and OS
//! versions and not on others, so they are never linked. Instead they are
//! opened by name when a crash happens and closed again when the guard is
//! dropped, whichever way the strategy ends.

use std::ffi::CStr;
use std::mem;
use std::ptr::NonNull;

use libc::c_void;

/// An open `dlopen` handle, closed on drop.
#[derive(Debug)]
pub struct DynamicLibrary
{
    handle: NonNull<c_void>,
}

impl DynamicLibrary
{
    /// Open `name` with local symbol binding. `None` if the loader cannot find it.
    pub fn open(name: &CStr) -> Option<Self>
    {
        // SAFETY: `name` is NUL-terminated; dlopen reports failure by returning null.
        let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_LAZY | libc::RTLD_LOCAL) };
        NonNull::new(handle).map(|handle| Self { handle })
    }

    /// Raw address of an exported symbol.
    pub fn symbol(&self, name: &CStr) -> Option<NonNull<c_void>>
    {
        // SAFETY: the handle is open for as long as `self` lives.
        NonNull::new(unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) })
    }

    /// Look up an exported function and reinterpret it as `F`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the real
    /// signature of the symbol, and the returned pointer must not be called
    /// after `self` is dropped.
    pub unsafe fn function<F: Copy>(&self, name: &CStr) -> Option<F>
    {
        const { assert!(mem::size_of::<F>() == mem::size_of::<*mut c_void>()) };
        let address = self.symbol(name)?.as_ptr();
        // SAFETY: sizes match (checked above); the caller vouches for the type.
        Some(unsafe { mem::transmute_copy::<*mut c_void, F>(&address) })
    }
}

impl Drop for DynamicLibrary
{
    fn drop(&mut self)
    {
        // Nothing useful to do if dlclose fails.
        unsafe {
            let _ = libc::dlclose(self.handle.as_ptr());
        }
    }
}
