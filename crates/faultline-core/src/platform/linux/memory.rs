//! Fault-free reads of the process's own stack.
//!
//! Dereferencing a stack word directly would fault again if the stack
//! pointer is garbage. `process_vm_readv` against our own pid copies through
//! the kernel instead and reports how far it got, so an unmapped word just
//! ends the read. Each word gets its own remote iovec: the kernel stops at the
//! first remote iovec that cannot be read, which gives word-exact partial reads.

use std::mem::size_of;

use crate::config::MAX_SCAN_WINDOW_WORDS;
use crate::types::Address;
use crate::unwind::StackMemory;

const WORD: usize = size_of::<usize>();

/// [`StackMemory`] over the current process.
#[derive(Debug, Clone, Copy)]
pub struct LiveStack
{
    pid: libc::pid_t,
}

impl LiveStack
{
    pub fn new() -> Self
    {
        // SAFETY: getpid is always safe.
        Self {
            pid: unsafe { libc::getpid() },
        }
    }
}

impl Default for LiveStack
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl StackMemory for LiveStack
{
    fn read_words(&self, start: Address, out: &mut [usize]) -> usize
    {
        let words = out.len().min(MAX_SCAN_WINDOW_WORDS);
        if words == 0 {
            return 0;
        }

        let empty = libc::iovec {
            iov_base: std::ptr::null_mut(),
            iov_len: 0,
        };
        let mut remote = [empty; MAX_SCAN_WINDOW_WORDS];
        for (index, iov) in remote[..words].iter_mut().enumerate() {
            let Some(address) = start.checked_add(index * WORD) else {
                return 0;
            };
            iov.iov_base = address.value() as *mut libc::c_void;
            iov.iov_len = WORD;
        }
        let local = libc::iovec {
            iov_base: out.as_mut_ptr().cast(),
            iov_len: words * WORD,
        };

        // SAFETY: `local` covers `words` writable words of `out`; the kernel
        // validates every remote range and never faults on them.
        let copied = unsafe {
            libc::syscall(
                libc::SYS_process_vm_readv,
                self.pid,
                &local as *const libc::iovec,
                1 as libc::c_ulong,
                remote.as_ptr(),
                words as libc::c_ulong,
                0 as libc::c_ulong,
            )
        };

        if copied <= 0 {
            0
        } else {
            copied as usize / WORD
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_reads_own_stack_words()
    {
        let words: [usize; 4] = [0x11, 0x22, 0x33, 0x44];
        let mut out = [0usize; 4];
        let read = LiveStack::new().read_words(Address::new(words.as_ptr() as usize), &mut out);
        assert_eq!(read, 4);
        assert_eq!(out, words);
    }

    #[test]
    fn test_unmapped_start_reads_nothing()
    {
        let mut out = [0usize; 8];
        assert_eq!(LiveStack::new().read_words(Address::new(WORD), &mut out), 0);
    }
}
