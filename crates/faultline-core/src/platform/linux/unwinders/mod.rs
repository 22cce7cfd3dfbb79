//! Live [`UnwindBackends`]: the system's unwinding libraries, opened on demand.

mod corkscrew;
mod libunwind;

pub use corkscrew::Corkscrew;
pub use libunwind::LibUnwind;

use crate::unwind::{Capability, UnwindBackends};

/// Looks for `libunwind.so` and `libcorkscrew.so` every time it is asked.
///
/// Nothing is cached between crashes: each lookup opens the library afresh
/// and the handle is closed when the strategy finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicBackends;

impl UnwindBackends for DynamicBackends
{
    type Full = LibUnwind;
    type Legacy = Corkscrew;

    fn full_unwinder(&self) -> Capability<LibUnwind>
    {
        LibUnwind::load().into()
    }

    fn legacy_backtrace(&self) -> Capability<Corkscrew>
    {
        Corkscrew::load().into()
    }
}
