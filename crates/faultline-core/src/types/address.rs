//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed in-process memory address
///
/// This wrapper around `usize` keeps return addresses, stack slots and load
/// bases apart from counts and offsets. The engine only ever inspects its own
/// address space, so the width matches the target pointer width.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(usize);

impl Address
{
    /// The null address (0x0)
    ///
    /// Never a valid return address; used as the "unset" value of frame slots.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a raw value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: usize) -> Self
    {
        Address(value)
    }

    /// Get the raw value of this address
    pub const fn value(self) -> usize
    {
        self.0
    }

    /// Returns `true` for the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(usize::MAX), None);
    /// ```
    pub fn checked_add(self, offset: usize) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance from `base` up to this address, or `None` if `base` lies above it.
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// let addr = Address::from(0x1234);
    /// assert_eq!(addr.offset_from(Address::from(0x1000)), Some(0x234));
    /// assert_eq!(addr.offset_from(Address::from(0x2000)), None);
    /// ```
    pub fn offset_from(self, base: Address) -> Option<usize>
    {
        self.0.checked_sub(base.0)
    }

    /// Address as a raw pointer, for handing to libc.
    pub fn as_ptr(self) -> *const libc::c_void
    {
        self.0 as *const libc::c_void
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value)
    }
}

impl From<Address> for usize
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:0width$x}", self.0, width = 2 * std::mem::size_of::<usize>())
    }
}

impl Add<usize> for Address
{
    type Output = Address;

    fn add(self, rhs: usize) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<usize> for Address
{
    type Output = Address;

    fn sub(self, rhs: usize) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
