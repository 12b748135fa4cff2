//! Fiber and OS thread identifier types.

use std::fmt;

use super::Address;

/// Opaque handle identifying a fiber inside the target
///
/// A fiber handle is the address of the fiber object in the target's address
/// space. It is stable for the fiber's lifetime and unique among live fibers
/// at any instant, but the inspector does not own it: it is a weak reference
/// into target memory that goes stale when the fiber exits.
///
/// ## Why wrap it in a struct?
///
/// Using a newtype pattern instead of a raw `Address` provides:
/// - **Type safety**: A fiber handle is not interchangeable with an arbitrary address
/// - **Self-documenting code**: Makes it clear what the value represents
/// - **Map keys**: `Hash + Eq` for the active map and grouping tables
///
/// ## Example
///
/// ```rust
/// use fiberscope_core::types::{Address, FiberHandle};
///
/// let handle = FiberHandle::from(Address::from(0x7f00_dead_0000));
/// assert_eq!(handle.address().value(), 0x7f00_dead_0000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberHandle(Address);

impl FiberHandle
{
    /// The null handle, used by targets to mean "no fiber".
    pub const NULL: Self = FiberHandle(Address::ZERO);

    /// Address of the fiber object in the target.
    pub const fn address(self) -> Address
    {
        self.0
    }

    /// Returns `true` for the null handle.
    pub const fn is_null(self) -> bool
    {
        self.0.is_null()
    }
}

impl From<Address> for FiberHandle
{
    fn from(address: Address) -> Self
    {
        FiberHandle(address)
    }
}

impl From<u64> for FiberHandle
{
    fn from(value: u64) -> Self
    {
        FiberHandle(Address::from(value))
    }
}

impl fmt::Display for FiberHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// OS thread identifier
///
/// Uniquely identifies one operating-system thread of the stopped target.
/// The exact representation is owned by the host debugger (a gdb thread
/// number, a Mach thread port, a TID); we store it as a `u64` to stay
/// host-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsThreadId(pub u64);

impl OsThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for OsThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for OsThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "thread {}", self.0)
    }
}
