//! Machine register context.

use std::fmt;

use super::Address;

/// The three machine words that position an execution context
///
/// A `RegisterContext` is either the live CPU state of an OS thread (read
/// from the host debugger while the target is stopped) or a state
/// reconstructed from the saved-register area on a parked fiber's stack.
/// Both look identical to the stack walker, which is the whole point:
/// once a context is installed on the inspection thread, a backtrace works
/// the same way regardless of where the registers came from.
///
/// ## Example
///
/// ```rust
/// use fiberscope_core::types::{Address, RegisterContext};
///
/// let ctx = RegisterContext::new(
///     Address::from(0x7fff_0000_1000), // stack pointer
///     Address::from(0x7fff_0000_1040), // frame pointer
///     Address::from(0x0000_5555_8000), // instruction pointer
/// );
/// assert_eq!(ctx.ip.value(), 0x0000_5555_8000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterContext
{
    /// Stack pointer (RSP on x86-64).
    pub sp: Address,
    /// Frame pointer (RBP on x86-64).
    pub fp: Address,
    /// Instruction pointer (RIP on x86-64).
    pub ip: Address,
}

impl RegisterContext
{
    /// Build a context from the three register values.
    pub const fn new(sp: Address, fp: Address, ip: Address) -> Self
    {
        Self { sp, fp, ip }
    }
}

impl fmt::Display for RegisterContext
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "sp={} fp={} ip={}", self.sp, self.fp, self.ip)
    }
}
