//! Interrupt handling abstraction

use std::fmt;

/// Result of servicing an interrupt
///
/// Interrupt lines may be shared between several devices, so a handler
/// must report whether the interrupt was actually its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Nothing for this handler; another device raised the line
    None,
    /// The handler found and serviced work
    Handled,
}

impl IrqReturn {
    /// Returns true if the interrupt was serviced
    pub fn is_handled(self) -> bool {
        self == IrqReturn::Handled
    }
}

impl fmt::Display for IrqReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqReturn::None => write!(f, "none"),
            IrqReturn::Handled => write!(f, "handled"),
        }
    }
}

/// Interrupt handler trait
///
/// Handlers run in interrupt context. They must not block or allocate and
/// should only touch device registers and short critical sections.
pub trait IrqHandler: Send + Sync {
    /// Services one interrupt
    fn handle_irq(&self) -> IrqReturn;
}
