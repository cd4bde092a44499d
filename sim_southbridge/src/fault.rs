//! Deterministic firmware misbehaviour
//!
//! Faults are consumed in order, one per request the firmware services.
//!
//! ```
//! use sim_southbridge::fault::{FaultPlan, FirmwareFault};
//! use std::time::Duration;
//!
//! let plan = FaultPlan::new()
//!     .with_fault(FirmwareFault::DropReply)
//!     .with_fault(FirmwareFault::Delay { duration: Duration::from_millis(5) });
//! assert_eq!(plan.faults().len(), 2);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

/// A fault applied to the reply of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareFault {
    /// Answer normally
    None,
    /// Take the request but never answer it
    DropReply,
    /// Answer with the wrong cookie first, then with the right one
    WrongCookieFirst,
    /// Flip a bit of the reply checksum
    CorruptChecksum,
    /// Answer with a different command id
    WrongMinor,
    /// Answer after a pause
    Delay { duration: Duration },
    /// Leave the request slot full after taking the request
    HoldRequestSlot,
    /// Answer twice; the second copy arrives with nothing pending
    DuplicateReply,
    /// Answer with a frame whose length field is out of bounds
    BadLength,
}

/// Faults to apply, in request order
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<FirmwareFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, fault: FirmwareFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Lets `count` requests through untouched before the next fault
    pub fn pass(mut self, count: usize) -> Self {
        self.faults
            .extend(std::iter::repeat(FirmwareFault::None).take(count));
        self
    }

    pub fn faults(&self) -> &[FirmwareFault] {
        &self.faults
    }
}

/// Hands out the faults of a plan, one per request
#[derive(Debug, Default)]
pub struct FaultInjector {
    pending: VecDeque<FirmwareFault>,
    applied: usize,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            pending: plan.faults.into(),
            applied: 0,
        }
    }

    /// Appends faults behind the ones still pending
    pub fn extend(&mut self, plan: FaultPlan) {
        self.pending.extend(plan.faults);
    }

    /// Fault for the next request
    pub fn next_fault(&mut self) -> FirmwareFault {
        match self.pending.pop_front() {
            Some(FirmwareFault::None) | None => FirmwareFault::None,
            Some(fault) => {
                self.applied += 1;
                fault
            }
        }
    }

    /// Faults actually applied so far
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}
