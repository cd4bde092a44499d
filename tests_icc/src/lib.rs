//! ICC Integration Test Utilities
//!
//! Brings the ICC stack up against the simulated southbridge.
//!
//! ## Test Philosophy
//!
//! - **Whole stack**: requests travel through the shared window, the
//!   doorbell and the interrupt path, not through a fake transport
//! - **Deterministic faults**: firmware misbehaviour comes from a FaultPlan
//! - **Balanced resources**: every test that brings a device up checks that
//!   teardown hands everything back

use icc::layout::SouthbridgeVariant;
use icc::{IccConfig, IccDevice, InitError, Mailbox};
use sim_southbridge::{FaultPlan, Southbridge};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Reply timeout for tests that expect replies
pub const TIMEOUT: Duration = Duration::from_secs(2);
/// Reply timeout for tests that expect a timeout
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(150);

static DEVICE_SLOT: Mutex<()> = Mutex::new(());

/// Serializes tests that install a device in the process-wide registry
pub fn serial() -> MutexGuard<'static, ()> {
    DEVICE_SLOT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Polls `done` until it holds or two seconds pass
pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// A device brought up on a simulated southbridge; removed on drop
pub struct Rig {
    device: Option<IccDevice>,
    pub sb: Southbridge,
    _serial: MutexGuard<'static, ()>,
}

impl Rig {
    /// An Aeolia with the default board model
    pub fn new() -> Self {
        Self::with(SouthbridgeVariant::Aeolia, FaultPlan::new(), TIMEOUT)
    }

    pub fn with_plan(plan: FaultPlan, timeout: Duration) -> Self {
        Self::with(SouthbridgeVariant::Aeolia, plan, timeout)
    }

    pub fn with(variant: SouthbridgeVariant, plan: FaultPlan, timeout: Duration) -> Self {
        Self::on(Southbridge::with_plan(variant, plan), timeout)
    }

    /// Brings a device up on `sb`
    ///
    /// # Panics
    ///
    /// Panics if bring-up fails.
    pub fn on(mut sb: Southbridge, timeout: Duration) -> Self {
        let serial = serial();
        let device = match probe(&mut sb, timeout) {
            Ok(device) => device,
            Err(err) => panic!("bring-up failed: {}", err),
        };
        Self {
            device: Some(device),
            sb,
            _serial: serial,
        }
    }

    pub fn device(&self) -> &IccDevice {
        match &self.device {
            Some(device) => device,
            None => panic!("device already removed"),
        }
    }

    pub fn mailbox(&self) -> Arc<Mailbox> {
        self.device().mailbox().clone()
    }

    /// Waits until the host has handed back every frame the firmware posted
    pub fn settle(&self) -> bool {
        wait_until(|| self.sb.firmware().is_settled())
    }

    /// Tears the device down ahead of drop
    pub fn remove(&mut self) {
        if let Some(device) = self.device.take() {
            device.remove(self.sb.platform_mut());
        }
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Probes `sb` with the given timeout and its own variant
pub fn probe(sb: &mut Southbridge, timeout: Duration) -> Result<IccDevice, InitError> {
    let config = IccConfig::default()
        .with_variant(sb.variant())
        .with_timeout(timeout);
    let resources = sb.resources();
    IccDevice::probe(sb.platform_mut(), &resources, &config)
}
