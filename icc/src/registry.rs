//! Process-wide ICC device registry
//!
//! Board code that has no handle on the device (power-off hooks, the I2C
//! and bridge drivers) reaches the mailbox through here. Entries are tagged
//! with the device id so tearing down an old device cannot evict a newer
//! one.

use crate::device::IccDeviceId;
use crate::error::IccError;
use crate::mailbox::Mailbox;
use crate::transport::{IccReply, IccTransport, WaitMode};
use std::sync::{Arc, RwLock};

static CURRENT: RwLock<Option<(IccDeviceId, Arc<Mailbox>)>> = RwLock::new(None);

/// Publishes a mailbox, returning the id of the device it replaces
pub fn install(id: IccDeviceId, mailbox: Arc<Mailbox>) -> Option<IccDeviceId> {
    let mut current = CURRENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous = current.replace((id, mailbox)).map(|(old, _)| old);
    if let Some(old) = previous {
        log::warn!("icc: {} replaces {} in the registry", id, old);
    }
    previous
}

/// Withdraws the mailbox of `id`; false if another device is installed
pub fn uninstall(id: IccDeviceId) -> bool {
    let mut current = CURRENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match current.as_ref() {
        Some((installed, _)) if *installed == id => {
            *current = None;
            true
        }
        _ => false,
    }
}

/// The installed mailbox, if any
pub fn current() -> Option<Arc<Mailbox>> {
    CURRENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .as_ref()
        .map(|(_, mailbox)| mailbox.clone())
}

/// Sends a request through the installed device
pub fn send_request(
    major: u8,
    minor: u16,
    payload: &[u8],
    reply_capacity: u16,
) -> Result<IccReply, IccError> {
    GlobalTransport.send_request(major, minor, payload, reply_capacity)
}

/// Transport that resolves the installed device on every request
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalTransport;

impl IccTransport for GlobalTransport {
    fn send_request_with(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
        mode: WaitMode,
    ) -> Result<IccReply, IccError> {
        // Clone out so the registry lock is not held across the round trip
        let mailbox = current().ok_or(IccError::NotReady)?;
        mailbox.send_request_with(major, minor, payload, reply_capacity, mode)
    }
}
