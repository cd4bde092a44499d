//! Power-off and reboot through the southbridge

use icc::{IccError, IccTransport};

pub const POWER_MAJOR: u8 = 0x04;
pub const POWER_MINOR: u16 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Reboot,
}

impl PowerAction {
    pub const fn command(self) -> [u8; 6] {
        match self {
            PowerAction::Shutdown => [0, 0, 2, 0, 1, 0],
            PowerAction::Reboot => [0, 1, 2, 0, 1, 0],
        }
    }
}

/// Sends a power request; the southbridge cuts power shortly after replying
pub fn request<T: IccTransport + ?Sized>(transport: &T, action: PowerAction) -> Result<(), IccError> {
    log::info!("icc: requesting {:?}", action);
    transport
        .send_request(POWER_MAJOR, POWER_MINOR, &action.command(), 0)
        .map(|_| ())
}

pub fn shutdown<T: IccTransport + ?Sized>(transport: &T) -> Result<(), IccError> {
    request(transport, PowerAction::Shutdown)
}

pub fn reboot<T: IccTransport + ?Sized>(transport: &T) -> Result<(), IccError> {
    request(transport, PowerAction::Reboot)
}
