//! # ICC Services
//!
//! Southbridge services that sit directly on the ICC transport: the power
//! button, power-off and reboot, and the board bring-up commands.

pub mod board;
pub mod power;
pub mod pwrbutton;

pub use board::{board_init, bt_wlan_power_on, usb_power_cycle, BoardReport, BoardStep};
pub use power::{reboot, shutdown, PowerAction};
pub use pwrbutton::{enable_notifications, PowerButton, PowerKeySink};

use icc::{EventDispatcher, IccTransport};
use std::sync::Arc;

/// Services running after [`start`]
pub struct Services {
    pub button: Option<Arc<PowerButton>>,
    pub board: BoardReport,
}

/// Brings the board services up in their usual order
///
/// The Bluetooth/WLAN rail comes first, then the power button (when a sink
/// is given) and finally the bring-up commands. Nothing here is fatal.
pub fn start<T: IccTransport + ?Sized>(
    transport: &T,
    events: &EventDispatcher,
    sink: Option<Arc<dyn PowerKeySink>>,
) -> Services {
    if let Err(err) = bt_wlan_power_on(transport) {
        log::warn!("icc: failed to power up BT/WLAN: {}", err);
    }

    let button = sink.map(|sink| {
        let button = PowerButton::register(events, sink);
        enable_notifications(transport);
        button
    });

    let board = board_init(transport);
    Services { button, board }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icc::{IccError, IccReply, WaitMode};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        sent: Mutex<Vec<(u8, u16)>>,
    }

    impl IccTransport for Log {
        fn send_request_with(
            &self,
            major: u8,
            minor: u16,
            _payload: &[u8],
            _reply_capacity: u16,
            _mode: WaitMode,
        ) -> Result<IccReply, IccError> {
            self.sent.lock().unwrap().push((major, minor));
            Ok(IccReply {
                length: 0,
                payload: Vec::new(),
            })
        }
    }

    struct Ignore;

    impl PowerKeySink for Ignore {
        fn report_power_key(&self, _pressed: bool) {}
    }

    #[test]
    fn test_start_order() {
        let transport = Log::default();
        let events = EventDispatcher::new();
        let services = start(&transport, &events, Some(Arc::new(Ignore)));

        assert!(services.button.is_some());
        assert!(services.board.all_ok());
        assert_eq!(events.len(), 2);
        assert_eq!(
            *transport.sent.lock().unwrap(),
            vec![(5, 0), (8, 1), (8, 1), (2, 6), (1, 0), (9, 0x20)]
        );
    }

    #[test]
    fn test_start_without_button() {
        let transport = Log::default();
        let events = EventDispatcher::new();
        let services = start(&transport, &events, None);

        assert!(services.button.is_none());
        assert!(events.is_empty());
        assert_eq!(transport.sent.lock().unwrap().len(), 4);
    }
}
