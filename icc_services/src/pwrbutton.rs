//! Power button
//!
//! The southbridge reports power button edges as events once notifications
//! are switched on. They are forwarded to whatever stands in for the input
//! subsystem.

use icc::{EventDispatcher, IccEventHandler, IccTransport};
use std::sync::Arc;

/// ICC service carrying button events and notification control
pub const BUTTON_MAJOR: u8 = 0x08;
/// Command that enables one notification source
pub const ENABLE_NOTIFICATION: u16 = 0x01;
/// Power button pressed, with the event flag
pub const EVENT_PRESS: u16 = 0x8010;
/// Power button released, with the event flag
pub const EVENT_RELEASE: u16 = 0x8011;
/// Notification source of the power button
pub const NOTIFY_POWER: u16 = 0x100;
/// Notification source of the reset button
pub const NOTIFY_RESET: u16 = 0x102;

/// Receives power key transitions
pub trait PowerKeySink: Send + Sync {
    fn report_power_key(&self, pressed: bool);
}

/// Event handler forwarding button edges to a sink
pub struct PowerButton {
    sink: Arc<dyn PowerKeySink>,
}

impl PowerButton {
    /// Registers for both edges on `events`
    pub fn register(events: &EventDispatcher, sink: Arc<dyn PowerKeySink>) -> Arc<Self> {
        let button = Arc::new(Self { sink });
        events.register(BUTTON_MAJOR, EVENT_PRESS, button.clone());
        events.register(BUTTON_MAJOR, EVENT_RELEASE, button.clone());
        button
    }

    pub fn unregister(events: &EventDispatcher) {
        events.unregister(BUTTON_MAJOR, EVENT_PRESS);
        events.unregister(BUTTON_MAJOR, EVENT_RELEASE);
    }
}

impl IccEventHandler for PowerButton {
    fn on_event(&self, major: u8, minor: u16) {
        match (major, minor) {
            (BUTTON_MAJOR, EVENT_PRESS) => self.sink.report_power_key(true),
            (BUTTON_MAJOR, EVENT_RELEASE) => self.sink.report_power_key(false),
            _ => log::warn!("pwrbutton: unexpected event {:02x}:{:04x}", major, minor),
        }
    }
}

/// Asks the southbridge to report power and reset button events
///
/// Failures are logged and otherwise ignored; the button is optional.
pub fn enable_notifications<T: IccTransport + ?Sized>(transport: &T) {
    for (source, name) in [(NOTIFY_POWER, "power"), (NOTIFY_RESET, "reset")] {
        if let Err(err) = transport.send_request(
            BUTTON_MAJOR,
            ENABLE_NOTIFICATION,
            &source.to_le_bytes(),
            0,
        ) {
            log::info!("pwrbutton: failed to enable {} notifications: {}", name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icc::frame::{FrameHeader, ICC_EVENT_MAGIC};
    use icc::{IccError, IccReply, WaitMode};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Keys {
        edges: Mutex<Vec<bool>>,
    }

    impl PowerKeySink for Keys {
        fn report_power_key(&self, pressed: bool) {
            self.edges.lock().unwrap().push(pressed);
        }
    }

    fn event(minor: u16) -> FrameHeader {
        FrameHeader {
            magic: ICC_EVENT_MAGIC,
            major: BUTTON_MAJOR,
            minor,
            ..FrameHeader::default()
        }
    }

    #[test]
    fn test_edges_reach_sink() {
        let events = EventDispatcher::new();
        let keys = Arc::new(Keys::default());
        PowerButton::register(&events, keys.clone());

        assert!(events.dispatch(&event(EVENT_PRESS)));
        assert!(events.dispatch(&event(EVENT_RELEASE)));
        assert_eq!(*keys.edges.lock().unwrap(), vec![true, false]);

        PowerButton::unregister(&events);
        assert!(events.is_empty());
    }

    struct Refusing {
        sent: Mutex<Vec<(u8, u16, Vec<u8>)>>,
    }

    impl IccTransport for Refusing {
        fn send_request_with(
            &self,
            major: u8,
            minor: u16,
            payload: &[u8],
            _reply_capacity: u16,
            _mode: WaitMode,
        ) -> Result<IccReply, IccError> {
            self.sent
                .lock()
                .unwrap()
                .push((major, minor, payload.to_vec()));
            Err(IccError::NotReady)
        }
    }

    #[test]
    fn test_notifications_keep_going_after_failure() {
        let transport = Refusing {
            sent: Mutex::new(Vec::new()),
        };
        enable_notifications(&transport);
        assert_eq!(
            *transport.sent.lock().unwrap(),
            vec![(8, 1, vec![0x00, 0x01]), (8, 1, vec![0x02, 0x01])]
        );
    }
}
