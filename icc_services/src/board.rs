//! Board bring-up commands
//!
//! None of these are fatal: the southbridge keeps working with its
//! defaults if one is refused, so failures are only reported.

use icc::{IccError, IccReply, IccTransport};

/// Reply room for the bring-up commands
pub const INIT_REPLY_CAPACITY: u16 = 0x30;
/// Reply room for the power rail commands
pub const RAIL_REPLY_CAPACITY: u16 = 20;

pub const SYSTEM_MAJOR: u8 = 0x01;
pub const FIRMWARE_MAJOR: u8 = 0x02;
pub const RAIL_MAJOR: u8 = 0x05;
pub const LED_MAJOR: u8 = 0x09;

const FIRMWARE_VERSION: u16 = 0x06;
const SERVICE_ENABLE: u16 = 0x00;
const LED_SET_CONFIG: u16 = 0x20;
const RAIL_BT_WLAN: u16 = 0x00;
const RAIL_USB: u16 = 0x10;

/// Front LED program: solid white while running, blinking blue on standby
#[rustfmt::skip]
pub const LED_CONFIG: [u8; 35] = [
    0x03, 0x01, 0x00, 0x00,
    0x10, 0x01, 0x02, 0xff, 0x02, 0x01, 0x00,
    0x11, 0x01, 0x02, 0x00, 0x02, 0x01, 0x00,
    0x02, 0x03, 0x01, 0x00, 0x04, 0x01, 0xbf,
    0x02, 0xff, 0x05, 0x01, 0xff,
    0x02, 0x00, 0x05, 0x01, 0xff,
];

/// One bring-up step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStep {
    FirmwareVersion,
    ServiceEnable,
    LedConfig,
}

/// Outcome of [`board_init`]
#[derive(Debug, Default)]
pub struct BoardReport {
    pub steps: Vec<(BoardStep, Result<IccReply, IccError>)>,
}

impl BoardReport {
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|(_, result)| result.is_ok())
    }

    pub fn firmware_version(&self) -> Option<&[u8]> {
        self.steps.iter().find_map(|(step, result)| match (step, result) {
            (BoardStep::FirmwareVersion, Ok(reply)) => Some(reply.payload.as_slice()),
            _ => None,
        })
    }
}

pub fn firmware_version<T: IccTransport + ?Sized>(transport: &T) -> Result<IccReply, IccError> {
    transport.send_request(FIRMWARE_MAJOR, FIRMWARE_VERSION, &[], INIT_REPLY_CAPACITY)
}

pub fn enable_service<T: IccTransport + ?Sized>(transport: &T) -> Result<IccReply, IccError> {
    transport.send_request(SYSTEM_MAJOR, SERVICE_ENABLE, &[0x10], INIT_REPLY_CAPACITY)
}

pub fn configure_leds<T: IccTransport + ?Sized>(transport: &T) -> Result<IccReply, IccError> {
    transport.send_request(LED_MAJOR, LED_SET_CONFIG, &LED_CONFIG, INIT_REPLY_CAPACITY)
}

/// Powers up the Bluetooth/WLAN module
pub fn bt_wlan_power_on<T: IccTransport + ?Sized>(transport: &T) -> Result<(), IccError> {
    transport
        .send_request(RAIL_MAJOR, RAIL_BT_WLAN, &[0x03], RAIL_REPLY_CAPACITY)
        .map(|_| ())
}

/// Cuts and restores USB port power; the second step is skipped if the first fails
pub fn usb_power_cycle<T: IccTransport + ?Sized>(transport: &T) -> Result<(), IccError> {
    transport.send_request(RAIL_MAJOR, RAIL_USB, &[0x00], RAIL_REPLY_CAPACITY)?;
    transport
        .send_request(RAIL_MAJOR, RAIL_USB, &[0x01], RAIL_REPLY_CAPACITY)
        .map(|_| ())
}

/// Queries the firmware version, enables services and programs the LEDs
pub fn board_init<T: IccTransport + ?Sized>(transport: &T) -> BoardReport {
    let mut report = BoardReport::default();
    for step in [
        BoardStep::FirmwareVersion,
        BoardStep::ServiceEnable,
        BoardStep::LedConfig,
    ] {
        let result = match step {
            BoardStep::FirmwareVersion => firmware_version(transport),
            BoardStep::ServiceEnable => enable_service(transport),
            BoardStep::LedConfig => configure_leds(transport),
        };
        match &result {
            Ok(reply) => log::info!("icc: {:?}: {:02x?}", step, reply.payload),
            Err(err) => log::warn!("icc: {:?} failed: {}", step, err),
        }
        report.steps.push((step, result));
    }
    report
}
