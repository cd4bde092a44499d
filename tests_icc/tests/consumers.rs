//! Consumer Tests
//!
//! The command queue, I2C adapter, HDMI bridge and board services driven
//! through the real mailbox against the simulated board.

use icc::GlobalTransport;
use icc_cmdqueue::{CommandQueue, CommandQueueError, I2cDirection, IccI2c, SmbusData};
use icc_services::{PowerKeySink, Services};
use ps4_bridge::regs::{TMONREG, TMONREG_HPD, VMUTECNT};
use ps4_bridge::{
    BridgeError, ConnectorStatus, GpuId, Ps4Bridge, MODE_1080P, PCI_DEVICE_ID_CUH_11XX,
    PCI_DEVICE_ID_CUH_12XX, PCI_VENDOR_ID_ATI,
};
use std::sync::Arc;
use tests_icc::Rig;

#[test]
fn test_command_queue_write_then_read_back() {
    let rig = Rig::new();
    let mut q = CommandQueue::default();
    q.write(0x7010, &[0xaa, 0xbb]).unwrap();
    q.mask(0x7011, 0x0f, 0x0f);
    q.read(0x7010, 2);

    let reply = q.execute(&rig.mailbox()).unwrap();
    assert_eq!(reply.count, 1);
    assert_eq!(reply.read_bytes(2), Some(&[0xaa, 0xbf][..]));
    assert_eq!(rig.sb.board().register(0x7011), 0xbf);
}

#[test]
fn test_command_queue_rejection() {
    let rig = Rig::new();
    rig.sb.board().set_queue_status(3, 1);
    let mut q = CommandQueue::default();
    q.write_reg(0x7000, 1);
    assert_eq!(
        q.execute(&rig.mailbox()).unwrap_err(),
        CommandQueueError::DeviceRejected { res1: 3, res2: 1 }
    );
}

#[test]
fn test_i2c_transfers() {
    let rig = Rig::new();
    rig.sb.board().set_register(0xa010, 0x5a);
    let i2c = IccI2c::new(rig.mailbox());

    assert_eq!(i2c.read_byte_data(0x50, 0x10).unwrap(), 0x5a);

    i2c.write_word_data(0x50, 0x20, 0xbeef).unwrap();
    assert_eq!(rig.sb.board().register(0xa020), 0xef);
    assert_eq!(rig.sb.board().register(0xa021), 0xbe);

    let mut data = SmbusData::Word(0);
    i2c.smbus_xfer(0x50, I2cDirection::Read, 0x20, &mut data).unwrap();
    assert_eq!(data, SmbusData::Word(0xbeef));
}

#[test]
fn test_bridge_hot_plug_detect() {
    let rig = Rig::new();
    let gpu = GpuId {
        vendor: PCI_VENDOR_ID_ATI,
        device: PCI_DEVICE_ID_CUH_12XX,
    };
    let bridge = Ps4Bridge::new(rig.mailbox(), gpu);

    assert_eq!(bridge.detect(), ConnectorStatus::Disconnected);
    rig.sb.board().set_register(TMONREG, TMONREG_HPD);
    assert_eq!(bridge.detect(), ConnectorStatus::Connected);
}

#[test]
fn test_bridge_enable_through_global_transport() {
    let rig = Rig::new();
    let gpu = GpuId {
        vendor: PCI_VENDOR_ID_ATI,
        device: PCI_DEVICE_ID_CUH_11XX,
    };
    let bridge = Ps4Bridge::new(GlobalTransport, gpu);

    assert_eq!(bridge.enable(), Err(BridgeError::ModeNotSet));
    bridge.mode_set(MODE_1080P.vic);
    bridge.pre_enable().unwrap();
    bridge.enable().unwrap();
    assert_eq!(rig.sb.board().register(0x7062), MODE_1080P.vic | 0x80);

    bridge.disable().unwrap();
    assert_eq!(rig.sb.board().register(VMUTECNT) & 0x02, 0x02);
}

struct Ignore;

impl PowerKeySink for Ignore {
    fn report_power_key(&self, _pressed: bool) {}
}

#[test]
fn test_board_services_start() {
    let rig = Rig::new();
    let mailbox = rig.mailbox();
    let Services { button, board } =
        icc_services::start(&mailbox, mailbox.events(), Some(Arc::new(Ignore)));

    assert!(button.is_some());
    assert!(board.all_ok());
    assert_eq!(
        board.firmware_version(),
        Some(&sim_southbridge::board::DEFAULT_FIRMWARE_VERSION[..])
    );

    let calls: Vec<(u8, u16)> = rig
        .sb
        .firmware()
        .requests()
        .iter()
        .map(|r| (r.major, r.minor))
        .collect();
    assert_eq!(
        calls,
        vec![(5, 0), (8, 1), (8, 1), (2, 6), (1, 0), (9, 0x20)]
    );
}

#[test]
fn test_power_requests_reach_firmware() {
    let rig = Rig::new();
    icc_services::shutdown(&rig.mailbox()).unwrap();
    icc_services::reboot(&rig.mailbox()).unwrap();
    icc_services::usb_power_cycle(&rig.mailbox()).unwrap();

    let payloads: Vec<Vec<u8>> = rig
        .sb
        .firmware()
        .requests()
        .iter()
        .map(|r| r.payload[..6].to_vec())
        .collect();
    assert_eq!(payloads[0], vec![0, 0, 2, 0, 1, 0]);
    assert_eq!(payloads[1], vec![0, 1, 2, 0, 1, 0]);
    assert_eq!(payloads[2][0], 0);
    assert_eq!(payloads[3][0], 1);
}
