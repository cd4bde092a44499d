//! Request/Reply Round Trips
//!
//! Requests travel through the simulated shared window and come back
//! through the interrupt path.

use icc::layout::{SouthbridgeVariant, ICC_SEND};
use icc::{GlobalTransport, IccError, IccTransport};
use sim_southbridge::board::DEFAULT_FIRMWARE_VERSION;
use sim_southbridge::FaultPlan;
use std::sync::Arc;
use std::thread;
use tests_icc::{Rig, TIMEOUT};

#[test]
fn test_firmware_version_round_trip() {
    let rig = Rig::new();
    let reply = rig.mailbox().send_request(0x02, 0x06, &[], 0x30).unwrap();

    assert_eq!(reply.payload, DEFAULT_FIRMWARE_VERSION.to_vec());
    assert_eq!(reply.length, DEFAULT_FIRMWARE_VERSION.len());
    assert!(!reply.is_truncated());

    let requests = rig.sb.firmware().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!((requests[0].major, requests[0].minor), (0x02, 0x06));
    assert_eq!(requests[0].cookie, 1);
}

#[test]
fn test_reply_truncated_to_capacity() {
    let rig = Rig::new();
    let reply = rig.mailbox().send_request(0x02, 0x06, &[], 3).unwrap();

    assert_eq!(reply.payload, DEFAULT_FIRMWARE_VERSION[..3].to_vec());
    assert_eq!(reply.length, DEFAULT_FIRMWARE_VERSION.len());
    assert!(reply.is_truncated());
}

#[test]
fn test_zero_capacity_keeps_nothing() {
    let rig = Rig::new();
    let reply = rig.mailbox().send_request(0x04, 0x01, &[0, 0, 2, 0, 1, 0], 0).unwrap();
    assert!(reply.payload.is_empty());
    assert_eq!(reply.length, 1);
}

#[test]
fn test_cookies_advance_per_request() {
    let rig = Rig::new();
    let mailbox = rig.mailbox();
    for _ in 0..3 {
        mailbox.send_request(0x01, 0x00, &[0x10], 0x30).unwrap();
    }
    let cookies: Vec<u16> = rig.sb.firmware().requests().iter().map(|r| r.cookie).collect();
    assert_eq!(cookies, vec![1, 2, 3]);
    assert_eq!(mailbox.last_cookie(), 3);
}

#[test]
fn test_concurrent_callers_are_serialized() {
    let rig = Rig::new();
    let mailbox = rig.mailbox();

    let workers: Vec<_> = (0..4u8)
        .map(|worker| {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                for _ in 0..10 {
                    mailbox.send_request(0x09, 0x20, &[worker], 0x30).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let cookies: Vec<u16> = rig.sb.firmware().requests().iter().map(|r| r.cookie).collect();
    assert_eq!(cookies, (1..=40).collect::<Vec<u16>>());

    let sends = rig
        .sb
        .registers()
        .doorbell_log()
        .into_iter()
        .filter(|bits| *bits == ICC_SEND)
        .count();
    assert_eq!(sends, 40);
}

#[test]
fn test_baikal_round_trip() {
    let rig = Rig::with(SouthbridgeVariant::Baikal, FaultPlan::new(), TIMEOUT);
    let reply = rig.mailbox().send_request(0x02, 0x06, &[], 0x30).unwrap();
    assert_eq!(reply.payload, DEFAULT_FIRMWARE_VERSION.to_vec());
    assert_eq!(rig.sb.registers().layout().doorbell, 0x10_8004);
}

#[test]
fn test_global_transport_follows_device() {
    let mut rig = Rig::new();
    let reply = GlobalTransport.send_request(0x02, 0x06, &[], 0x30).unwrap();
    assert_eq!(reply.payload, DEFAULT_FIRMWARE_VERSION.to_vec());

    rig.remove();
    assert_eq!(
        GlobalTransport.send_request(0x02, 0x06, &[], 0x30),
        Err(IccError::NotReady)
    );
    assert!(rig.sb.platform().is_clean());
}

#[test]
fn test_oversized_payload_never_reaches_firmware() {
    let rig = Rig::new();
    let payload = vec![0u8; icc::frame::MAX_PAYLOAD + 1];
    assert!(matches!(
        rig.mailbox().send_request(0x01, 0x00, &payload, 0),
        Err(IccError::PayloadTooLarge { .. })
    ));
    assert!(rig.sb.firmware().requests().is_empty());
}
