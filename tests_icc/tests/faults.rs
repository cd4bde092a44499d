//! Firmware Fault Tests
//!
//! Each test injects one kind of firmware misbehaviour and checks both the
//! failing call and that the mailbox recovers for the next one.

use icc::{IccError, IccTransport};
use sim_southbridge::board::DEFAULT_FIRMWARE_VERSION;
use sim_southbridge::{FaultPlan, FirmwareFault};
use std::time::Duration;
use tests_icc::{Rig, SHORT_TIMEOUT, TIMEOUT};

fn version(rig: &Rig) -> Result<Vec<u8>, IccError> {
    rig.mailbox()
        .send_request(0x02, 0x06, &[], 0x30)
        .map(|reply| reply.payload)
}

#[test]
fn test_timeout_then_success() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::DropReply),
        SHORT_TIMEOUT,
    );

    assert_eq!(version(&rig), Err(IccError::Timeout(SHORT_TIMEOUT)));
    assert!(!rig.mailbox().reply_pending());
    assert_eq!(version(&rig), Ok(DEFAULT_FIRMWARE_VERSION.to_vec()));
    assert_eq!(rig.sb.firmware().faults_applied(), 1);
}

#[test]
fn test_bad_cookie_then_good_reply() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::WrongCookieFirst),
        TIMEOUT,
    );

    assert_eq!(version(&rig), Ok(DEFAULT_FIRMWARE_VERSION.to_vec()));
    assert!(rig.settle());
}

#[test]
fn test_checksum_mismatch() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::CorruptChecksum),
        TIMEOUT,
    );

    match version(&rig) {
        Err(IccError::ChecksumMismatch { expected, computed }) => {
            assert_eq!(expected ^ 1, computed);
        }
        other => panic!("expected checksum mismatch, got {:?}", other),
    }
    assert_eq!(version(&rig), Ok(DEFAULT_FIRMWARE_VERSION.to_vec()));
}

#[test]
fn test_checksum_covers_truncated_bytes() {
    let rig = Rig::new();
    let reply = rig.mailbox().send_request(0x02, 0x06, &[], 1).unwrap();
    assert_eq!(reply.payload, vec![DEFAULT_FIRMWARE_VERSION[0]]);
}

#[test]
fn test_reply_for_other_command() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::WrongMinor),
        TIMEOUT,
    );

    assert_eq!(
        version(&rig),
        Err(IccError::ReplyMismatch {
            major: 0x02,
            minor: 0x06,
            got_major: 0x02,
            got_minor: 0x4007,
        })
    );
    assert!(version(&rig).is_ok());
}

#[test]
fn test_stale_duplicate_is_dropped() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::DuplicateReply),
        TIMEOUT,
    );

    assert!(version(&rig).is_ok());
    assert!(rig.settle());
    assert!(!rig.mailbox().reply_pending());
    assert_eq!(version(&rig), Ok(DEFAULT_FIRMWARE_VERSION.to_vec()));
}

#[test]
fn test_out_of_bounds_length_times_out() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::BadLength),
        SHORT_TIMEOUT,
    );

    assert_eq!(version(&rig), Err(IccError::Timeout(SHORT_TIMEOUT)));
    assert!(version(&rig).is_ok());
}

#[test]
fn test_slow_reply_within_timeout() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::Delay {
            duration: Duration::from_millis(50),
        }),
        TIMEOUT,
    );
    assert!(version(&rig).is_ok());
}

#[test]
fn test_request_slot_left_full() {
    let rig = Rig::with_plan(
        FaultPlan::new().with_fault(FirmwareFault::HoldRequestSlot),
        TIMEOUT,
    );

    assert!(version(&rig).is_ok());
    assert_eq!(
        version(&rig),
        Err(IccError::TransportBusy { empty: 0, full: 1 })
    );
    assert_eq!(rig.sb.firmware().requests().len(), 1);
}
