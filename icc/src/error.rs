//! ICC error types

use hal::PlatformError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of the mailbox transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IccError {
    /// Request payload does not fit in one frame
    #[error("payload of {len} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge { len: usize, max: usize },

    /// The remote side never drained the previous request
    #[error("request slot busy (empty={empty}, full={full})")]
    TransportBusy { empty: u32, full: u32 },

    /// No matching reply arrived in time
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The wait for a reply was interrupted
    #[error("wait for reply was interrupted")]
    Interrupted,

    /// Reply bytes do not add up to the claimed checksum
    #[error("reply checksum mismatch: frame claims {expected:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    /// Reply does not answer the request that was sent
    #[error("reply {got_major:#04x}:{got_minor:#06x} does not answer request {major:#04x}:{minor:#06x}")]
    ReplyMismatch {
        major: u8,
        minor: u16,
        got_major: u8,
        got_minor: u16,
    },

    /// No ICC device has been brought up
    #[error("ICC device not ready")]
    NotReady,
}

/// Errors raised while bringing up the ICC device
///
/// Every variant is returned only after the resources acquired before the
/// failing step have been released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("failed to reserve {name} region: {source}")]
    Reserve {
        name: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error("failed to map ICC shared memory: {0}")]
    Map(#[source] PlatformError),

    #[error("failed to register ICC interrupt: {0}")]
    Irq(#[source] PlatformError),

    #[error("request slot busy at bring-up (empty={empty}, full={full})")]
    SlotBusy { empty: u32, full: u32 },
}
