//! # Mailbox Transport
//!
//! The host and the southbridge share one request slot and one reply slot.
//! The protocol could carry several requests at once, but the firmware's
//! own OS never does, so neither do we: the request lock is held for the
//! whole round trip, which makes "one outstanding request" a hard
//! invariant.
//!
//! ## Handoff
//!
//! The interrupt reactor is the only producer of replies and may not block
//! or allocate. It copies the reply into a buffer allocated once at
//! construction, under the short `reply` lock, then wakes the waiter. The
//! waiter copies the payload out to the caller after the lock is dropped.

use crate::config::IccConfig;
use crate::error::IccError;
use crate::events::EventDispatcher;
use crate::frame::{checksum, FrameHeader, HEADER_SIZE, ICC_REPLY, MAX_PAYLOAD, MIN_PAYLOAD};
use crate::layout::{RegisterLayout, Slot, BUF_EMPTY, BUF_FULL, ICC_ACK, ICC_SEND, SPM_REQUEST};
use crate::transport::{IccReply, IccTransport, WaitMode};
use hal::Mmio;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Reply bookkeeping shared with the interrupt reactor
pub(crate) struct ReplyState {
    /// A request was posted and its reply has not been accepted yet
    pub(crate) pending: bool,
    /// Cookie of the outstanding request
    pub(crate) cookie: u16,
    /// Payload bytes the caller wants to keep
    pub(crate) capacity: usize,
    /// Header of the accepted reply
    pub(crate) header: FrameHeader,
    /// Accepted payload bytes, `copied` of them valid
    pub(crate) buffer: Box<[u8]>,
    pub(crate) copied: usize,
    /// Sum of the payload bytes past `capacity`, still part of the checksum
    pub(crate) extra_checksum: u16,
    /// Set by [`Mailbox::interrupt`] to end an interruptible wait
    pub(crate) interrupt_requested: bool,
}

impl ReplyState {
    fn new() -> Self {
        Self {
            pending: false,
            cookie: 0,
            capacity: 0,
            header: FrameHeader::default(),
            buffer: vec![0; MAX_PAYLOAD].into_boxed_slice(),
            copied: 0,
            extra_checksum: 0,
            interrupt_requested: false,
        }
    }
}

/// One physical ICC mailbox
pub struct Mailbox {
    pub(crate) spm: Arc<dyn Mmio>,
    pub(crate) bar4: Arc<dyn Mmio>,
    pub(crate) regs: RegisterLayout,
    timeout: Duration,
    /// Last request sent; holding this lock is holding the mailbox
    request: Mutex<FrameHeader>,
    pub(crate) reply: Mutex<ReplyState>,
    pub(crate) reply_ready: Condvar,
    pub(crate) events: EventDispatcher,
}

impl Mailbox {
    /// Creates a mailbox over a mapped ICC window and the BAR4 register block
    pub fn new(spm: Arc<dyn Mmio>, bar4: Arc<dyn Mmio>, config: &IccConfig) -> Self {
        Self {
            spm,
            bar4,
            regs: config.variant.registers(),
            timeout: config.timeout(),
            request: Mutex::new(FrameHeader::default()),
            reply: Mutex::new(ReplyState::new()),
            reply_ready: Condvar::new(),
            events: EventDispatcher::new(),
        }
    }

    /// Event handlers fed by the interrupt reactor
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Reply timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register offsets in use
    pub fn registers(&self) -> RegisterLayout {
        self.regs
    }

    /// Cookie of the most recent request
    pub fn last_cookie(&self) -> u16 {
        self.lock_request().cookie
    }

    /// Whether a request is waiting for its reply
    pub fn reply_pending(&self) -> bool {
        self.lock_reply().pending
    }

    /// Ends the current interruptible wait, if any
    pub fn interrupt(&self) {
        let mut state = self.lock_reply();
        if state.pending {
            state.interrupt_requested = true;
            drop(state);
            self.reply_ready.notify_all();
        }
    }

    /// Clears stale status bits
    pub(crate) fn clear_status(&self) {
        self.bar4.write32(self.regs.status, ICC_SEND | ICC_ACK);
    }

    /// Enables or masks the ICC interrupt sources
    pub(crate) fn set_irq_enabled(&self, enabled: bool) {
        let mask = if enabled { ICC_SEND | ICC_ACK } else { 0 };
        self.bar4.write32(self.regs.irq_mask, mask);
    }

    pub(crate) fn lock_reply(&self) -> MutexGuard<'_, ReplyState> {
        self.reply
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_request(&self) -> MutexGuard<'_, FrameHeader> {
        self.request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn post_request(&self, header: &FrameHeader, payload: &[u8]) -> Result<(), IccError> {
        let slot = Slot::Request.state(self.spm.as_ref());
        if !slot.is_idle() {
            log::error!(
                "icc: request buffer is busy: empty={} full={}",
                slot.empty,
                slot.full
            );
            return Err(IccError::TransportBusy {
                empty: slot.empty,
                full: slot.full,
            });
        }

        let base = Slot::Request.base();
        self.spm.write32(base + BUF_EMPTY, 0);
        self.spm.copy_to(SPM_REQUEST, &header.to_bytes());
        self.spm.copy_to(SPM_REQUEST + HEADER_SIZE, payload);
        if payload.len() < MIN_PAYLOAD {
            self.spm.fill(
                SPM_REQUEST + HEADER_SIZE + payload.len(),
                0,
                MIN_PAYLOAD - payload.len(),
            );
        }
        self.spm.write32(base + BUF_FULL, 1);
        Ok(())
    }

    fn await_reply(
        &self,
        request: &FrameHeader,
        mode: WaitMode,
    ) -> Result<(FrameHeader, Vec<u8>, u16), IccError> {
        let interruptible = mode == WaitMode::Interruptible;
        let guard = self.lock_reply();
        let (mut state, _) = self
            .reply_ready
            .wait_timeout_while(guard, self.timeout, |state| {
                state.pending && !(interruptible && state.interrupt_requested)
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if state.pending {
            let interrupted = interruptible && state.interrupt_requested;
            state.pending = false;
            state.interrupt_requested = false;
            drop(state);
            log::error!(
                "icc: {} waiting for reply to {:02x}:{:04x} #{}",
                if interrupted { "interrupted" } else { "timeout" },
                request.major,
                request.minor,
                request.cookie
            );
            return Err(if interrupted {
                IccError::Interrupted
            } else {
                IccError::Timeout(self.timeout)
            });
        }

        state.interrupt_requested = false;
        let payload = state.buffer[..state.copied].to_vec();
        Ok((state.header, payload, state.extra_checksum))
    }
}

impl IccTransport for Mailbox {
    fn send_request_with(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
        mode: WaitMode,
    ) -> Result<IccReply, IccError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(IccError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut last = self.lock_request();
        let request = FrameHeader::request(major, minor, last.cookie.wrapping_add(1), payload);
        *last = request;

        self.post_request(&request, payload)?;

        {
            let mut state = self.lock_reply();
            state.pending = true;
            state.cookie = request.cookie;
            state.capacity = usize::from(reply_capacity);
            state.copied = 0;
            state.extra_checksum = 0;
            state.interrupt_requested = false;
        }

        self.bar4.write32(self.regs.doorbell, ICC_SEND);

        let (reply, data, extra_checksum) = self.await_reply(&request, mode)?;

        let computed = reply
            .header_checksum()
            .wrapping_add(checksum(&data))
            .wrapping_add(extra_checksum);
        if computed != reply.checksum {
            log::error!(
                "icc: checksum mismatch (diff: {:x})",
                reply.checksum.wrapping_sub(computed)
            );
            return Err(IccError::ChecksumMismatch {
                expected: reply.checksum,
                computed,
            });
        }

        if reply.major != major || reply.minor != (minor | ICC_REPLY) {
            log::error!("icc: reply {} does not answer {}", reply, request);
            return Err(IccError::ReplyMismatch {
                major,
                minor,
                got_major: reply.major,
                got_minor: reply.minor,
            });
        }

        Ok(IccReply {
            length: reply.payload_len(),
            payload: data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{SouthbridgeVariant, SPM_ICC_SIZE};
    use hal::RamMmio;

    fn mailbox() -> (Arc<RamMmio>, Arc<RamMmio>, Mailbox) {
        let spm = Arc::new(RamMmio::new(SPM_ICC_SIZE as usize));
        let bar4 = Arc::new(RamMmio::new(0x20_0000));
        Slot::Request.release(spm.as_ref());
        let config = IccConfig::default().with_timeout(Duration::from_millis(20));
        let mailbox = Mailbox::new(spm.clone(), bar4.clone(), &config);
        (spm, bar4, mailbox)
    }

    #[test]
    fn test_oversized_payload_rejected_before_touching_hardware() {
        let (spm, _bar4, mailbox) = mailbox();
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let err = mailbox.send_request(1, 0, &payload, 0).unwrap_err();
        assert_eq!(
            err,
            IccError::PayloadTooLarge {
                len: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            }
        );
        assert!(Slot::Request.state(spm.as_ref()).is_idle());
        assert_eq!(mailbox.last_cookie(), 0);
    }

    #[test]
    fn test_busy_slot_fails_without_ringing() {
        let (spm, bar4, mailbox) = mailbox();
        spm.write32(BUF_FULL, 1);

        let err = mailbox.send_request(1, 0, &[], 0).unwrap_err();
        assert_eq!(err, IccError::TransportBusy { empty: 1, full: 1 });
        assert_eq!(bar4.read32(SouthbridgeVariant::Aeolia.registers().doorbell), 0);
        assert!(!mailbox.reply_pending());
    }

    #[test]
    fn test_request_frame_posted_and_padded() {
        let (spm, bar4, mailbox) = mailbox();
        spm.fill(HEADER_SIZE, 0xEE, MIN_PAYLOAD);

        let err = mailbox.send_request(0x09, 0x20, &[0xAB, 0xCD], 4).unwrap_err();
        assert!(matches!(err, IccError::Timeout(_)));

        let mut raw = [0u8; HEADER_SIZE];
        spm.copy_from(SPM_REQUEST, &mut raw);
        let header = FrameHeader::from_bytes(&raw);
        assert_eq!(header, FrameHeader::request(0x09, 0x20, 1, &[0xAB, 0xCD]));

        let payload = spm.snapshot(HEADER_SIZE, MIN_PAYLOAD);
        assert_eq!(&payload[..2], &[0xAB, 0xCD]);
        assert!(payload[2..].iter().all(|&b| b == 0));

        assert_eq!(spm.read32(BUF_EMPTY), 0);
        assert_eq!(spm.read32(BUF_FULL), 1);
        assert_eq!(bar4.read32(mailbox.registers().doorbell), ICC_SEND);
    }

    #[test]
    fn test_timeout_clears_pending() {
        let (_spm, _bar4, mailbox) = mailbox();
        let err = mailbox.send_request(2, 6, &[], 0x30).unwrap_err();
        assert_eq!(err, IccError::Timeout(Duration::from_millis(20)));
        assert!(!mailbox.reply_pending());
    }

    #[test]
    fn test_cookie_increments_per_request() {
        let (spm, _bar4, mailbox) = mailbox();
        for expected in 1..=3u16 {
            Slot::Request.release(spm.as_ref());
            let _ = mailbox.send_request(2, 6, &[], 0);
            assert_eq!(mailbox.last_cookie(), expected);
        }
    }

    #[test]
    fn test_interrupt_without_pending_is_ignored() {
        let (_spm, _bar4, mailbox) = mailbox();
        mailbox.interrupt();
        assert!(!mailbox.lock_reply().interrupt_requested);
    }
}
