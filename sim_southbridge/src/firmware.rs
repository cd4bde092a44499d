//! Southbridge firmware model
//!
//! A thread that plays the remote side of the mailbox. It takes requests
//! from the request slot when the doorbell rings, asks a [`Responder`] for
//! the answer and posts replies and events to the reply slot one at a time,
//! waiting for the host to hand the slot back between frames.

use crate::fault::{FaultInjector, FaultPlan, FirmwareFault};
use crate::registers::{SimRegisters, Wake};
use hal::{Mmio, RamMmio};
use icc::frame::{
    checksum, FrameHeader, HEADER_SIZE, ICC_EVENT, ICC_EVENT_MAGIC, ICC_MAGIC, ICC_REPLY,
    MAX_FRAME_SIZE,
};
use icc::layout::{Slot, BUF_EMPTY, BUF_FULL, ICC_ACK, ICC_SEND, SPM_REPLY, SPM_REQUEST};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A request as the firmware saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRequest {
    pub major: u8,
    pub minor: u16,
    pub cookie: u16,
    /// Payload including any zero padding up to the minimum frame size
    pub payload: Vec<u8>,
}

/// Produces reply payloads
pub trait Responder: Send + Sync {
    /// Reply payload for `request`; `None` leaves it unanswered
    fn respond(&self, request: &SimRequest) -> Option<Vec<u8>>;
}

impl<F> Responder for F
where
    F: Fn(&SimRequest) -> Option<Vec<u8>> + Send + Sync,
{
    fn respond(&self, request: &SimRequest) -> Option<Vec<u8>> {
        self(request)
    }
}

/// A frame waiting for the reply slot
struct Outgoing {
    header: FrameHeader,
    payload: Vec<u8>,
}

struct Shared {
    spm: Arc<RamMmio>,
    regs: Arc<SimRegisters>,
    responder: Arc<dyn Responder>,
    faults: Mutex<FaultInjector>,
    outbox: Mutex<VecDeque<Outgoing>>,
    requests: Mutex<Vec<SimRequest>>,
    posted: AtomicUsize,
    stop: AtomicBool,
}

/// Handle to the running firmware thread; stops it when dropped
pub struct Firmware {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Firmware {
    /// Resets both slots to idle and starts serving the mailbox
    pub fn start(
        spm: Arc<RamMmio>,
        regs: Arc<SimRegisters>,
        responder: Arc<dyn Responder>,
        plan: FaultPlan,
    ) -> Self {
        Slot::Request.release(spm.as_ref());
        Slot::Reply.release(spm.as_ref());

        let shared = Arc::new(Shared {
            spm,
            regs,
            responder,
            faults: Mutex::new(FaultInjector::new(plan)),
            outbox: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            posted: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        });

        let worker = shared.clone();
        let thread = thread::Builder::new()
            .name("sim-southbridge".into())
            .spawn(move || worker.run())
            .map_err(|err| log::error!("sim: failed to start firmware thread: {}", err))
            .ok();

        Self { shared, thread }
    }

    /// Queues faults behind the ones not yet applied
    pub fn inject_faults(&self, plan: FaultPlan) {
        lock(&self.shared.faults).extend(plan);
    }

    /// Posts an event frame; the event flag is added to `minor`
    pub fn inject_event(&self, major: u8, minor: u16, payload: &[u8]) {
        let header = FrameHeader {
            magic: ICC_EVENT_MAGIC,
            major,
            minor: minor | ICC_EVENT,
            ..FrameHeader::default()
        };
        self.inject_frame(seal(header, payload), payload);
    }

    /// Posts an arbitrary frame, sealed or not
    pub fn inject_frame(&self, header: FrameHeader, payload: &[u8]) {
        lock(&self.shared.outbox).push_back(Outgoing {
            header,
            payload: payload.to_vec(),
        });
        self.shared.regs.poke();
    }

    /// Requests taken so far, oldest first
    pub fn requests(&self) -> Vec<SimRequest> {
        lock(&self.shared.requests).clone()
    }

    /// Faults applied so far
    pub fn faults_applied(&self) -> usize {
        lock(&self.shared.faults).applied()
    }

    /// Whether queued frames are still waiting for the reply slot
    pub fn outbox_pending(&self) -> bool {
        !lock(&self.shared.outbox).is_empty()
    }

    /// Frames written to the reply slot so far
    pub fn frames_posted(&self) -> usize {
        self.shared.posted.load(Ordering::SeqCst)
    }

    /// Times the host handed the reply slot back with an ACK doorbell
    pub fn frames_acknowledged(&self) -> usize {
        self.shared.acknowledged()
    }

    /// Whether every queued frame was posted and handed back by the host
    ///
    /// The host rings the ACK doorbell only after it has finished with a
    /// frame, so once this holds no frame is still being handled.
    pub fn is_settled(&self) -> bool {
        let outbox = lock(&self.shared.outbox);
        outbox.is_empty() && self.shared.acknowledged() >= self.frames_posted()
    }
}

impl Drop for Firmware {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.regs.poke();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("sim: firmware thread panicked");
            }
        }
    }
}

impl Shared {
    fn acknowledged(&self) -> usize {
        self.regs
            .doorbell_log()
            .into_iter()
            .filter(|bits| bits & ICC_ACK != 0)
            .count()
    }

    fn run(&self) {
        log::debug!("sim: firmware running");
        while !self.stop.load(Ordering::SeqCst) {
            if let Some(Wake::Doorbell(bits)) = self.regs.wait_wake(POLL_INTERVAL) {
                if bits & ICC_SEND != 0 {
                    self.take_request();
                }
            }
            self.flush_outbox();
        }
        log::debug!("sim: firmware stopped");
    }

    fn take_request(&self) {
        let slot = Slot::Request.state(self.spm.as_ref());
        if !slot.is_posted() {
            log::warn!(
                "sim: doorbell with request slot in state ({}, {})",
                slot.empty,
                slot.full
            );
            return;
        }

        let mut raw = [0u8; HEADER_SIZE];
        self.spm.copy_from(SPM_REQUEST, &mut raw);
        let header = FrameHeader::from_bytes(&raw);
        let payload = if header.length_in_bounds() {
            self.spm.snapshot(SPM_REQUEST + HEADER_SIZE, header.payload_len())
        } else {
            Vec::new()
        };

        let fault = lock(&self.faults).next_fault();
        if fault != FirmwareFault::HoldRequestSlot {
            Slot::Request.release(self.spm.as_ref());
        }
        self.regs.raise(ICC_ACK);

        if header.magic != ICC_MAGIC || !header.length_in_bounds() {
            log::warn!("sim: dropping malformed request {}", header);
            return;
        }
        let computed = header.header_checksum().wrapping_add(checksum(&payload));
        if computed != header.checksum {
            log::warn!("sim: dropping request {} with bad checksum", header);
            return;
        }

        let request = SimRequest {
            major: header.major,
            minor: header.minor,
            cookie: header.cookie,
            payload,
        };
        log::trace!("sim: request {}", header);
        let reply = self.responder.respond(&request);
        lock(&self.requests).push(request);

        let Some(reply) = reply else {
            return;
        };
        let mut frames = Vec::new();
        let base = FrameHeader {
            magic: ICC_MAGIC,
            major: header.major,
            minor: header.minor | ICC_REPLY,
            cookie: header.cookie,
            ..FrameHeader::default()
        };

        match fault {
            FirmwareFault::None | FirmwareFault::HoldRequestSlot => {
                frames.push(seal(base, &reply));
            }
            FirmwareFault::DropReply => {
                log::debug!("sim: dropping reply to {}", header);
            }
            FirmwareFault::WrongCookieFirst => {
                let wrong = FrameHeader {
                    cookie: header.cookie.wrapping_add(1),
                    ..base
                };
                frames.push(seal(wrong, &reply));
                frames.push(seal(base, &reply));
            }
            FirmwareFault::CorruptChecksum => {
                let mut sealed = seal(base, &reply);
                sealed.checksum ^= 1;
                frames.push(sealed);
            }
            FirmwareFault::WrongMinor => {
                let wrong = FrameHeader {
                    minor: header.minor.wrapping_add(1) | ICC_REPLY,
                    ..base
                };
                frames.push(seal(wrong, &reply));
            }
            FirmwareFault::Delay { duration } => {
                thread::sleep(duration);
                frames.push(seal(base, &reply));
            }
            FirmwareFault::DuplicateReply => {
                let sealed = seal(base, &reply);
                frames.push(sealed);
                frames.push(sealed);
            }
            FirmwareFault::BadLength => {
                let mut sealed = seal(base, &reply);
                sealed.length = MAX_FRAME_SIZE as u16 + 1;
                frames.push(sealed);
            }
        }

        let mut outbox = lock(&self.outbox);
        for header in frames {
            outbox.push_back(Outgoing {
                header,
                payload: reply.clone(),
            });
        }
    }

    /// Posts queued frames while the host keeps handing the slot back
    fn flush_outbox(&self) {
        loop {
            if !Slot::Reply.state(self.spm.as_ref()).is_idle() {
                return;
            }
            let frame = {
                let mut outbox = lock(&self.outbox);
                let Some(frame) = outbox.pop_front() else {
                    return;
                };
                self.posted.fetch_add(1, Ordering::SeqCst);
                frame
            };

            self.spm.write32(SPM_REPLY + BUF_EMPTY, 0);
            self.spm.copy_to(SPM_REPLY, &frame.header.to_bytes());
            self.spm.copy_to(SPM_REPLY + HEADER_SIZE, &frame.payload);
            self.spm.write32(SPM_REPLY + BUF_FULL, 1);
            log::trace!("sim: posted {}", frame.header);

            self.regs.raise(ICC_SEND);
        }
    }
}

/// Fills in the length and checksum of `header` for `payload`
pub fn seal(mut header: FrameHeader, payload: &[u8]) -> FrameHeader {
    header.length = (HEADER_SIZE + payload.len()) as u16;
    header.checksum = 0;
    header.checksum = header.header_checksum().wrapping_add(checksum(payload));
    header
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
