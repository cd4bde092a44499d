//! # Interrupt Reactor
//!
//! Services the ICC interrupt. The line may be shared, so an interrupt
//! with no ICC status bits set is reported as not ours.
//!
//! Every frame the remote side posts is consumed exactly once: whatever
//! happens while handling it, the reply slot is returned to idle and the
//! doorbell acknowledged afterwards. Malformed or unexpected frames are
//! logged with a dump and dropped; a waiting caller only learns about them
//! through its timeout.

use crate::frame::{FrameHeader, FrameKind, HEADER_SIZE, ICC_EVENT_MAGIC, ICC_MAGIC, MAX_PAYLOAD};
use crate::layout::{Slot, ICC_ACK, ICC_SEND, SPM_REPLY};
use crate::mailbox::Mailbox;
use hal::{IrqHandler, IrqReturn, Mmio};
use std::fmt;

impl Mailbox {
    /// Services pending ICC status bits
    pub fn handle_interrupt(&self) -> IrqReturn {
        let mut ret = IrqReturn::None;

        loop {
            let status = self.bar4.read32(self.regs.status) & (ICC_SEND | ICC_ACK);
            if status == 0 {
                break;
            }

            if status & ICC_ACK != 0 {
                self.bar4.write32(self.regs.status, ICC_ACK);
                ret = IrqReturn::Handled;
            }

            if status & ICC_SEND != 0 {
                self.bar4.write32(self.regs.status, ICC_SEND);
                self.handle_message();
                Slot::Reply.release(self.spm.as_ref());
                self.bar4.write32(self.regs.doorbell, ICC_ACK);
                ret = IrqReturn::Handled;
            }
        }

        ret
    }

    fn handle_message(&self) {
        let slot = Slot::Reply.state(self.spm.as_ref());
        if !slot.is_posted() {
            log::error!(
                "icc: reply buffer in bad state ({}, {})",
                slot.empty,
                slot.full
            );
            return;
        }

        let mut raw = [0u8; HEADER_SIZE];
        self.spm.copy_from(SPM_REPLY, &mut raw);
        let header = FrameHeader::from_bytes(&raw);

        match header.kind() {
            FrameKind::Event => {
                if header.magic != ICC_EVENT_MAGIC {
                    log::error!("icc: event has bad magic\n{}", self.dump_reply());
                    return;
                }
                if !self.events.dispatch(&header) {
                    log::error!(
                        "icc: event arrived, not yet supported\n{}",
                        self.dump_reply()
                    );
                }
            }
            FrameKind::Reply => {
                if header.magic != ICC_MAGIC {
                    log::error!("icc: reply has bad magic\n{}", self.dump_reply());
                    return;
                }
                self.accept_reply(header);
            }
            FrameKind::Unknown => {
                log::error!("icc: unknown message arrived\n{}", self.dump_reply());
            }
        }
    }

    fn accept_reply(&self, header: FrameHeader) {
        let mut state = self.lock_reply();

        if !state.pending {
            drop(state);
            log::error!("icc: unexpected reply\n{}", self.dump_reply());
            return;
        }
        // Pending stays set: a mismatched cookie means the firmware is out of
        // step, and the caller's own reply may still follow.
        if header.cookie != state.cookie {
            drop(state);
            log::error!(
                "icc: reply has bad cookie {}\n{}",
                header.cookie,
                self.dump_reply()
            );
            return;
        }
        if !header.length_in_bounds() {
            drop(state);
            log::error!(
                "icc: reply has bad length {}\n{}",
                header.length,
                self.dump_reply()
            );
            return;
        }

        let payload_len = header.payload_len();
        let copy_size = state.capacity.min(payload_len);
        let data = SPM_REPLY + HEADER_SIZE;
        self.spm.copy_from(data, &mut state.buffer[..copy_size]);

        let mut extra = 0u16;
        for offset in copy_size..payload_len {
            extra = extra.wrapping_add(u16::from(self.spm.read8(data + offset)));
        }

        state.extra_checksum = extra;
        state.copied = copy_size;
        state.header = header;
        state.pending = false;
        drop(state);

        self.reply_ready.notify_all();
    }

    fn dump_reply(&self) -> FrameDump<'_> {
        FrameDump {
            spm: self.spm.as_ref(),
            offset: SPM_REPLY,
        }
    }
}

impl IrqHandler for Mailbox {
    fn handle_irq(&self) -> IrqReturn {
        self.handle_interrupt()
    }
}

/// Lazily formatted header and payload of a frame in shared memory
struct FrameDump<'a> {
    spm: &'a dyn Mmio,
    offset: usize,
}

impl fmt::Display for FrameDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; HEADER_SIZE];
        self.spm.copy_from(self.offset, &mut raw);
        let header = FrameHeader::from_bytes(&raw);
        write!(f, "icc: hdr: {}", header)?;

        let len = header.payload_len().min(MAX_PAYLOAD);
        if len > 0 {
            write!(f, "\nicc: data:")?;
            for i in 0..len {
                write!(f, " {:02x}", self.spm.read8(self.offset + HEADER_SIZE + i))?;
            }
        }
        Ok(())
    }
}
