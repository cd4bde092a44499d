//! Register and shared-memory layout of the ICC mailbox
//!
//! Register offsets are relative to BAR4 of the southbridge glue function.
//! Shared-memory offsets are relative to the mapped ICC window of SPM.

use hal::Mmio;
use serde::{Deserialize, Serialize};

/// Doorbell/status bit: a frame was posted
pub const ICC_SEND: u32 = 0x01;
/// Doorbell/status bit: a posted frame was consumed
pub const ICC_ACK: u32 = 0x02;

/// Size of the ICC register region reserved in BAR4
pub const ICC_REGION_SIZE: u64 = 0x1000;
/// Offset of the ICC window inside BAR5 of the memory function
pub const SPM_ICC_BASE: u64 = 0x2c000;
/// Size of the ICC window
pub const SPM_ICC_SIZE: u64 = 0x1000;

/// Request half of the window
pub const SPM_REQUEST: usize = 0x000;
/// Reply half of the window
pub const SPM_REPLY: usize = 0x800;
/// Slot flag word set while a frame is posted
pub const BUF_FULL: usize = 0x7f0;
/// Slot flag word set while the slot is free
pub const BUF_EMPTY: usize = 0x7f4;

/// MSI sub-function carrying the ICC interrupt
pub const ICC_IRQ_SUBFUNCTION: u32 = 3;

/// Southbridge generations sharing the ICC protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SouthbridgeVariant {
    #[default]
    Aeolia,
    Baikal,
}

impl SouthbridgeVariant {
    /// Offset of the ICC register region inside BAR4
    pub const fn icc_region_base(self) -> u64 {
        match self {
            SouthbridgeVariant::Aeolia => 0x18_4000,
            SouthbridgeVariant::Baikal => 0x10_8000 - 0x800,
        }
    }

    /// Register offsets for this variant
    pub const fn registers(self) -> RegisterLayout {
        let base = self.icc_region_base() as usize;
        RegisterLayout {
            doorbell: base + 0x804,
            status: base + 0x814,
            irq_mask: base + 0x824,
        }
    }
}

/// BAR4-relative offsets of the ICC registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    /// Written by the host to signal the remote side
    pub doorbell: usize,
    /// Pending bits raised by the remote side; write one to clear
    pub status: usize,
    /// Enables status bits as interrupt sources
    pub irq_mask: usize,
}

/// One half of the shared window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Request,
    Reply,
}

impl Slot {
    /// Window offset of the slot's frame
    pub const fn base(self) -> usize {
        match self {
            Slot::Request => SPM_REQUEST,
            Slot::Reply => SPM_REPLY,
        }
    }

    /// Reads the slot's flag words
    pub fn state(self, spm: &dyn Mmio) -> SlotState {
        SlotState {
            empty: spm.read32(self.base() + BUF_EMPTY),
            full: spm.read32(self.base() + BUF_FULL),
        }
    }

    /// Returns the slot to the free state
    pub fn release(self, spm: &dyn Mmio) {
        spm.write32(self.base() + BUF_FULL, 0);
        spm.write32(self.base() + BUF_EMPTY, 1);
    }
}

/// Flag words of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub empty: u32,
    pub full: u32,
}

impl SlotState {
    /// Free and ready to take a frame
    pub fn is_idle(self) -> bool {
        self.empty == 1 && self.full == 0
    }

    /// Holding a complete frame
    pub fn is_posted(self) -> bool {
        self.empty == 0 && self.full == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamMmio;

    #[test]
    fn test_aeolia_registers() {
        let regs = SouthbridgeVariant::Aeolia.registers();
        assert_eq!(regs.doorbell, 0x18_4804);
        assert_eq!(regs.status, 0x18_4814);
        assert_eq!(regs.irq_mask, 0x18_4824);
    }

    #[test]
    fn test_baikal_registers() {
        let regs = SouthbridgeVariant::Baikal.registers();
        assert_eq!(regs.doorbell, 0x10_8004);
        assert_eq!(regs.status, 0x10_8014);
    }

    #[test]
    fn test_flag_words_fit_inside_slot() {
        assert!(SPM_REPLY + BUF_EMPTY + 4 <= SPM_ICC_SIZE as usize);
        assert!(BUF_FULL >= crate::frame::MAX_FRAME_SIZE);
    }

    #[test]
    fn test_slot_release_and_state() {
        let spm = RamMmio::new(SPM_ICC_SIZE as usize);
        assert_eq!(Slot::Reply.state(&spm), SlotState { empty: 0, full: 0 });

        spm.write32(SPM_REPLY + BUF_FULL, 1);
        assert!(Slot::Reply.state(&spm).is_posted());

        Slot::Reply.release(&spm);
        assert!(Slot::Reply.state(&spm).is_idle());
        assert!(!Slot::Request.state(&spm).is_idle());
    }

    #[test]
    fn test_variant_serde_names() {
        let json = serde_json::to_string(&SouthbridgeVariant::Baikal).unwrap();
        assert_eq!(json, "\"baikal\"");
        let parsed: SouthbridgeVariant = serde_json::from_str("\"aeolia\"").unwrap();
        assert_eq!(parsed, SouthbridgeVariant::Aeolia);
    }
}
