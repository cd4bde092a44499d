//! # Simulated Southbridge
//!
//! Stands in for the Aeolia/Baikal hardware: a register block with a
//! write-one-to-clear status register, the shared memory window, a
//! firmware thread that answers requests, and a PCI platform that hands
//! these out.
//!
//! ```no_run
//! use icc::{IccConfig, IccDevice, IccTransport};
//! use sim_southbridge::Southbridge;
//!
//! let mut sb = Southbridge::new();
//! let resources = sb.resources();
//! let device = IccDevice::probe(sb.platform_mut(), &resources, &IccConfig::default()).unwrap();
//! let _version = device.mailbox().send_request(0x02, 0x06, &[], 0x30).unwrap();
//! device.remove(sb.platform_mut());
//! ```

pub mod board;
pub mod fault;
pub mod firmware;
pub mod platform;
pub mod registers;

pub use board::BoardModel;
pub use fault::{FaultPlan, FirmwareFault};
pub use firmware::{Firmware, Responder, SimRequest};
pub use platform::{FailPoint, PlatformCall, SimPlatform};
pub use registers::SimRegisters;

use hal::{MemRegion, Mmio, RamMmio};
use icc::layout::{SouthbridgeVariant, SPM_ICC_SIZE};
use icc::IccResources;
use std::sync::Arc;

/// Physical base of the simulated BAR4
pub const BAR4_BASE: u64 = 0xe000_0000;
/// Physical range of the simulated SPM BAR
pub const SPM_BAR: MemRegion = MemRegion::new(0xe100_0000, 0x4_0000);
/// Interrupt line of the simulated ICC subfunction
pub const SIM_IRQ: u32 = 48;

/// A complete simulated southbridge
pub struct Southbridge {
    variant: SouthbridgeVariant,
    spm: Arc<RamMmio>,
    regs: Arc<SimRegisters>,
    platform: SimPlatform,
    board: Arc<BoardModel>,
    firmware: Firmware,
}

impl Southbridge {
    /// An Aeolia answering with the default [`BoardModel`]
    pub fn new() -> Self {
        Self::with_plan(SouthbridgeVariant::Aeolia, FaultPlan::new())
    }

    pub fn with_plan(variant: SouthbridgeVariant, plan: FaultPlan) -> Self {
        let board = Arc::new(BoardModel::new());
        Self::build(variant, board.clone(), board, plan)
    }

    /// Answers with `responder` instead of the board model
    pub fn with_responder(
        variant: SouthbridgeVariant,
        responder: Arc<dyn Responder>,
        plan: FaultPlan,
    ) -> Self {
        Self::build(variant, Arc::new(BoardModel::new()), responder, plan)
    }

    fn build(
        variant: SouthbridgeVariant,
        board: Arc<BoardModel>,
        responder: Arc<dyn Responder>,
        plan: FaultPlan,
    ) -> Self {
        let spm = Arc::new(RamMmio::new(SPM_ICC_SIZE as usize));
        let regs = Arc::new(SimRegisters::new(variant.registers()));
        let spm_region = SPM_BAR.offset(icc::layout::SPM_ICC_BASE, SPM_ICC_SIZE);
        let platform = SimPlatform::new(spm.clone(), spm_region, regs.clone());
        let firmware = Firmware::start(spm.clone(), regs.clone(), responder, plan);
        Self {
            variant,
            spm,
            regs,
            platform,
            board,
            firmware,
        }
    }

    pub fn variant(&self) -> SouthbridgeVariant {
        self.variant
    }

    /// What the PCI layer would pass to the ICC driver
    pub fn resources(&self) -> IccResources {
        IccResources {
            bar4: self.regs.clone() as Arc<dyn Mmio>,
            bar4_region: MemRegion::new(BAR4_BASE, registers::BAR4_SIZE as u64),
            spm_bar: SPM_BAR,
            irq: SIM_IRQ,
        }
    }

    pub fn platform(&self) -> &SimPlatform {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut SimPlatform {
        &mut self.platform
    }

    pub fn firmware(&self) -> &Firmware {
        &self.firmware
    }

    /// Register model behind the command queue service
    pub fn board(&self) -> &BoardModel {
        &self.board
    }

    pub fn registers(&self) -> &Arc<SimRegisters> {
        &self.regs
    }

    /// The shared window as the firmware sees it
    pub fn spm(&self) -> &Arc<RamMmio> {
        &self.spm
    }
}

impl Default for Southbridge {
    fn default() -> Self {
        Self::new()
    }
}
