//! # PS4 DisplayPort to HDMI bridge
//!
//! The GPU's DisplayPort output reaches the HDMI connector through a
//! Panasonic bridge chip sitting behind the southbridge. The bridge is only
//! reachable through ICC command queues, so every hook here is a batch of
//! register operations.
//!
//! Two chips are in the field: the MN86471A on CUH-11xx boards and the
//! MN864729 on everything after. The GPU's PCI device id tells them apart.
//!
//! The display stack calls the hooks in the usual order: `mode_set`,
//! `pre_enable`, `enable`, later `disable`, `post_disable`. All of them
//! serialize on one lock, which also guards the reused queue.

pub mod regs;
pub mod sequences;

use icc::IccTransport;
use icc_cmdqueue::{CommandQueue, CommandQueueError};
use regs::{DP_STATUS, TMONREG, TMONREG_HPD};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const PCI_VENDOR_ID_ATI: u16 = 0x1002;
pub const PCI_DEVICE_ID_CUH_11XX: u16 = 0x9920;
pub const PCI_DEVICE_ID_CUH_12XX: u16 = 0x9922;
pub const PCI_DEVICE_ID_CUH_2XXX: u16 = 0x9923;
pub const PCI_DEVICE_ID_CUH_7XXX: u16 = 0x9924;

/// Identity of the GPU driving the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuId {
    pub vendor: u16,
    pub device: u16,
}

/// Bridge chip model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipModel {
    Mn86471a,
    Mn864729 {
        /// CUH-12xx boards want a different value in register 0x10c5
        cuh12xx: bool,
    },
}

impl ChipModel {
    pub fn from_device_id(device: u16) -> Self {
        match device {
            PCI_DEVICE_ID_CUH_11XX => ChipModel::Mn86471a,
            _ => ChipModel::Mn864729 {
                cuh12xx: device == PCI_DEVICE_ID_CUH_12XX,
            },
        }
    }
}

/// Hot-plug state of the HDMI connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
}

/// Verdict on a display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    Ok,
    Bad,
}

/// A display mode the bridge advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// CEA video identification code
    pub vic: u8,
    pub width: u16,
    pub height: u16,
    pub refresh: u8,
}

/// 1920x1080@60Hz
pub const MODE_1080P: DisplayMode = DisplayMode {
    vic: 16,
    width: 1920,
    height: 1080,
    refresh: 60,
};

/// 1280x720@60Hz
pub const MODE_720P: DisplayMode = DisplayMode {
    vic: 4,
    width: 1280,
    height: 720,
    refresh: 60,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("mode not available")]
    ModeNotSet,

    #[error("invalid GPU vendor {0:#06x}")]
    InvalidVendor(u16),

    #[error("could not read DP status")]
    DpStatusUnavailable,

    #[error("bridge command queue failed: {0}")]
    Queue(#[from] CommandQueueError),
}

struct BridgeState {
    /// VIC stashed by `mode_set`; zero when none
    vic: u8,
    queue: CommandQueue,
}

/// The HDMI bridge
pub struct Ps4Bridge<T: IccTransport> {
    transport: T,
    gpu: GpuId,
    state: Mutex<BridgeState>,
}

impl<T: IccTransport> Ps4Bridge<T> {
    pub fn new(transport: T, gpu: GpuId) -> Self {
        Self {
            transport,
            gpu,
            state: Mutex::new(BridgeState {
                vic: 0,
                queue: CommandQueue::default(),
            }),
        }
    }

    pub fn chip(&self) -> ChipModel {
        ChipModel::from_device_id(self.gpu.device)
    }

    /// VIC stashed by the last `mode_set`, if it was a CEA mode
    pub fn mode(&self) -> Option<u8> {
        match self.lock().vic {
            0 => None,
            vic => Some(vic),
        }
    }

    /// Modes to advertise on the connector
    pub fn modes(&self) -> Vec<DisplayMode> {
        vec![MODE_1080P]
    }

    /// Accepts only the modes the sequences are known to work with
    pub fn mode_valid(&self, vic: u8) -> ModeStatus {
        match vic {
            4 | 16 => ModeStatus::Ok,
            _ => ModeStatus::Bad,
        }
    }

    /// Stashes the mode for `enable`; zero marks a non-CEA mode
    pub fn mode_set(&self, vic: u8) {
        log::debug!("ps4-bridge: vic mode: {}", vic);
        if vic == 0 {
            log::error!("ps4-bridge: attempted to set non-CEA mode");
        }
        self.lock().vic = vic;
    }

    pub fn pre_enable(&self) -> Result<(), BridgeError> {
        log::debug!("ps4-bridge: pre_enable");
        let mut state = self.lock();
        self.run(&mut state.queue, "pre-enable sequence", sequences::pre_enable)
    }

    /// Programs the stashed mode and turns on HDMI audio
    pub fn enable(&self) -> Result<(), BridgeError> {
        let mut state = self.lock();
        if state.vic == 0 {
            log::error!("ps4-bridge: mode not available");
            return Err(BridgeError::ModeNotSet);
        }
        if self.gpu.vendor != PCI_VENDOR_ID_ATI {
            log::error!("ps4-bridge: invalid vendor: {:04x}", self.gpu.vendor);
            return Err(BridgeError::InvalidVendor(self.gpu.vendor));
        }

        let vic = state.vic;
        let chip = self.chip();
        log::debug!("ps4-bridge: enable {:?} (mode: {})", chip, vic);

        match chip {
            ChipModel::Mn86471a => {
                let dp = self.read_dp_status(&mut state.queue)?;
                self.run(&mut state.queue, "MN86471A mode", |q| {
                    sequences::mn86471a_mode(q, dp, vic)
                })?;
                self.run(
                    &mut state.queue,
                    "MN86471A hdmi audio seq. 0",
                    sequences::mn86471a_audio_setup,
                )?;
                self.run(
                    &mut state.queue,
                    "MN86471A hdmi audio seq. 1",
                    sequences::mn86471a_audio_enable,
                )
            }
            ChipModel::Mn864729 { cuh12xx } => {
                self.run(&mut state.queue, "MN864729 mode", |q| {
                    sequences::mn864729_mode(q, vic, cuh12xx)
                })?;
                self.run(
                    &mut state.queue,
                    "MN864729 hdmi audio seq. 0",
                    sequences::mn864729_audio_setup,
                )?;
                self.run(
                    &mut state.queue,
                    "MN864729 hdmi audio seq. 1",
                    sequences::mn864729_audio_enable,
                )
            }
        }
    }

    pub fn disable(&self) -> Result<(), BridgeError> {
        log::debug!("ps4-bridge: disable");
        let mut state = self.lock();
        self.run(&mut state.queue, "disable", sequences::disable)
    }

    pub fn post_disable(&self) {
        log::debug!("ps4-bridge: post_disable");
    }

    /// Reads the hot-plug bit; any failure reads as disconnected
    pub fn detect(&self) -> ConnectorStatus {
        let mut state = self.lock();
        let queue = &mut state.queue;
        queue.clear();
        queue.read(TMONREG, 1);

        let reg = match queue.execute(&self.transport) {
            Ok(reply) => reply.read_bytes(1).map(|bytes| bytes[0]),
            Err(_) => None,
        };
        let Some(reg) = reg else {
            log::error!("ps4-bridge: could not read TMONREG");
            return ConnectorStatus::Disconnected;
        };

        log::debug!("ps4-bridge: TMONREG={:#04x}", reg);
        if reg & TMONREG_HPD != 0 {
            ConnectorStatus::Connected
        } else {
            ConnectorStatus::Disconnected
        }
    }

    fn read_dp_status(&self, queue: &mut CommandQueue) -> Result<[u8; 3], BridgeError> {
        queue.clear();
        queue.read(DP_STATUS, 3);
        let reply = queue.execute(&self.transport)?;
        match reply.read_bytes(3) {
            Some(&[a, b, c]) => Ok([a, b, c]),
            _ => {
                log::error!("ps4-bridge: could not read DP status");
                Err(BridgeError::DpStatusUnavailable)
            }
        }
    }

    fn run(
        &self,
        queue: &mut CommandQueue,
        what: &str,
        build: impl FnOnce(&mut CommandQueue),
    ) -> Result<(), BridgeError> {
        queue.clear();
        build(queue);
        queue.execute(&self.transport).map_err(|err| {
            log::error!("ps4-bridge: failed to run {}: {}", what, err);
            BridgeError::from(err)
        })?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icc::{IccError, IccReply, WaitMode};

    /// Answers every batch with a fixed command queue reply
    struct Firmware {
        batches: Mutex<Vec<Vec<u8>>>,
        reply: Vec<u8>,
    }

    impl Firmware {
        fn replying(reply: &[u8]) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                reply: reply.to_vec(),
            }
        }

        fn batches(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    impl IccTransport for Firmware {
        fn send_request_with(
            &self,
            _major: u8,
            _minor: u16,
            payload: &[u8],
            _reply_capacity: u16,
            _mode: WaitMode,
        ) -> Result<IccReply, IccError> {
            self.batches.lock().unwrap().push(payload.to_vec());
            Ok(IccReply {
                length: self.reply.len(),
                payload: self.reply.clone(),
            })
        }
    }

    fn ati(device: u16) -> GpuId {
        GpuId {
            vendor: PCI_VENDOR_ID_ATI,
            device,
        }
    }

    #[test]
    fn test_chip_selection() {
        assert_eq!(ChipModel::from_device_id(0x9920), ChipModel::Mn86471a);
        assert_eq!(
            ChipModel::from_device_id(0x9922),
            ChipModel::Mn864729 { cuh12xx: true }
        );
        assert_eq!(
            ChipModel::from_device_id(0x9924),
            ChipModel::Mn864729 { cuh12xx: false }
        );
    }

    #[test]
    fn test_mode_valid() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[0; 5]), ati(0x9923));
        assert_eq!(bridge.mode_valid(16), ModeStatus::Ok);
        assert_eq!(bridge.mode_valid(4), ModeStatus::Ok);
        assert_eq!(bridge.mode_valid(1), ModeStatus::Bad);
        assert_eq!(bridge.mode_valid(0), ModeStatus::Bad);
        assert_eq!(bridge.modes(), vec![MODE_1080P]);
    }

    #[test]
    fn test_enable_without_mode() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[0; 5]), ati(0x9923));
        bridge.mode_set(0);
        assert_eq!(bridge.enable(), Err(BridgeError::ModeNotSet));
        assert_eq!(bridge.transport.batches(), 0);
    }

    #[test]
    fn test_enable_rejects_foreign_gpu() {
        let bridge = Ps4Bridge::new(
            Firmware::replying(&[0; 5]),
            GpuId {
                vendor: 0x10de,
                device: 0x9920,
            },
        );
        bridge.mode_set(16);
        assert_eq!(bridge.enable(), Err(BridgeError::InvalidVendor(0x10de)));
    }

    #[test]
    fn test_mn864729_enable_runs_three_batches() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[0; 5]), ati(0x9922));
        bridge.mode_set(16);
        assert_eq!(bridge.mode(), Some(16));
        bridge.enable().unwrap();
        assert_eq!(bridge.transport.batches(), 3);
    }

    #[test]
    fn test_mn86471a_enable_reads_dp_status_first() {
        let bridge = Ps4Bridge::new(
            Firmware::replying(&[0, 0, 0, 0, 1, 0, 0, 0, 0x11, 0x22, 0x33]),
            ati(0x9920),
        );
        bridge.mode_set(4);
        bridge.enable().unwrap();

        let batches = bridge.transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[0], vec![4, 12, 0, 1, 1, 8, 1, 1, 3, 0x76, 0xe1, 0]);
    }

    #[test]
    fn test_mn86471a_enable_fails_on_short_dp_status() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[0; 5]), ati(0x9920));
        bridge.mode_set(16);
        assert_eq!(bridge.enable(), Err(BridgeError::DpStatusUnavailable));
        assert_eq!(bridge.transport.batches(), 1);
    }

    #[test]
    fn test_detect_reports_hpd() {
        let bridge = Ps4Bridge::new(
            Firmware::replying(&[0, 0, 0, 0, 1, 0, 0, 0, 0x08]),
            ati(0x9923),
        );
        assert_eq!(bridge.detect(), ConnectorStatus::Connected);

        let bridge = Ps4Bridge::new(
            Firmware::replying(&[0, 0, 0, 0, 1, 0, 0, 0, 0x00]),
            ati(0x9923),
        );
        assert_eq!(bridge.detect(), ConnectorStatus::Disconnected);
    }

    #[test]
    fn test_detect_failure_reads_disconnected() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[1, 0, 0, 0, 0]), ati(0x9923));
        assert_eq!(bridge.detect(), ConnectorStatus::Disconnected);
    }

    #[test]
    fn test_disable_propagates_rejection() {
        let bridge = Ps4Bridge::new(Firmware::replying(&[0, 7, 0, 0, 0]), ati(0x9923));
        assert_eq!(
            bridge.disable(),
            Err(BridgeError::Queue(CommandQueueError::DeviceRejected {
                res1: 0,
                res2: 7
            }))
        );
    }
}
