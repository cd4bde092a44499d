//! # Command Queue
//!
//! Batches register operations on a device behind the southbridge (the
//! HDMI bridge, I2C slaves) into one ICC request to service `0x10`.
//!
//! Consecutive operations with the same opcode share one group header and
//! only bump its count, so a long run of register writes costs four bytes
//! of framing in total.
//!
//! ## Wire format
//!
//! ```text
//! request: code u8 | length u16 le | group_count u8 | groups..
//! group:   major u8 | length u8 | minor u8 | count u8 | operands..
//! reply:   res1 u8 | res2 u8 | unk1 u8 | unk2 u8 | count u8 | data..
//! ```
//!
//! The request length covers the whole request; a group's length includes
//! its own four-byte header. Both count fields are a single byte, so a group
//! is split before either would overflow.

use icc::frame::{MAX_FRAME_SIZE, MAX_PAYLOAD};
use icc::{IccError, IccTransport};
use std::fmt;
use thiserror::Error;

/// ICC service that executes command queues
pub const CMDQUEUE_MAJOR: u8 = 0x10;
/// ICC command that executes command queues
pub const CMDQUEUE_MINOR: u16 = 0;
/// Request code used by every known caller
pub const DEFAULT_CODE: u8 = 4;

/// Request header: code, length, group count
pub const REQUEST_HEADER_SIZE: usize = 4;
/// Group header: major, length, minor, count
pub const GROUP_HEADER_SIZE: usize = 4;
/// Reply header: two status bytes, two unknown bytes, count
pub const REPLY_HEADER_SIZE: usize = 5;
/// Offset of the first read result inside the reply data
pub const READ_DATA_OFFSET: usize = 3;
/// Largest single write operation that fits one group
pub const MAX_WRITE_DATA: usize = 0xf8;

const MAX_GROUP_SIZE: usize = u8::MAX as usize;
const MAX_GROUP_COUNT: u8 = u8::MAX;

/// Command queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandQueueError {
    /// The round trip failed or the reply is too short to carry a status
    #[error("icc command queue failed: {0}")]
    IoFailure(#[source] IoFailure),

    /// The device reported a failure in the reply status bytes
    #[error("icc command queue rejected by device: {res1}, {res2}")]
    DeviceRejected { res1: u8, res2: u8 },

    /// The batch or a single operation does not fit its wire fields
    #[error("command queue request of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}

/// Cause of [`CommandQueueError::IoFailure`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoFailure {
    #[error(transparent)]
    Transport(#[from] IccError),

    #[error("reply of {0} bytes has no status block")]
    ShortReply(usize),
}

impl From<IccError> for CommandQueueError {
    fn from(err: IccError) -> Self {
        CommandQueueError::IoFailure(IoFailure::Transport(err))
    }
}

/// Operation kinds and their `(major, minor)` wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Read,
    Write,
    Mask,
    Delay,
    WaitSet,
    WaitClear,
}

impl Opcode {
    pub const fn major(self) -> u8 {
        match self {
            Opcode::Read => 1,
            Opcode::Write | Opcode::Mask => 2,
            Opcode::Delay | Opcode::WaitSet | Opcode::WaitClear => 3,
        }
    }

    pub const fn minor(self) -> u8 {
        match self {
            Opcode::Read => 1,
            Opcode::Write => 2,
            Opcode::Mask => 3,
            Opcode::Delay => 1,
            Opcode::WaitSet => 2,
            Opcode::WaitClear => 3,
        }
    }

    /// Decodes a group's `(major, minor)` pair
    pub const fn from_wire(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (1, 1) => Some(Opcode::Read),
            (2, 2) => Some(Opcode::Write),
            (2, 3) => Some(Opcode::Mask),
            (3, 1) => Some(Opcode::Delay),
            (3, 2) => Some(Opcode::WaitSet),
            (3, 3) => Some(Opcode::WaitClear),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Read => "read",
            Opcode::Write => "write",
            Opcode::Mask => "mask",
            Opcode::Delay => "delay",
            Opcode::WaitSet => "wait-set",
            Opcode::WaitClear => "wait-clear",
        };
        write!(f, "{} ({},{})", name, self.major(), self.minor())
    }
}

/// A run of same-opcode operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    pub opcode: Opcode,
    pub count: u8,
    pub operands: Vec<u8>,
}

impl CommandGroup {
    /// Encoded size including the group header
    pub fn wire_len(&self) -> usize {
        GROUP_HEADER_SIZE + self.operands.len()
    }

    fn accepts(&self, opcode: Opcode, operands: usize) -> bool {
        self.opcode == opcode
            && self.count < MAX_GROUP_COUNT
            && self.wire_len() + operands <= MAX_GROUP_SIZE
    }
}

/// Parsed command queue reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    /// Reply payload length claimed by the remote side
    pub length: usize,
    pub res1: u8,
    pub res2: u8,
    pub unknown: [u8; 2],
    /// Number of results in `data`
    pub count: u8,
    pub data: Vec<u8>,
}

impl CommandReply {
    fn parse(length: usize, payload: &[u8]) -> Result<Self, CommandQueueError> {
        if length < REPLY_HEADER_SIZE || payload.len() < REPLY_HEADER_SIZE {
            log::error!("icc: command queue reply too short: {}", length);
            return Err(CommandQueueError::IoFailure(IoFailure::ShortReply(length)));
        }
        Ok(Self {
            length,
            res1: payload[0],
            res2: payload[1],
            unknown: [payload[2], payload[3]],
            count: payload[4],
            data: payload[REPLY_HEADER_SIZE..].to_vec(),
        })
    }

    /// The first `n` bytes of the first read result
    pub fn read_bytes(&self, n: usize) -> Option<&[u8]> {
        self.data.get(READ_DATA_OFFSET..READ_DATA_OFFSET + n)
    }
}

/// A batch of register operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandQueue {
    code: u8,
    groups: Vec<CommandGroup>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CODE)
    }
}

impl CommandQueue {
    /// Starts an empty batch with the given request code
    pub fn new(code: u8) -> Self {
        Self {
            code,
            groups: Vec::new(),
        }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn groups(&self) -> &[CommandGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drops every queued operation, keeping the request code
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Reads `count` consecutive registers starting at `addr`
    pub fn read(&mut self, addr: u16, count: u8) -> &mut Self {
        let [hi, lo] = addr.to_be_bytes();
        self.push(Opcode::Read, &[count, hi, lo, 0])
    }

    /// Writes one register
    pub fn write_reg(&mut self, addr: u16, value: u8) -> &mut Self {
        let [hi, lo] = addr.to_be_bytes();
        self.push(Opcode::Write, &[1, hi, lo, value])
    }

    /// Writes `data` to consecutive registers starting at `addr`
    pub fn write(&mut self, addr: u16, data: &[u8]) -> Result<&mut Self, CommandQueueError> {
        if data.len() > MAX_WRITE_DATA {
            log::error!("icc: command queue write too large: {}", data.len());
            return Err(CommandQueueError::TooLarge {
                len: data.len(),
                max: MAX_WRITE_DATA,
            });
        }
        let [hi, lo] = addr.to_be_bytes();
        let mut operands = Vec::with_capacity(3 + data.len());
        operands.extend_from_slice(&[data.len() as u8, hi, lo]);
        operands.extend_from_slice(data);
        Ok(self.push(Opcode::Write, &operands))
    }

    /// Read-modify-write of the bits in `mask`
    pub fn mask(&mut self, addr: u16, value: u8, mask: u8) -> &mut Self {
        let [hi, lo] = addr.to_be_bytes();
        self.push(Opcode::Mask, &[1, hi, lo, value, mask])
    }

    /// Pauses the device-side sequencer; units are device ticks
    pub fn delay(&mut self, ticks: u16) -> &mut Self {
        let [lo, hi] = ticks.to_le_bytes();
        self.push(Opcode::Delay, &[0, lo, hi, 0])
    }

    /// Waits until every bit in `mask` is set
    pub fn wait_set(&mut self, addr: u16, mask: u8) -> &mut Self {
        let [hi, lo] = addr.to_be_bytes();
        self.push(Opcode::WaitSet, &[0, hi, lo, mask])
    }

    /// Waits until every bit in `mask` is clear
    pub fn wait_clear(&mut self, addr: u16, mask: u8) -> &mut Self {
        let [hi, lo] = addr.to_be_bytes();
        self.push(Opcode::WaitClear, &[0, hi, lo, mask])
    }

    fn push(&mut self, opcode: Opcode, operands: &[u8]) -> &mut Self {
        match self.groups.last_mut() {
            Some(group) if group.accepts(opcode, operands.len()) => {
                group.count += 1;
                group.operands.extend_from_slice(operands);
            }
            _ => self.groups.push(CommandGroup {
                opcode,
                count: 1,
                operands: operands.to_vec(),
            }),
        }
        self
    }

    /// Encoded request length
    pub fn wire_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.groups.iter().map(CommandGroup::wire_len).sum::<usize>()
    }

    /// Serializes the batch
    pub fn to_bytes(&self) -> Result<Vec<u8>, CommandQueueError> {
        let len = self.wire_len();
        if len > MAX_PAYLOAD || self.groups.len() > usize::from(u8::MAX) {
            return Err(CommandQueueError::TooLarge {
                len,
                max: MAX_PAYLOAD,
            });
        }

        let mut bytes = Vec::with_capacity(len);
        bytes.push(self.code);
        bytes.extend_from_slice(&(len as u16).to_le_bytes());
        bytes.push(self.groups.len() as u8);
        for group in &self.groups {
            bytes.extend_from_slice(&[
                group.opcode.major(),
                group.wire_len() as u8,
                group.opcode.minor(),
                group.count,
            ]);
            bytes.extend_from_slice(&group.operands);
        }
        Ok(bytes)
    }

    /// Runs the batch in one round trip
    ///
    /// An empty batch succeeds without touching the transport.
    pub fn execute<T: IccTransport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<CommandReply, CommandQueueError> {
        if self.is_empty() {
            return Ok(CommandReply::default());
        }

        let request = self.to_bytes().map_err(|err| {
            log::error!("icc: {}", err);
            err
        })?;

        let reply = transport
            .send_request(
                CMDQUEUE_MAJOR,
                CMDQUEUE_MINOR,
                &request,
                MAX_FRAME_SIZE as u16,
            )
            .map_err(|err| {
                log::error!("icc: command queue failed: {}", err);
                CommandQueueError::from(err)
            })?;

        let reply = CommandReply::parse(reply.length, &reply.payload)?;
        if reply.res1 != 0 || reply.res2 != 0 {
            log::error!(
                "icc: command queue failed: {}, {}",
                reply.res1,
                reply.res2
            );
            return Err(CommandQueueError::DeviceRejected {
                res1: reply.res1,
                res2: reply.res2,
            });
        }
        Ok(reply)
    }
}
