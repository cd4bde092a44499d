//! SMBus adapter tunnelled through the command queue
//!
//! Each transfer is a one-operation batch: the slave address (shifted into
//! 8-bit form) is the high register byte and the SMBus command is the low
//! one.

use crate::queue::{CommandQueue, CommandQueueError, IoFailure, DEFAULT_CODE};
use icc::IccTransport;

/// Largest block a read can return
pub const MAX_READ_DATA: usize = 0xff;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cDirection {
    Read,
    Write,
}

/// Transfer data, filled in place on reads
///
/// For a block read the vector's length is the number of bytes to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmbusData {
    Byte(u8),
    Word(u16),
    Block(Vec<u8>),
}

impl SmbusData {
    fn len(&self) -> usize {
        match self {
            SmbusData::Byte(_) => 1,
            SmbusData::Word(_) => 2,
            SmbusData::Block(block) => block.len(),
        }
    }
}

/// Transfer kinds the adapter supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Functionality {
    pub byte_data: bool,
    pub word_data: bool,
    pub i2c_block: bool,
}

/// SMBus adapter over an ICC transport
pub struct IccI2c<T: IccTransport> {
    transport: T,
}

impl<T: IccTransport> IccI2c<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn functionality(&self) -> Functionality {
        Functionality {
            byte_data: true,
            word_data: true,
            i2c_block: true,
        }
    }

    /// Performs one SMBus transfer
    pub fn smbus_xfer(
        &self,
        addr: u16,
        direction: I2cDirection,
        command: u8,
        data: &mut SmbusData,
    ) -> Result<(), CommandQueueError> {
        match direction {
            I2cDirection::Read => {
                let bytes = self.read(addr, command, data.len())?;
                match data {
                    SmbusData::Byte(byte) => *byte = bytes[0],
                    SmbusData::Word(word) => *word = u16::from_le_bytes([bytes[0], bytes[1]]),
                    SmbusData::Block(block) => block.copy_from_slice(&bytes),
                }
                Ok(())
            }
            I2cDirection::Write => match data {
                SmbusData::Byte(byte) => self.write(addr, command, &[*byte]),
                SmbusData::Word(word) => self.write(addr, command, &word.to_le_bytes()),
                SmbusData::Block(block) => self.write(addr, command, block),
            },
        }
    }

    pub fn read_byte_data(&self, addr: u16, command: u8) -> Result<u8, CommandQueueError> {
        Ok(self.read(addr, command, 1)?[0])
    }

    pub fn write_byte_data(&self, addr: u16, command: u8, value: u8) -> Result<(), CommandQueueError> {
        self.write(addr, command, &[value])
    }

    pub fn read_word_data(&self, addr: u16, command: u8) -> Result<u16, CommandQueueError> {
        let bytes = self.read(addr, command, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn write_word_data(&self, addr: u16, command: u8, value: u16) -> Result<(), CommandQueueError> {
        self.write(addr, command, &value.to_le_bytes())
    }

    /// Reads `len` bytes starting at register `command`
    pub fn read_i2c_block_data(
        &self,
        addr: u16,
        command: u8,
        len: usize,
    ) -> Result<Vec<u8>, CommandQueueError> {
        self.read(addr, command, len)
    }

    pub fn write_i2c_block_data(
        &self,
        addr: u16,
        command: u8,
        block: &[u8],
    ) -> Result<(), CommandQueueError> {
        self.write(addr, command, block)
    }

    fn read(&self, addr: u16, command: u8, len: usize) -> Result<Vec<u8>, CommandQueueError> {
        if len > MAX_READ_DATA {
            log::error!("icc-i2c: read too large: {}", len);
            return Err(CommandQueueError::TooLarge {
                len,
                max: MAX_READ_DATA,
            });
        }
        let mut queue = CommandQueue::new(DEFAULT_CODE);
        queue.read(register(addr, command), len as u8);

        let reply = queue.execute(&self.transport)?;
        reply.read_bytes(len).map(<[u8]>::to_vec).ok_or_else(|| {
            log::error!("icc-i2c: reply of {} bytes lacks read data", reply.length);
            CommandQueueError::IoFailure(IoFailure::ShortReply(reply.length))
        })
    }

    fn write(&self, addr: u16, command: u8, bytes: &[u8]) -> Result<(), CommandQueueError> {
        let mut queue = CommandQueue::new(DEFAULT_CODE);
        queue.write(register(addr, command), bytes)?;
        queue.execute(&self.transport).map(|_| ())
    }
}

/// Command queue address of an SMBus register
fn register(addr: u16, command: u8) -> u16 {
    (((addr << 1) & 0xff) << 8) | u16::from(command)
}
