//! Userspace control surface
//!
//! Raw ICC commands from a privileged tool, passed through one operation
//! code. Commands are staged in a fixed 64 KiB scratch buffer; lengths are
//! checked against it before anything is copied. Waits are interruptible
//! so a stuck firmware cannot wedge the calling tool.

use crate::error::IccError;
use crate::transport::{IccTransport, WaitMode};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

/// The one supported operation code
pub const ICC_IOCTL_CMD: u32 = 0xC028_4901;

/// Size of the staging buffer
pub const SCRATCH_SIZE: usize = 1 << 16;

/// A raw command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IccCommand {
    pub major: u8,
    pub minor: u16,
    #[serde(default)]
    pub data: Vec<u8>,
    /// Reply bytes the caller wants back
    #[serde(default)]
    pub reply_length: u16,
}

/// Outcome of a raw command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IccCommandResult {
    /// Payload length the remote side claimed
    pub status: i32,
    /// `reply_length` bytes, zero past what the remote side sent
    pub reply: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("unknown control operation {0:#x}")]
    UnknownOperation(u32),

    #[error("length {len} exceeds the {max} byte scratch buffer")]
    InvalidLength { len: usize, max: usize },

    #[error(transparent)]
    Icc(#[from] IccError),
}

/// Control surface over a transport
pub struct IccControl<T: IccTransport> {
    transport: T,
    scratch: Mutex<Box<[u8]>>,
}

impl<T: IccTransport> IccControl<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            scratch: Mutex::new(vec![0; SCRATCH_SIZE].into_boxed_slice()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Dispatches one control operation
    pub fn ioctl(&self, code: u32, cmd: &IccCommand) -> Result<IccCommandResult, ControlError> {
        match code {
            ICC_IOCTL_CMD => self.command(cmd),
            _ => Err(ControlError::UnknownOperation(code)),
        }
    }

    fn command(&self, cmd: &IccCommand) -> Result<IccCommandResult, ControlError> {
        let reply_length = usize::from(cmd.reply_length);
        for len in [cmd.data.len(), reply_length] {
            if len > SCRATCH_SIZE {
                return Err(ControlError::InvalidLength {
                    len,
                    max: SCRATCH_SIZE,
                });
            }
        }

        let mut scratch = self
            .scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        scratch[..cmd.data.len()].copy_from_slice(&cmd.data);

        let reply = self.transport.send_request_with(
            cmd.major,
            cmd.minor,
            &scratch[..cmd.data.len()],
            cmd.reply_length,
            WaitMode::Interruptible,
        )?;

        let copied = reply.payload.len().min(reply_length);
        scratch[..copied].copy_from_slice(&reply.payload[..copied]);
        scratch[copied..reply_length].fill(0);

        Ok(IccCommandResult {
            status: i32::try_from(reply.length).unwrap_or(i32::MAX),
            reply: scratch[..reply_length].to_vec(),
        })
    }
}
