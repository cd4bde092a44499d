//! # ICC Command Queue
//!
//! Register-level access to devices behind the southbridge. Operations are
//! queued, coalesced and executed in one ICC round trip; the I2C adapter
//! wraps single transfers in the same encoding.

pub mod i2c;
pub mod queue;

pub use i2c::{I2cDirection, IccI2c, SmbusData};
pub use queue::{CommandQueue, CommandQueueError, CommandReply, IoFailure, Opcode};
