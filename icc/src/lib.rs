//! # ICC
//!
//! Inter-chip communication with the PS4 southbridge (Aeolia/Baikal).
//!
//! The host talks to the southbridge's embedded controller through a 4 KiB
//! window of shared memory split into a request slot and a reply slot, a
//! doorbell register and a status register raised by the remote side.
//!
//! ## Layers
//!
//! - [`frame`]: the 12-byte header and its checksum
//! - [`mailbox`]: one blocking request/reply round trip at a time
//! - [`reactor`]: the interrupt handler that accepts replies and events
//! - [`events`]: handlers for unsolicited events
//! - [`device`] and [`registry`]: bring-up, teardown, process-wide access
//! - [`control`]: raw commands from a privileged tool
//!
//! Everything above the mailbox is written against [`IccTransport`], so it
//! can be exercised against a fake.

pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod events;
pub mod frame;
pub mod layout;
pub mod mailbox;
pub mod reactor;
pub mod registry;
pub mod transport;

pub use config::{ConfigError, IccConfig};
pub use control::{ControlError, IccCommand, IccCommandResult, IccControl, ICC_IOCTL_CMD};
pub use device::{IccDevice, IccDeviceId, IccResources};
pub use error::{IccError, InitError};
pub use events::{EventDispatcher, IccEventHandler};
pub use frame::{FrameHeader, FrameKind};
pub use layout::SouthbridgeVariant;
pub use mailbox::Mailbox;
pub use registry::{send_request, GlobalTransport};
pub use transport::{IccReply, IccTransport, WaitMode};
