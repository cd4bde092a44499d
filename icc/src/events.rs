//! Event dispatch
//!
//! The remote side raises unsolicited events (power button edges and the
//! like) through the same reply slot used for replies. The reactor hands
//! every event frame here; handlers are looked up by `(major << 16) | minor`
//! where `minor` still carries the event flag.

use crate::frame::FrameHeader;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Event notification callback
///
/// Called from interrupt context: must not block.
pub trait IccEventHandler: Send + Sync {
    fn on_event(&self, major: u8, minor: u16);
}

/// Dispatch key of an event
pub const fn event_key(major: u8, minor: u16) -> u32 {
    ((major as u32) << 16) | minor as u32
}

/// Registry of event handlers
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<u32, Arc<dyn IccEventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for one event, returning the handler it replaces
    pub fn register(
        &self,
        major: u8,
        minor: u16,
        handler: Arc<dyn IccEventHandler>,
    ) -> Option<Arc<dyn IccEventHandler>> {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.insert(event_key(major, minor), handler)
    }

    /// Removes the handler for one event
    pub fn unregister(&self, major: u8, minor: u16) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.remove(&event_key(major, minor)).is_some()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the handler for `header`, returning false if none is registered
    pub fn dispatch(&self, header: &FrameHeader) -> bool {
        let handler = {
            let handlers = self
                .handlers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            handlers.get(&event_key(header.major, header.minor)).cloned()
        };
        match handler {
            Some(handler) => {
                handler.on_event(header.major, header.minor);
                true
            }
            None => false,
        }
    }
}
