//! Request/reply interface consumed by everything built on ICC

use crate::error::IccError;
use std::sync::Arc;

/// A validated reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccReply {
    /// Payload length the remote side sent, which may exceed `payload.len()`
    pub length: usize,
    /// The first `min(reply_capacity, length)` payload bytes
    pub payload: Vec<u8>,
}

impl IccReply {
    /// True if the remote side sent more than the caller asked to keep
    pub fn is_truncated(&self) -> bool {
        self.length > self.payload.len()
    }
}

/// How a caller waits for its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Only a reply or the timeout ends the wait
    #[default]
    Uninterruptible,
    /// [`Mailbox::interrupt`](crate::Mailbox::interrupt) also ends the wait
    Interruptible,
}

/// Request/reply transport trait
///
/// One call is one complete round trip. Implementations serialize callers:
/// at most one request is outstanding at any time.
pub trait IccTransport: Send + Sync {
    /// Sends a request and blocks until its reply, a timeout, or interruption
    ///
    /// # Arguments
    ///
    /// * `major` - Service id
    /// * `minor` - Command id, without flag bits
    /// * `payload` - Request payload, at most [`MAX_PAYLOAD`](crate::frame::MAX_PAYLOAD) bytes
    /// * `reply_capacity` - How many reply payload bytes to keep
    fn send_request_with(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
        mode: WaitMode,
    ) -> Result<IccReply, IccError>;

    /// Sends a request with an uninterruptible wait
    fn send_request(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
    ) -> Result<IccReply, IccError> {
        self.send_request_with(major, minor, payload, reply_capacity, WaitMode::Uninterruptible)
    }
}

impl<T: IccTransport + ?Sized> IccTransport for Arc<T> {
    fn send_request_with(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
        mode: WaitMode,
    ) -> Result<IccReply, IccError> {
        (**self).send_request_with(major, minor, payload, reply_capacity, mode)
    }
}

impl<T: IccTransport + ?Sized> IccTransport for &T {
    fn send_request_with(
        &self,
        major: u8,
        minor: u16,
        payload: &[u8],
        reply_capacity: u16,
        mode: WaitMode,
    ) -> Result<IccReply, IccError> {
        (**self).send_request_with(major, minor, payload, reply_capacity, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo {
        modes: Mutex<Vec<WaitMode>>,
    }

    impl IccTransport for Echo {
        fn send_request_with(
            &self,
            _major: u8,
            _minor: u16,
            payload: &[u8],
            reply_capacity: u16,
            mode: WaitMode,
        ) -> Result<IccReply, IccError> {
            self.modes.lock().unwrap().push(mode);
            let keep = payload.len().min(usize::from(reply_capacity));
            Ok(IccReply {
                length: payload.len(),
                payload: payload[..keep].to_vec(),
            })
        }
    }

    #[test]
    fn test_default_send_is_uninterruptible() {
        let echo = Echo {
            modes: Mutex::new(Vec::new()),
        };
        echo.send_request(1, 0, &[1, 2, 3], 8).unwrap();
        echo.send_request_with(1, 0, &[], 0, WaitMode::Interruptible)
            .unwrap();
        assert_eq!(
            *echo.modes.lock().unwrap(),
            vec![WaitMode::Uninterruptible, WaitMode::Interruptible]
        );
    }

    #[test]
    fn test_truncated_reply() {
        let transport: Arc<dyn IccTransport> = Arc::new(Echo {
            modes: Mutex::new(Vec::new()),
        });
        let reply = transport.send_request(1, 0, &[1, 2, 3, 4], 2).unwrap();
        assert_eq!(reply.payload, vec![1, 2]);
        assert_eq!(reply.length, 4);
        assert!(reply.is_truncated());
    }
}
