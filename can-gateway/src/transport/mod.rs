//! CAN transport abstraction
//!
//! The gateway core only needs to configure a receive filter, pull received
//! frames and push frames to send. Backends:
//! - [`SocketCanTransport`]: Linux SocketCAN (`can0`, `vcan0`, ...)
//! - [`MockTransport`]: in-memory bus for tests and dry runs

use crate::types::Frame;
use std::time::Duration;
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use mock::MockTransport;

#[cfg(target_os = "linux")]
pub use self::socketcan::SocketCanTransport;

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    #[error("Transport not started")]
    NotStarted,
    #[error("Transport closed")]
    Closed,
}

/// Receive acceptance filter
///
/// A frame is accepted iff `(frame.id & mask) == (id & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RxFilter {
    pub id: u32,
    pub mask: u32,
}

impl RxFilter {
    pub fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// Filter that accepts every frame
    pub fn accept_all() -> Self {
        Self { id: 0, mask: 0 }
    }

    pub fn accepts(&self, frame_id: u32) -> bool {
        (frame_id & self.mask) == (self.id & self.mask)
    }
}

/// A CAN bus connection shared by the receive loop and the outbound workers
///
/// All methods take `&self` so one transport can be shared behind an `Arc`.
/// Opening the connection is the backend's constructor.
pub trait CanTransport: Send + Sync {
    /// Install the receive filter (replaces any previous filter)
    fn set_filter(&self, filter: RxFilter) -> Result<(), TransportError>;

    /// Send one frame; no retry is attempted on failure
    fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next accepted frame
    ///
    /// Returns `Ok(None)` when the timeout elapses without a frame.
    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Frame>, TransportError>;

    /// Begin delivering frames
    fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Stop delivering frames
    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_filter() {
        // Only frames with bit 0x400 set
        let filter = RxFilter::new(0x400, 0x400);
        assert!(filter.accepts(0x400));
        assert!(filter.accepts(0x423));
        assert!(filter.accepts(0x7FF));
        assert!(!filter.accepts(0x123));
        assert!(!filter.accepts(0x3FF));
    }

    #[test]
    fn test_rx_filter_exact_match() {
        let filter = RxFilter::new(0x123, 0x7FF);
        assert!(filter.accepts(0x123));
        assert!(!filter.accepts(0x124));
    }

    #[test]
    fn test_accept_all() {
        let filter = RxFilter::accept_all();
        assert!(filter.accepts(0));
        assert!(filter.accepts(0x1FFF_FFFF));
    }
}
