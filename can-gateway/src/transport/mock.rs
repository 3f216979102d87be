//! In-memory transport
//!
//! Frames injected with [`MockTransport::inject`] pass through the receive
//! filter the same way the kernel applies it for SocketCAN. Sent frames are
//! queued and can be drained by the test or the caller.

use super::{CanTransport, RxFilter, TransportError};
use crate::types::Frame;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory CAN transport
pub struct MockTransport {
    filter: Mutex<RxFilter>,
    rx_tx: Sender<Frame>,
    rx_rx: Receiver<Frame>,
    sent_tx: Sender<Frame>,
    sent_rx: Receiver<Frame>,
    started: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// Create a stopped transport that accepts every frame
    pub fn new() -> Self {
        let (rx_tx, rx_rx) = unbounded();
        let (sent_tx, sent_rx) = unbounded();
        Self {
            filter: Mutex::new(RxFilter::accept_all()),
            rx_tx,
            rx_rx,
            sent_tx,
            sent_rx,
            started: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Deliver a frame from the bus; returns false if the filter dropped it
    pub fn inject(&self, frame: Frame) -> bool {
        if !self.filter.lock().accepts(frame.id) {
            log::trace!("Mock filter dropped frame 0x{:X}", frame.id);
            return false;
        }
        self.rx_tx.send(frame).is_ok()
    }

    /// Wait for the next frame sent through this transport
    pub fn recv_sent(&self, timeout: Duration) -> Option<Frame> {
        self.sent_rx.recv_timeout(timeout).ok()
    }

    /// All frames sent so far and not yet drained
    pub fn drain_sent(&self) -> Vec<Frame> {
        self.sent_rx.try_iter().collect()
    }

    /// Make every following `send` fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn filter(&self) -> RxFilter {
        *self.filter.lock()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CanTransport for MockTransport {
    fn set_filter(&self, filter: RxFilter) -> Result<(), TransportError> {
        *self.filter.lock() = filter;
        Ok(())
    }

    fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Device(format!(
                "Injected send failure for 0x{:X}",
                frame.id
            )));
        }
        self.sent_tx
            .send(frame.clone())
            .map_err(|_| TransportError::Closed)
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        if !self.is_started() {
            return Err(TransportError::NotStarted);
        }
        match self.rx_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn start(&self) -> Result<(), TransportError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_respects_filter() {
        let transport = MockTransport::new();
        transport.set_filter(RxFilter::new(0x400, 0x400)).unwrap();
        transport.start().unwrap();

        assert!(!transport.inject(Frame::new(0x123, vec![0u8; 8])));
        assert!(transport.inject(Frame::new(0x401, vec![1u8; 8])));

        let frame = transport.receive_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.map(|f| f.id), Some(0x401));
        assert!(transport.receive_timeout(Duration::from_millis(1)).unwrap().is_none());
    }

    #[test]
    fn test_receive_requires_start() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.receive_timeout(Duration::ZERO),
            Err(TransportError::NotStarted)
        ));
        transport.start().unwrap();
        assert!(transport.is_started());
        transport.stop();
        assert!(!transport.is_started());
    }

    #[test]
    fn test_sent_frames_are_recorded() {
        let transport = MockTransport::new();
        transport.send(&Frame::new(0x400, vec![42, 0, 0, 0, 0, 0, 0, 0])).unwrap();
        transport.send(&Frame::new(0x401, vec![0u8; 8])).unwrap();

        let sent = transport.drain_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data[0], 42);
        assert!(transport.drain_sent().is_empty());
    }

    #[test]
    fn test_injected_send_failure() {
        let transport = MockTransport::new();
        transport.set_fail_sends(true);
        assert!(transport.send(&Frame::new(0x400, vec![0u8; 8])).is_err());
        assert!(transport.drain_sent().is_empty());
    }
}
