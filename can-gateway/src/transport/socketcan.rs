//! SocketCAN backend
//!
//! - **Linux only**: SocketCAN is a kernel feature
//! - **Interface setup**: bitrate and link state are configured with `ip link`,
//!   not by the gateway
//! - **Filtering**: the receive filter is installed in the kernel, so rejected
//!   frames never reach user space

use super::{CanTransport, RxFilter, TransportError};
use crate::types::{Frame, MAX_EXTENDED_ID, MAX_STANDARD_ID};
use ::socketcan::{
    CanFilter, CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame as _, Socket, SocketOptions,
    StandardId,
};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// SocketCAN transport
///
/// ```no_run
/// use can_gateway::transport::{CanTransport, RxFilter, SocketCanTransport};
///
/// let transport = SocketCanTransport::open("vcan0").unwrap();
/// transport.set_filter(RxFilter::new(0x400, 0x400)).unwrap();
/// ```
pub struct SocketCanTransport {
    socket: CanSocket,
    interface: String,
    started: AtomicBool,
}

impl SocketCanTransport {
    /// Open a raw CAN socket bound to `interface`
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        log::info!("Opening SocketCAN interface {}", interface);

        let socket = CanSocket::open(interface).map_err(|e| {
            TransportError::Device(format!("Failed to open CAN interface '{}': {}", interface, e))
        })?;

        Ok(Self {
            socket,
            interface: interface.to_string(),
            started: AtomicBool::new(false),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn to_socketcan_frame(frame: &Frame) -> Result<CanFrame, TransportError> {
        let can_frame = if frame.extended {
            ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, &frame.data))
        } else {
            u16::try_from(frame.id)
                .ok()
                .and_then(StandardId::new)
                .and_then(|id| CanFrame::new(id, &frame.data))
        };

        can_frame.ok_or_else(|| {
            TransportError::Device(format!(
                "Failed to build frame with ID 0x{:X} and {} data bytes",
                frame.id,
                frame.data.len()
            ))
        })
    }

    fn from_socketcan_frame(can_frame: &CanFrame) -> Frame {
        let extended = can_frame.is_extended();
        let id = if extended {
            can_frame.raw_id() & MAX_EXTENDED_ID
        } else {
            can_frame.raw_id() & MAX_STANDARD_ID
        };
        Frame {
            id,
            extended,
            data: can_frame.data().to_vec(),
        }
    }
}

impl CanTransport for SocketCanTransport {
    fn set_filter(&self, filter: RxFilter) -> Result<(), TransportError> {
        self.socket
            .set_filters(&[CanFilter::new(filter.id, filter.mask)])
            .map_err(TransportError::Io)?;
        log::debug!(
            "SocketCAN filter on {}: id=0x{:X} mask=0x{:X}",
            self.interface,
            filter.id,
            filter.mask
        );
        Ok(())
    }

    fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        let can_frame = Self::to_socketcan_frame(frame)?;
        self.socket.write_frame(&can_frame).map_err(TransportError::Io)?;
        log::trace!("Sent CAN frame {}", frame);
        Ok(())
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        self.socket.set_read_timeout(timeout).map_err(TransportError::Io)?;

        loop {
            let can_frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::Io(e)),
            };

            if !matches!(can_frame, CanFrame::Data(_)) {
                log::trace!("Skipping non-data frame 0x{:X}", can_frame.raw_id());
                continue;
            }

            return Ok(Some(Self::from_socketcan_frame(&can_frame)));
        }
    }

    fn start(&self) -> Result<(), TransportError> {
        self.started.store(true, Ordering::SeqCst);
        log::debug!("SocketCAN interface {} started", self.interface);
        Ok(())
    }

    fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            log::debug!("SocketCAN interface {} stopped", self.interface);
        }
    }
}
