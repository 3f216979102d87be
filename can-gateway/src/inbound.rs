//! Inbound dispatcher
//!
//! Turns received frames into published values:
//! 1. Look up the input mapping by CAN ID → unmapped frames are dropped
//! 2. Check the mapping's throttle → throttled frames are dropped
//! 3. Stamp `last_send`, then decode → decode failures are logged and dropped
//! 4. Publish the value at the mapping's path
//!
//! The throttle is stamped before decoding, so a malformed frame still
//! consumes the mapping's throttle window. Every input is throttled; the
//! `realtime` flag only affects outputs.

use crate::bus::ValueSink;
use crate::codec;
use crate::mapping::{InboundTable, InputMapping};
use crate::throttle;
use crate::types::{DecodedValue, Frame, GatewayError, Timestamp};
use std::sync::Arc;

/// What happened to one received frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// No input mapping for this CAN ID
    Unmapped,
    /// Dropped inside the mapping's throttle window
    Throttled,
    /// Payload could not be decoded
    DecodeFailed,
    /// Value published at `path`
    Published { path: String, value: DecodedValue },
}

/// Dispatcher owning the inbound mappings and their throttle timestamps
pub struct InboundDispatcher {
    table: InboundTable,
    throttle_ms: u64,
    sink: Arc<dyn ValueSink>,
}

impl InboundDispatcher {
    pub fn new(table: InboundTable, throttle_ms: u64, sink: Arc<dyn ValueSink>) -> Self {
        Self {
            table,
            throttle_ms,
            sink,
        }
    }

    /// Process one frame received at `now`
    pub fn dispatch(&mut self, frame: &Frame, now: Timestamp) -> InboundOutcome {
        let Some(mapping) = self.table.find_mut(frame.id) else {
            log::trace!("No input mapping for CAN ID 0x{:X}", frame.id);
            return InboundOutcome::Unmapped;
        };

        if !throttle::allow(mapping.last_send, now, self.throttle_ms) {
            log::debug!("Ignoring CAN frame 0x{:X} due to throttle", frame.id);
            return InboundOutcome::Throttled;
        }
        mapping.last_send = Some(now);

        let value = match Self::decode(mapping, frame) {
            Ok(value) => value,
            Err(e) => {
                log::error!("{}", e);
                return InboundOutcome::DecodeFailed;
            }
        };

        log::debug!(
            "Decoded CAN 0x{:X} = {} ({}) to {}",
            frame.id,
            value,
            mapping.value_type,
            mapping.path
        );
        self.sink.publish(&mapping.path, &value);

        InboundOutcome::Published {
            path: mapping.path.clone(),
            value,
        }
    }

    fn decode(mapping: &InputMapping, frame: &Frame) -> Result<DecodedValue, GatewayError> {
        codec::decode(mapping.value_type, &frame.data).map_err(|source| GatewayError::Decode {
            can_id: frame.id,
            value_type: mapping.value_type,
            source,
        })
    }

    /// Input mappings with their current throttle timestamps
    pub fn mappings(&self) -> &[InputMapping] {
        self.table.inputs()
    }
}
