//! Outbound dispatcher
//!
//! Each output mapping gets one persistent subscription on its path and a
//! worker thread that owns the mapping's route. For every value the route:
//! 1. Gates it through the route's throttle (skipped for realtime mappings)
//! 2. Unwraps and encodes it into an 8-byte payload
//! 3. Sends the frame (fire-and-forget, no retry)
//!
//! Releasing the dispatcher unsubscribes every path and joins the workers.

use crate::bus::{Subscription, SubscriptionId, ValueSource};
use crate::codec;
use crate::mapping::OutputMapping;
use crate::throttle::Throttle;
use crate::transport::CanTransport;
use crate::types::{Frame, GatewayError, OutboundValue, Result, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What happened to one outbound value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundOutcome {
    /// Dropped inside the subscription's throttle window
    Throttled,
    /// Value could not be encoded
    EncodeFailed,
    /// Frame built but the transport rejected it
    SendFailed,
    /// Frame handed to the transport
    Sent(Frame),
}

/// One output mapping with the throttle bound to its subscription
#[derive(Debug, Clone)]
pub struct OutboundRoute {
    mapping: OutputMapping,
    throttle: Option<Throttle>,
}

impl OutboundRoute {
    pub fn new(mapping: OutputMapping, throttle_ms: u64) -> Self {
        let throttle = mapping.throttle(throttle_ms);
        Self { mapping, throttle }
    }

    pub fn mapping(&self) -> &OutputMapping {
        &self.mapping
    }

    /// Handle one value received at `now`
    pub fn handle(&mut self, value: &OutboundValue, now: Timestamp, transport: &dyn CanTransport) -> OutboundOutcome {
        if let Some(throttle) = self.throttle.as_mut() {
            if !throttle.try_acquire(now) {
                log::debug!("Ignoring value on {} due to throttle", self.mapping.path);
                return OutboundOutcome::Throttled;
            }
        }

        let frame = match self.encode(value) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Error encoding {}: {}", self.mapping.path, e);
                return OutboundOutcome::EncodeFailed;
            }
        };

        log::debug!(
            "Encoding {} ({}) to CAN ID 0x{:X}",
            value,
            self.mapping.value_type,
            self.mapping.id
        );

        match transport.send(&frame) {
            Ok(()) => OutboundOutcome::Sent(frame),
            Err(e) => {
                log::error!("Failed to send CAN frame 0x{:X}: {}", frame.id, e);
                OutboundOutcome::SendFailed
            }
        }
    }

    fn encode(&self, value: &OutboundValue) -> Result<Frame> {
        let payload = codec::encode(self.mapping.value_type, value).map_err(|source| GatewayError::Encode {
            can_id: self.mapping.id,
            value_type: self.mapping.value_type,
            source,
        })?;
        Ok(Frame::new(self.mapping.id, payload))
    }
}

/// Subscriptions and worker threads of the outbound direction
pub struct OutboundDispatcher {
    source: Arc<dyn ValueSource>,
    active: Arc<AtomicBool>,
    workers: Vec<(SubscriptionId, JoinHandle<()>)>,
}

impl OutboundDispatcher {
    /// Subscribe to every output path and start one worker per subscription
    pub fn start(
        outputs: Vec<OutputMapping>,
        throttle_ms: u64,
        source: Arc<dyn ValueSource>,
        transport: Arc<dyn CanTransport>,
    ) -> Result<Self> {
        let mut dispatcher = Self {
            source,
            active: Arc::new(AtomicBool::new(true)),
            workers: Vec::with_capacity(outputs.len()),
        };

        for mapping in outputs {
            let subscription = dispatcher.source.subscribe(&mapping.path);
            let sub_id = subscription.id;
            log::info!(
                "Output 0x{:X} ({}) subscribed to {}{}",
                mapping.id,
                mapping.value_type,
                mapping.path,
                if mapping.realtime { " [realtime]" } else { "" }
            );

            let route = OutboundRoute::new(mapping, throttle_ms);
            let active = dispatcher.active.clone();
            let transport = transport.clone();
            let spawned = thread::Builder::new()
                .name(format!("can-gw-out-{:X}", route.mapping.id))
                .spawn(move || run_worker(route, subscription, active, transport));

            match spawned {
                Ok(handle) => dispatcher.workers.push((sub_id, handle)),
                Err(e) => {
                    // Dropping the dispatcher releases what was already started
                    dispatcher.source.unsubscribe(sub_id);
                    return Err(GatewayError::Io(e));
                }
            }
        }

        Ok(dispatcher)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.workers.len()
    }

    /// Unsubscribe every path and wait for the workers to finish
    ///
    /// Values still queued are discarded. Calling this again is a no-op.
    pub fn release(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if self.workers.is_empty() {
            return;
        }

        for (sub_id, _) in &self.workers {
            self.source.unsubscribe(*sub_id);
        }
        for (sub_id, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Outbound worker for subscription {} panicked", sub_id);
            }
        }
        log::debug!("Outbound subscriptions released");
    }
}

impl Drop for OutboundDispatcher {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_worker(
    mut route: OutboundRoute,
    subscription: Subscription,
    active: Arc<AtomicBool>,
    transport: Arc<dyn CanTransport>,
) {
    while let Some(value) = subscription.recv() {
        if !active.load(Ordering::SeqCst) {
            break;
        }
        route.handle(&value, chrono::Utc::now(), transport.as_ref());
    }
    log::trace!("Outbound worker for {} finished", subscription.path);
}
