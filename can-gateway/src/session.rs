//! Gateway session
//!
//! A session is the lifetime of one set of mappings: it is built from a
//! [`GatewayConfig`] at start and torn down at stop. Starting a session:
//! 1. Validates the configuration and builds the mapping table
//! 2. Installs the receive filter
//! 3. Subscribes every output mapping and starts its worker
//! 4. Starts the transport and the receive loop feeding the inbound dispatcher
//!
//! Stopping is idempotent and also happens on drop.

use crate::bus::{ValueSink, ValueSource};
use crate::config::GatewayConfig;
use crate::inbound::{InboundDispatcher, InboundOutcome};
use crate::mapping::MappingTable;
use crate::outbound::OutboundDispatcher;
use crate::transport::{CanTransport, TransportError};
use crate::types::{GatewayError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the receive loop waits for a frame before checking for stop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters of the inbound direction
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_received: AtomicU64,
    pub frames_unmapped: AtomicU64,
    pub frames_throttled: AtomicU64,
    pub decode_errors: AtomicU64,
    pub values_published: AtomicU64,
}

impl SessionStats {
    fn record(&self, outcome: &InboundOutcome) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            InboundOutcome::Unmapped => &self.frames_unmapped,
            InboundOutcome::Throttled => &self.frames_throttled,
            InboundOutcome::DecodeFailed => &self.decode_errors,
            InboundOutcome::Published { .. } => &self.values_published,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_unmapped: self.frames_unmapped.load(Ordering::Relaxed),
            frames_throttled: self.frames_throttled.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            values_published: self.values_published.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_unmapped: u64,
    pub frames_throttled: u64,
    pub decode_errors: u64,
    pub values_published: u64,
}

/// A running gateway session
pub struct Session {
    transport: Arc<dyn CanTransport>,
    running: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    receiver: Option<JoinHandle<()>>,
    outbound: Option<OutboundDispatcher>,
}

impl Session {
    /// Start a session with the default receive poll interval
    pub fn start(
        config: &GatewayConfig,
        transport: Arc<dyn CanTransport>,
        sink: Arc<dyn ValueSink>,
        source: Arc<dyn ValueSource>,
    ) -> Result<Self> {
        Self::start_with_poll_interval(config, transport, sink, source, DEFAULT_POLL_INTERVAL)
    }

    /// Start a session
    ///
    /// Any configuration error is returned before the transport is touched.
    /// A zero `poll_interval` is rejected.
    pub fn start_with_poll_interval(
        config: &GatewayConfig,
        transport: Arc<dyn CanTransport>,
        sink: Arc<dyn ValueSink>,
        source: Arc<dyn ValueSource>,
        poll_interval: Duration,
    ) -> Result<Self> {
        log::info!("Starting CAN gateway on {}", config.can_interface);
        config.validate()?;
        if poll_interval.is_zero() {
            return Err(GatewayError::Config(
                "Receive poll interval must be greater than zero".to_string(),
            ));
        }

        let filter = config.rx_filter()?;
        let table = MappingTable::build(&config.inputs, &config.outputs)?;
        let stats = table.stats();
        log::info!(
            "Mappings loaded: {} inputs, {} outputs ({} realtime)",
            stats.num_inputs,
            stats.num_outputs,
            stats.num_realtime
        );
        let (inbound_table, outputs) = table.into_parts();

        log::debug!(
            "Setting up CAN channel {} with filter ID 0x{:X} and mask 0x{:X}",
            config.can_interface,
            filter.id,
            filter.mask
        );
        transport.set_filter(filter)?;

        let mut session = Self {
            transport: transport.clone(),
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(SessionStats::default()),
            receiver: None,
            outbound: None,
        };

        session.outbound = Some(OutboundDispatcher::start(
            outputs,
            config.throttle_ms,
            source,
            transport.clone(),
        )?);

        transport.start()?;

        let dispatcher = InboundDispatcher::new(inbound_table, config.throttle_ms, sink);
        let running = session.running.clone();
        let stats = session.stats.clone();
        let handle = thread::Builder::new()
            .name("can-gw-rx".to_string())
            .spawn(move || run_receiver(dispatcher, transport, running, stats, poll_interval))
            .map_err(GatewayError::Io)?;
        session.receiver = Some(handle);

        log::info!("CAN gateway started");
        Ok(session)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the session: no new frames are accepted, outbound subscriptions
    /// are released and every thread is joined
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            log::debug!("Stopping CAN channel");
        }

        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                log::error!("CAN receive loop panicked");
            }
        }
        self.transport.stop();

        if let Some(mut outbound) = self.outbound.take() {
            outbound.release();
        }

        if was_running {
            log::info!("CAN gateway stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_receiver(
    mut dispatcher: InboundDispatcher,
    transport: Arc<dyn CanTransport>,
    running: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    poll_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match transport.receive_timeout(poll_interval) {
            Ok(Some(frame)) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let outcome = dispatcher.dispatch(&frame, chrono::Utc::now());
                stats.record(&outcome);
            }
            Ok(None) | Err(TransportError::Timeout) => continue,
            Err(TransportError::NotStarted) if !running.load(Ordering::SeqCst) => break,
            Err(e) => {
                log::error!("CAN receive error: {}", e);
                // Back off before polling again
                thread::sleep(poll_interval);
            }
        }
    }
    log::trace!("CAN receive loop finished");
}
