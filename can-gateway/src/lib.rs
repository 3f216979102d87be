//! CAN Gateway Library
//!
//! A bidirectional gateway between a CAN bus and a path-addressed pub/sub
//! data model.
//!
//! # Architecture
//!
//! - Inbound: received frames are matched against the input mappings by CAN
//!   ID, throttled per mapping, decoded and published at the mapping's path
//! - Outbound: each output mapping subscribes to its path; values are
//!   throttled per subscription (unless realtime), encoded and sent
//! - Supported payload types: `uint`, `int`, `float` (32-bit little-endian at
//!   byte 0) and the decode-only `xyz-float` vector
//!
//! The library does NOT:
//! - Reassemble multi-frame (ISO-TP) messages
//! - Recover from bus-off or handle arbitration
//! - Change mappings while a session is running
//!
//! # Example Usage
//!
//! ```no_run
//! use can_gateway::{GatewayConfig, MappingEntry, MemoryBus, Session, ValueType};
//! use can_gateway::transport::SocketCanTransport;
//! use std::sync::Arc;
//!
//! let config = GatewayConfig::new()
//!     .with_interface("can0")
//!     .with_throttle_ms(5000)
//!     .add_input(MappingEntry::new("0x123", ValueType::Float, "environment.depth.belowTransducer"))
//!     .add_output(MappingEntry::new("0x400", ValueType::UInt, "electrical.switches.bank0").realtime(true));
//!
//! let transport = Arc::new(SocketCanTransport::open(&config.can_interface).unwrap());
//! let bus = Arc::new(MemoryBus::new(can_gateway::SOURCE_LABEL));
//! let mut session = Session::start(&config, transport, bus.clone(), bus.clone()).unwrap();
//!
//! for update in bus.updates().iter().take(10) {
//!     println!("{} = {}", update.path, update.value);
//! }
//! session.stop();
//! ```

// Public modules
pub mod bus;
pub mod codec;
pub mod config;
pub mod inbound;
pub mod mapping;
pub mod outbound;
pub mod session;
pub mod throttle;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use bus::{MemoryBus, Subscription, SubscriptionId, Update, ValueSink, ValueSource};
pub use config::{GatewayConfig, MappingEntry};
pub use inbound::{InboundDispatcher, InboundOutcome};
pub use mapping::{InputMapping, MappingStats, MappingTable, OutputMapping};
pub use outbound::{OutboundDispatcher, OutboundOutcome, OutboundRoute};
pub use session::{Session, StatsSnapshot};
pub use transport::{CanTransport, MockTransport, RxFilter, TransportError};
pub use types::{
    CodecError, DecodedValue, Frame, GatewayError, OutboundValue, Result, Scalar, Timestamp,
    ValueType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Label attached to every update published by the gateway
pub const SOURCE_LABEL: &str = "can-gateway";
