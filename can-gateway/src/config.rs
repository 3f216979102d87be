//! Gateway configuration types
//!
//! This module defines the configuration consumed once at session start: the
//! CAN interface, the receive filter, the throttle interval and both mapping
//! lists. Identifiers stay as base-16 text here and are parsed when the
//! mapping table is built.

use crate::mapping::{self, parse_can_id};
use crate::transport::RxFilter;
use crate::types::{GatewayError, Result, ValueType};
use serde::{Deserialize, Serialize};

/// Recommended lower bound for the throttle interval
pub const MIN_RECOMMENDED_THROTTLE_MS: u64 = 1000;

/// Recommended upper bound for the throttle interval
pub const MAX_RECOMMENDED_THROTTLE_MS: u64 = 60_000;

/// Configuration for a gateway session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// CAN interface name (e.g. "can0", "vcan0")
    #[serde(default = "default_interface")]
    pub can_interface: String,

    /// Minimum interval between two emissions of a non-realtime mapping
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Receive filter identifier (base-16 text)
    #[serde(default = "default_filter")]
    pub filter_id: String,

    /// Receive filter mask (base-16 text)
    #[serde(default = "default_filter")]
    pub filter_mask: String,

    /// Frames decoded and published on the bus
    #[serde(default)]
    pub inputs: Vec<MappingEntry>,

    /// Bus paths encoded and sent as frames
    #[serde(default)]
    pub outputs: Vec<MappingEntry>,
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_throttle_ms() -> u64 {
    5000
}

fn default_filter() -> String {
    "0x400".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            can_interface: default_interface(),
            throttle_ms: default_throttle_ms(),
            filter_id: default_filter(),
            filter_mask: default_filter(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// One configured mapping between a CAN identifier and a bus path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// CAN identifier as base-16 text (e.g. "0x123")
    pub id: String,
    /// Bypass throttling for this mapping
    #[serde(default)]
    pub realtime: bool,
    /// Payload value type
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Bus path written to (inputs) or read from (outputs)
    pub path: String,
}

impl MappingEntry {
    /// Create a mapping entry
    pub fn new(id: impl Into<String>, value_type: ValueType, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            realtime: false,
            value_type,
            path: path.into(),
        }
    }

    /// Builder method: mark the mapping as realtime
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

impl GatewayConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the CAN interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.can_interface = interface.into();
        self
    }

    /// Builder method: set the throttle interval
    pub fn with_throttle_ms(mut self, throttle_ms: u64) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }

    /// Builder method: set the receive filter
    pub fn with_filter(mut self, id: impl Into<String>, mask: impl Into<String>) -> Self {
        self.filter_id = id.into();
        self.filter_mask = mask.into();
        self
    }

    /// Builder method: add an input mapping
    pub fn add_input(mut self, entry: MappingEntry) -> Self {
        self.inputs.push(entry);
        self
    }

    /// Builder method: add an output mapping
    pub fn add_output(mut self, entry: MappingEntry) -> Self {
        self.outputs.push(entry);
        self
    }

    /// Parse the receive filter
    pub fn rx_filter(&self) -> Result<RxFilter> {
        Ok(RxFilter::new(
            parse_can_id(&self.filter_id)?,
            parse_can_id(&self.filter_mask)?,
        ))
    }

    /// Check that the configuration can start a session
    ///
    /// Parses the filter and every mapping; an out-of-bounds throttle only logs
    /// a warning.
    pub fn validate(&self) -> Result<()> {
        if self.can_interface.trim().is_empty() {
            return Err(GatewayError::Config("CAN interface name is empty".to_string()));
        }

        if !(MIN_RECOMMENDED_THROTTLE_MS..=MAX_RECOMMENDED_THROTTLE_MS).contains(&self.throttle_ms) {
            log::warn!(
                "Throttle of {} ms is outside the recommended range [{}, {}]",
                self.throttle_ms,
                MIN_RECOMMENDED_THROTTLE_MS,
                MAX_RECOMMENDED_THROTTLE_MS
            );
        }

        self.rx_filter()?;
        mapping::build_inputs(&self.inputs)?;
        mapping::build_outputs(&self.outputs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new();
        assert_eq!(config.can_interface, "can0");
        assert_eq!(config.throttle_ms, 5000);
        assert_eq!(config.rx_filter().unwrap(), RxFilter::new(0x400, 0x400));
        assert!(config.inputs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = GatewayConfig::new()
            .with_interface("vcan0")
            .with_throttle_ms(2000)
            .with_filter("0x100", "0x700")
            .add_input(MappingEntry::new("0x123", ValueType::Float, "environment.depth.belowTransducer"))
            .add_output(MappingEntry::new("0x400", ValueType::UInt, "electrical.switches.bank0").realtime(true));

        assert_eq!(config.can_interface, "vcan0");
        assert_eq!(config.throttle_ms, 2000);
        assert_eq!(config.rx_filter().unwrap(), RxFilter::new(0x100, 0x700));
        assert_eq!(config.inputs.len(), 1);
        assert!(config.outputs[0].realtime);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = GatewayConfig::new().with_filter("0xZZ", "0x400");
        assert!(matches!(config.validate(), Err(GatewayError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_invalid_mapping_rejected() {
        let config = GatewayConfig::new().add_input(MappingEntry::new("g00d", ValueType::UInt, "a.b"));
        assert!(config.validate().is_err());

        let config = GatewayConfig::new().add_output(MappingEntry::new("0x401", ValueType::XyzFloat, "a.b"));
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_empty_interface_rejected() {
        let config = GatewayConfig::new().with_interface("  ");
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_out_of_bounds_throttle_is_allowed() {
        assert!(GatewayConfig::new().with_throttle_ms(100).validate().is_ok());
    }

    #[test]
    fn test_deserialize_entry() {
        let entry: MappingEntry = serde_json::from_str(
            r#"{"id": "0x123", "type": "xyz-float", "path": "navigation.attitude"}"#,
        )
        .unwrap();
        assert_eq!(entry.value_type, ValueType::XyzFloat);
        assert!(!entry.realtime);

        let unknown = serde_json::from_str::<MappingEntry>(
            r#"{"id": "0x123", "type": "double", "path": "a.b"}"#,
        );
        assert!(unknown.is_err());
    }
}
