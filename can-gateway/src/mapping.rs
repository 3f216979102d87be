//! Mapping table
//!
//! Builds the inbound and outbound mappings from configuration entries and
//! indexes inbound mappings by CAN identifier.

use crate::config::MappingEntry;
use crate::throttle::Throttle;
use crate::types::{GatewayError, Result, Timestamp, ValueType, MAX_EXTENDED_ID};
use std::collections::HashMap;

/// An inbound mapping: frames with `id` are decoded and published at `path`
#[derive(Debug, Clone, PartialEq)]
pub struct InputMapping {
    /// CAN identifier
    pub id: u32,
    /// Payload value type
    pub value_type: ValueType,
    /// Bus path the decoded value is published at
    pub path: String,
    /// Carried from the configuration; inputs are always throttled
    pub realtime: bool,
    /// Last time a frame for this mapping passed the throttle (None = never)
    pub last_send: Option<Timestamp>,
}

/// An outbound mapping: values on `path` are encoded and sent with `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    /// CAN identifier
    pub id: u32,
    /// Payload value type (never `XyzFloat`)
    pub value_type: ValueType,
    /// Bus path the values are read from
    pub path: String,
    /// Bypass throttling
    pub realtime: bool,
}

impl OutputMapping {
    /// Throttle guarding this mapping's subscription (None if realtime)
    pub fn throttle(&self, interval_ms: u64) -> Option<Throttle> {
        if self.realtime {
            None
        } else {
            Some(Throttle::new(interval_ms))
        }
    }
}

/// Parse a CAN identifier or mask from base-16 text
///
/// Accepts an optional `0x`/`0X` prefix and surrounding whitespace.
pub fn parse_can_id(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GatewayError::InvalidIdentifier(text.to_string()));
    }

    match u32::from_str_radix(digits, 16) {
        Ok(id) if id <= MAX_EXTENDED_ID => Ok(id),
        _ => Err(GatewayError::InvalidIdentifier(text.to_string())),
    }
}

/// Build inbound mappings in configuration order
pub fn build_inputs(entries: &[MappingEntry]) -> Result<Vec<InputMapping>> {
    entries
        .iter()
        .map(|entry| {
            Ok(InputMapping {
                id: parse_can_id(&entry.id)?,
                value_type: entry.value_type,
                path: entry.path.clone(),
                realtime: entry.realtime,
                last_send: None,
            })
        })
        .collect()
}

/// Build outbound mappings in configuration order
///
/// Vector types cannot be encoded, so they are rejected here rather than
/// failing on every value at runtime.
pub fn build_outputs(entries: &[MappingEntry]) -> Result<Vec<OutputMapping>> {
    entries
        .iter()
        .map(|entry| {
            let id = parse_can_id(&entry.id)?;
            if !entry.value_type.is_encodable() {
                return Err(GatewayError::Config(format!(
                    "Output 0x{:X} ({}): type {} cannot be encoded",
                    id, entry.path, entry.value_type
                )));
            }
            Ok(OutputMapping {
                id,
                value_type: entry.value_type,
                path: entry.path.clone(),
                realtime: entry.realtime,
            })
        })
        .collect()
}

/// Inbound and outbound mappings of one session
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    inputs: Vec<InputMapping>,
    outputs: Vec<OutputMapping>,
    /// Key: CAN ID, Value: index of the first input mapping with that ID
    input_index: HashMap<u32, usize>,
}

impl MappingTable {
    /// Build the table from configuration entries
    pub fn build(inputs: &[MappingEntry], outputs: &[MappingEntry]) -> Result<Self> {
        Ok(Self::from_mappings(build_inputs(inputs)?, build_outputs(outputs)?))
    }

    /// Assemble a table from already-built mappings
    pub fn from_mappings(inputs: Vec<InputMapping>, outputs: Vec<OutputMapping>) -> Self {
        let mut input_index = HashMap::new();
        for (idx, input) in inputs.iter().enumerate() {
            if input_index.contains_key(&input.id) {
                log::warn!(
                    "Duplicate input mapping for CAN ID 0x{:X} ({}), keeping the first",
                    input.id,
                    input.path
                );
                continue;
            }
            input_index.insert(input.id, idx);
        }

        Self {
            inputs,
            outputs,
            input_index,
        }
    }

    /// First inbound mapping with exactly this identifier
    pub fn find_input(&self, id: u32) -> Option<&InputMapping> {
        self.input_index.get(&id).map(|&idx| &self.inputs[idx])
    }

    pub fn inputs(&self) -> &[InputMapping] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputMapping] {
        &self.outputs
    }

    /// Split into the inbound part (kept by the receive loop) and the outputs
    pub fn into_parts(self) -> (InboundTable, Vec<OutputMapping>) {
        (
            InboundTable {
                inputs: self.inputs,
                input_index: self.input_index,
            },
            self.outputs,
        )
    }

    /// Get table statistics
    pub fn stats(&self) -> MappingStats {
        MappingStats {
            num_inputs: self.inputs.len(),
            num_outputs: self.outputs.len(),
            num_realtime: self.outputs.iter().filter(|m| m.realtime).count(),
        }
    }
}

/// The inbound half of a [`MappingTable`], owned by the inbound dispatcher
#[derive(Debug, Clone, Default)]
pub struct InboundTable {
    inputs: Vec<InputMapping>,
    input_index: HashMap<u32, usize>,
}

impl InboundTable {
    pub fn find(&self, id: u32) -> Option<&InputMapping> {
        self.input_index.get(&id).map(|&idx| &self.inputs[idx])
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut InputMapping> {
        match self.input_index.get(&id) {
            Some(&idx) => self.inputs.get_mut(idx),
            None => None,
        }
    }

    pub fn inputs(&self) -> &[InputMapping] {
        &self.inputs
    }
}

/// Mapping table statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingStats {
    /// Number of inbound mappings
    pub num_inputs: usize,
    /// Number of outbound mappings
    pub num_outputs: usize,
    /// Number of output mappings that bypass the throttle
    pub num_realtime: usize,
}
