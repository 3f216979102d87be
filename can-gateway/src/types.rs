//! Core types for the CAN gateway library
//!
//! This module defines the frames, value types and errors shared by the codec,
//! the mapping table and both dispatch directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::transport::TransportError;

/// Timestamp type used throughout the gateway
pub type Timestamp = DateTime<Utc>;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Largest identifier representable on the bus (29-bit extended)
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Largest standard (11-bit) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Payload length of every frame produced by the encoder
pub const ENCODED_PAYLOAD_LEN: usize = 8;

/// A CAN frame as seen by the gateway
///
/// Received frames carry whatever payload the bus delivered (up to 8 bytes for
/// classic CAN, up to 64 for CAN FD). Frames built by the encoder always carry
/// exactly [`ENCODED_PAYLOAD_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// CAN identifier (11-bit or 29-bit)
    pub id: u32,
    /// True if this frame uses an extended (29-bit) identifier
    pub extended: bool,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame, picking the extended format when the id does not fit 11 bits
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            extended: id > MAX_STANDARD_ID,
            data: data.into(),
        }
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X} [", self.id)?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

/// Value type carried by a mapped frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// 32-bit unsigned little-endian integer at bytes [0, 4)
    #[serde(rename = "uint")]
    UInt,
    /// 32-bit signed little-endian integer at bytes [0, 4)
    #[serde(rename = "int")]
    Int,
    /// 32-bit IEEE-754 little-endian float at bytes [0, 4)
    #[serde(rename = "float")]
    Float,
    /// Three little-endian floats at byte offsets 0, 4 and 8 (decode only)
    #[serde(rename = "xyz-float")]
    XyzFloat,
}

impl ValueType {
    /// Configuration name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::UInt => "uint",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::XyzFloat => "xyz-float",
        }
    }

    /// True if values of this type can be written into an outgoing frame
    pub fn is_encodable(&self) -> bool {
        !matches!(self, ValueType::XyzFloat)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint" => Ok(ValueType::UInt),
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "xyz-float" => Ok(ValueType::XyzFloat),
            other => Err(GatewayError::Config(format!("Unknown value type: {:?}", other))),
        }
    }
}

/// A value decoded from an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    UInt(u32),
    Int(i32),
    Float(f32),
    Xyz { x: f32, y: f32, z: f32 },
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::UInt(v) => write!(f, "{}", v),
            DecodedValue::Int(v) => write!(f, "{}", v),
            DecodedValue::Float(v) => write!(f, "{}", v),
            DecodedValue::Xyz { x, y, z } => write!(f, "{{x: {}, y: {}, z: {}}}", x, y, z),
        }
    }
}

/// A scalar read from the pub/sub source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl Scalar {
    /// Numeric view of the scalar, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{:?}", v),
            Scalar::Null => write!(f, "null"),
        }
    }
}

/// A value delivered to an outbound subscription
///
/// Sources either deliver the scalar directly or wrap it in an envelope
/// object carrying a `value` field. Only the inner scalar is ever encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundValue {
    Bare(Scalar),
    Envelope {
        #[serde(default)]
        value: Option<Scalar>,
    },
}

impl OutboundValue {
    /// The scalar to encode (None if an envelope carries no value)
    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            OutboundValue::Bare(scalar) => Some(scalar),
            OutboundValue::Envelope { value } => value.as_ref(),
        }
    }

    /// Wrap a scalar in an envelope
    pub fn envelope(value: impl Into<Scalar>) -> Self {
        OutboundValue::Envelope {
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for OutboundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scalar() {
            Some(scalar) => write!(f, "{}", scalar),
            None => write!(f, "{{}}"),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Number(v as f64)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Number(v as f64)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Number(v as f64)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<Scalar> for OutboundValue {
    fn from(v: Scalar) -> Self {
        OutboundValue::Bare(v)
    }
}

macro_rules! bare_outbound_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for OutboundValue {
                fn from(v: $t) -> Self {
                    OutboundValue::Bare(Scalar::from(v))
                }
            }
        )*
    };
}

bare_outbound_from!(f64, f32, u32, i32, bool, &str);

/// Reasons a payload cannot be decoded or a value cannot be encoded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("payload too short: need {needed} bytes, have {available}")]
    PayloadTooShort { needed: usize, available: usize },

    #[error("type {0} is not supported in this direction")]
    UnsupportedType(ValueType),

    #[error("value {0} is not numeric")]
    NotNumeric(Scalar),

    #[error("value {value} is out of range for {value_type}")]
    OutOfRange { value: f64, value_type: ValueType },

    #[error("value envelope has no inner value")]
    MissingValue,
}

/// Errors that can occur in the gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid CAN identifier {0:?}: expected base-16 text")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to decode frame 0x{can_id:X} as {value_type}: {source}")]
    Decode {
        can_id: u32,
        value_type: ValueType,
        #[source]
        source: CodecError,
    },

    #[error("Failed to encode value for 0x{can_id:X} as {value_type}: {source}")]
    Encode {
        can_id: u32,
        value_type: ValueType,
        #[source]
        source: CodecError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
