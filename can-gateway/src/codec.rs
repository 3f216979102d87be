//! Frame codec
//!
//! Converts frame payloads to and from typed values. Every mapped value is
//! little-endian and starts at byte 0; vectors append their components at
//! offsets 4 and 8.

use crate::types::{CodecError, DecodedValue, OutboundValue, Scalar, ValueType, ENCODED_PAYLOAD_LEN};
use byteorder::{ByteOrder, LittleEndian};

/// Width of every scalar field in bytes
const FIELD_LEN: usize = 4;

/// Decode a payload as the given value type
///
/// The payload may be shorter or longer than eight bytes; only the bytes the
/// type needs are read, and a payload that cannot supply them is rejected.
pub fn decode(value_type: ValueType, data: &[u8]) -> Result<DecodedValue, CodecError> {
    match value_type {
        ValueType::UInt => Ok(DecodedValue::UInt(LittleEndian::read_u32(field(data, 0)?))),
        ValueType::Int => Ok(DecodedValue::Int(LittleEndian::read_i32(field(data, 0)?))),
        ValueType::Float => Ok(DecodedValue::Float(LittleEndian::read_f32(field(data, 0)?))),
        ValueType::XyzFloat => Ok(DecodedValue::Xyz {
            x: LittleEndian::read_f32(field(data, 0)?),
            y: LittleEndian::read_f32(field(data, 4)?),
            z: LittleEndian::read_f32(field(data, 8)?),
        }),
    }
}

/// Encode a value into a zero-initialized 8-byte payload
///
/// Envelopes are unwrapped first. Bytes after the encoded field stay zero.
pub fn encode(value_type: ValueType, value: &OutboundValue) -> Result<[u8; ENCODED_PAYLOAD_LEN], CodecError> {
    let scalar = value.scalar().ok_or(CodecError::MissingValue)?;
    let mut payload = [0u8; ENCODED_PAYLOAD_LEN];

    match value_type {
        ValueType::UInt => {
            let v = integral(scalar, value_type, 0.0, u32::MAX as f64)?;
            LittleEndian::write_u32(&mut payload[..FIELD_LEN], v as u32);
        }
        ValueType::Int => {
            let v = integral(scalar, value_type, i32::MIN as f64, i32::MAX as f64)?;
            LittleEndian::write_i32(&mut payload[..FIELD_LEN], v as i32);
        }
        ValueType::Float => {
            let v = numeric(scalar)?;
            LittleEndian::write_f32(&mut payload[..FIELD_LEN], v as f32);
        }
        ValueType::XyzFloat => return Err(CodecError::UnsupportedType(value_type)),
    }

    Ok(payload)
}

/// Borrow the 4-byte field at `offset`, checking it fits the payload
fn field(data: &[u8], offset: usize) -> Result<&[u8], CodecError> {
    let end = offset + FIELD_LEN;
    data.get(offset..end).ok_or(CodecError::PayloadTooShort {
        needed: end,
        available: data.len(),
    })
}

fn numeric(scalar: &Scalar) -> Result<f64, CodecError> {
    scalar
        .as_f64()
        .ok_or_else(|| CodecError::NotNumeric(scalar.clone()))
}

/// Numeric value truncated toward zero, bounded to `[min, max]`
fn integral(scalar: &Scalar, value_type: ValueType, min: f64, max: f64) -> Result<f64, CodecError> {
    let value = numeric(scalar)?;
    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < min || truncated > max {
        return Err(CodecError::OutOfRange { value, value_type });
    }
    Ok(truncated)
}
