//! Line-oriented JSON streams
//!
//! Published updates are written as one delta object per line:
//! `{"updates":[{"$source":"can-gateway","timestamp":"...","values":[{"path":"...","value":...}]}]}`
//!
//! Outbound values are read as one object per line: `{"path":"...","value":...}`.

use anyhow::{Context, Result};
use can_gateway::{DecodedValue, MemoryBus, OutboundValue, Timestamp, Update};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// A delta message carrying one update
#[derive(Debug, Serialize)]
pub struct Delta<'a> {
    pub updates: [DeltaUpdate<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct DeltaUpdate<'a> {
    #[serde(rename = "$source")]
    pub source: &'a str,
    pub timestamp: Timestamp,
    pub values: [PathValue<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct PathValue<'a> {
    pub path: &'a str,
    pub value: DecodedValue,
}

impl<'a> From<&'a Update> for Delta<'a> {
    fn from(update: &'a Update) -> Self {
        Delta {
            updates: [DeltaUpdate {
                source: &update.source,
                timestamp: update.timestamp,
                values: [PathValue {
                    path: &update.path,
                    value: update.value,
                }],
            }],
        }
    }
}

/// Write one update as a delta line
pub fn write_update<W: Write>(out: &mut W, update: &Update) -> Result<()> {
    serde_json::to_writer(&mut *out, &Delta::from(update))?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// One outbound value read from the input stream
#[derive(Debug, Deserialize, PartialEq)]
pub struct ValueLine {
    pub path: String,
    pub value: OutboundValue,
}

/// Parse one input line; blank lines yield `None`
pub fn parse_value_line(line: &str) -> Result<Option<ValueLine>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(trimmed).context("Expected {\"path\": ..., \"value\": ...}")?;
    Ok(Some(value))
}

/// Feed every line of `input` into the bus until EOF
pub fn read_values<R: BufRead>(input: R, bus: &MemoryBus) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                break;
            }
        };

        match parse_value_line(&line) {
            Ok(Some(ValueLine { path, value })) => {
                let delivered = bus.publish_value(&path, value);
                log::debug!("Input for {} delivered to {} subscription(s)", path, delivered);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring input line {:?}: {:#}", line, e),
        }
    }
    log::debug!("Input stream closed");
}
