//! Rig line protocol
//!
//! Both devices emit semicolon-delimited text frames:
//!
//! ```text
//! LOG;CYCLE_TOTAL;<int>;      LOG;START_TENSION;
//! LOG;CYCLE_RESET;<int>;      LOG;START_CRIMP;
//! LOG;FORCE_TENSION;<num>;    LOG;CURRENT_MAX;<num>;
//! EMAIL;MACHINE_STOPPED;      EMAIL;BUTTON_PUSHED;
//! ```
//!
//! Firmware terminates every frame with `;` so trailing empty fields are
//! dropped before interpretation. Fields beyond what a variant needs are
//! ignored.

use crate::core::notify::AlertEvent;
use std::str::FromStr;
use thiserror::Error;

/// Channel tag for record fields
pub const CHANNEL_LOG: &str = "LOG";
/// Channel tag for alerts
pub const CHANNEL_EMAIL: &str = "EMAIL";

/// Reasons a line is discarded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Blank line
    #[error("Empty line")]
    Empty,

    /// First field is not a known channel
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Channel without a field name
    #[error("Missing field name after channel {0}")]
    MissingField(String),

    /// Field not known to this version
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Field requires a value but none was sent
    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    /// Value could not be parsed
    #[error("Invalid value `{value}` for {field}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Raw value text
        value: String,
    },
}

/// Record-affecting events from the `LOG` channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogEvent {
    /// Lifetime cycle counter; closes the current record
    CycleTotal(u64),
    /// Counter since last manual reset
    CycleReset(u64),
    /// Peak tensioning force in newtons
    ForceTension(f64),
    /// Tool entered tensioning
    StartTension,
    /// Tool entered crimping
    StartCrimp,
    /// Peak motor current in amperes for the active tool phase
    CurrentMax(f64),
}

/// One decoded device line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigMessage {
    /// `LOG` channel
    Log(LogEvent),
    /// `EMAIL` channel
    Alert(AlertEvent),
}

impl FromStr for RigMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields: Vec<&str> = line.trim().split(';').map(str::trim).collect();
        while fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }

        let (&channel, rest) = fields.split_first().ok_or(ProtocolError::Empty)?;
        if channel != CHANNEL_LOG && channel != CHANNEL_EMAIL {
            return Err(ProtocolError::UnknownChannel(channel.to_string()));
        }

        let field = *rest
            .first()
            .ok_or_else(|| ProtocolError::MissingField(channel.to_string()))?;
        let value = rest.get(1).copied();

        if channel == CHANNEL_LOG {
            parse_log(field, value).map(Self::Log)
        } else {
            AlertEvent::from_field(field)
                .map(Self::Alert)
                .ok_or_else(|| ProtocolError::UnknownField(field.to_string()))
        }
    }
}

fn parse_log(field: &str, value: Option<&str>) -> Result<LogEvent, ProtocolError> {
    match field {
        "CYCLE_TOTAL" => parse_count("CYCLE_TOTAL", value).map(LogEvent::CycleTotal),
        "CYCLE_RESET" => parse_count("CYCLE_RESET", value).map(LogEvent::CycleReset),
        "FORCE_TENSION" => parse_measurement("FORCE_TENSION", value).map(LogEvent::ForceTension),
        "CURRENT_MAX" => parse_measurement("CURRENT_MAX", value).map(LogEvent::CurrentMax),
        "START_TENSION" => Ok(LogEvent::StartTension),
        "START_CRIMP" => Ok(LogEvent::StartCrimp),
        other => Err(ProtocolError::UnknownField(other.to_string())),
    }
}

fn parse_count(field: &'static str, value: Option<&str>) -> Result<u64, ProtocolError> {
    let raw = value.ok_or(ProtocolError::MissingValue(field))?;
    raw.parse().map_err(|_| ProtocolError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn parse_measurement(field: &'static str, value: Option<&str>) -> Result<f64, ProtocolError> {
    let raw = value.ok_or(ProtocolError::MissingValue(field))?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProtocolError::InvalidValue {
            field,
            value: raw.to_string(),
        })
}
