//! Per-cycle log record

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tool phase incoming current readings belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToolMode {
    /// No phase announced yet; current readings are dropped
    #[default]
    Idle,
    /// Strap is being tensioned
    Tensioning,
    /// Seal is being crimped
    Crimping,
}

/// Accumulator for one test cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Lifetime cycle counter reported by the PLC
    pub cycle_total: u64,
    /// Cycle counter since the last manual reset
    pub cycle_reset: u64,
    /// Peak tensioning force [N]
    pub tension_force: f64,
    /// Peak current while tensioning [A]
    pub tension_current: f64,
    /// Peak current while crimping [A]
    pub crimp_current: f64,
    /// Active tool phase
    pub tool_mode: ToolMode,
    /// When this record was opened
    pub opened_at: DateTime<Local>,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRecord {
    /// Empty record: all numbers zero, tool idle
    pub fn new() -> Self {
        Self {
            cycle_total: 0,
            cycle_reset: 0,
            tension_force: 0.0,
            tension_current: 0.0,
            crimp_current: 0.0,
            tool_mode: ToolMode::Idle,
            opened_at: Local::now(),
        }
    }

    /// Return to the empty state and restart the clock
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Switch tool phase. Entering one phase leaves the other.
    pub fn set_tool_mode(&mut self, mode: ToolMode) {
        self.tool_mode = mode;
    }

    /// Attribute a peak current to the active phase.
    ///
    /// Returns `false` when the tool is idle and the reading was dropped.
    pub fn attribute_current(&mut self, amps: f64) -> bool {
        match self.tool_mode {
            ToolMode::Tensioning => self.tension_current = amps,
            ToolMode::Crimping => self.crimp_current = amps,
            ToolMode::Idle => return false,
        }
        true
    }

    /// Whether this is the placeholder record that exists before any cycle was seen
    pub fn is_unnumbered(&self) -> bool {
        self.cycle_total == 0
    }

    /// Store value: `cycle_total;cycle_reset;tension_force;tension_current;crimp_current;`
    pub fn upload_value(&self) -> String {
        format!(
            "{};{};{};{};{};",
            self.cycle_total,
            self.cycle_reset,
            self.tension_force,
            self.tension_current,
            self.crimp_current
        )
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LOG")?;
        writeln!(f, "  start time:         {}", self.opened_at.format("%d/%m/%Y %H:%M:%S"))?;
        writeln!(f, "  cycle count total:  {}", self.cycle_total)?;
        writeln!(f, "  cycle count reset:  {}", self.cycle_reset)?;
        writeln!(f, "  tensioning force:   {}N", self.tension_force)?;
        writeln!(f, "  tensioning current: {}A", self.tension_current)?;
        write!(f, "  crimping current:   {}A", self.crimp_current)
    }
}

/// Read-only snapshot handed to the upload sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedRecord {
    /// Record state immediately before reset
    pub record: LogRecord,
    /// When the closing `CYCLE_TOTAL` arrived
    pub completed_at: DateTime<Local>,
}

impl CompletedRecord {
    /// Store value of the snapshot
    pub fn upload_value(&self) -> String {
        self.record.upload_value()
    }
}

/// One row of a stored record value, parsed back for export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    /// Store key
    pub key: String,
    /// Cycle counter total
    pub cycle_total: String,
    /// Cycle counter since reset
    pub cycle_reset: String,
    /// Tension force [N]
    pub tension_force: String,
    /// Tension current [A]
    pub tension_current: String,
    /// Crimp current [A]
    pub crimp_current: String,
}

impl RecordRow {
    /// Split a store value; `None` if it has fewer than five fields
    pub fn parse(key: &str, value: &str) -> Option<Self> {
        let mut fields = value.split(';').map(str::trim);
        Some(Self {
            key: key.to_string(),
            cycle_total: fields.next()?.to_string(),
            cycle_reset: fields.next()?.to_string(),
            tension_force: fields.next()?.to_string(),
            tension_current: fields.next()?.to_string(),
            crimp_current: fields.next()?.to_string(),
        })
    }
}
