//! Cycle aggregation state machine
//!
//! Folds the line streams of both devices into one [`LogRecord`] per test
//! cycle. The only persistent state is the record itself (including its tool
//! mode); cycle completion is edge-triggered by `CYCLE_TOTAL`.
//!
//! The aggregator performs no I/O. Side effects are returned as [`Effect`]s
//! and carried out by the caller.

use crate::core::device::DeviceRole;
use crate::core::notify::AlertEvent;
use crate::core::protocol::{LogEvent, RigMessage};
use crate::core::record::{CompletedRecord, LogRecord, ToolMode};
use chrono::Local;
use tracing::{debug, info, warn};

/// Work the caller must perform after a line was applied
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand a completed record to the upload sink
    Upload(CompletedRecord),
    /// Forward an alert to the notifier
    Notify(AlertEvent),
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Lines received
    pub lines: u64,
    /// Lines discarded as malformed or unknown
    pub discarded: u64,
    /// Records handed off for upload
    pub completed: u64,
    /// Records closed without upload (unnumbered startup record)
    pub suppressed: u64,
    /// Current readings dropped because the tool was idle
    pub idle_currents: u64,
    /// Alerts forwarded
    pub alerts: u64,
}

/// Owns the in-progress record and applies protocol events to it
#[derive(Debug, Default)]
pub struct Aggregator {
    record: LogRecord,
    stats: AggregatorStats,
}

impl Aggregator {
    /// Start with an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Record being accumulated
    pub fn record(&self) -> &LogRecord {
        &self.record
    }

    /// Diagnostic counters
    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Decode and apply one raw line.
    ///
    /// Malformed and unknown lines are discarded without touching the record.
    pub fn handle_line(&mut self, source: DeviceRole, line: &str) -> Option<Effect> {
        self.stats.lines += 1;
        debug!(device = %source, line, "line received");

        match line.parse::<RigMessage>() {
            Ok(message) => self.apply(message),
            Err(e) => {
                self.stats.discarded += 1;
                debug!(device = %source, line, reason = %e, "line discarded");
                None
            }
        }
    }

    /// Apply an already decoded message
    pub fn apply(&mut self, message: RigMessage) -> Option<Effect> {
        match message {
            RigMessage::Log(event) => self.apply_log(event),
            RigMessage::Alert(event) => {
                self.stats.alerts += 1;
                info!(event = %event, "alert received");
                Some(Effect::Notify(event))
            }
        }
    }

    fn apply_log(&mut self, event: LogEvent) -> Option<Effect> {
        match event {
            LogEvent::CycleTotal(total) => {
                let completed = self.finalize();
                self.record.cycle_total = total;
                return completed.map(Effect::Upload);
            }
            LogEvent::CycleReset(count) => self.record.cycle_reset = count,
            LogEvent::ForceTension(newtons) => self.record.tension_force = newtons,
            LogEvent::StartTension => self.record.set_tool_mode(ToolMode::Tensioning),
            LogEvent::StartCrimp => self.record.set_tool_mode(ToolMode::Crimping),
            LogEvent::CurrentMax(amps) => {
                if !self.record.attribute_current(amps) {
                    self.stats.idle_currents += 1;
                    debug!(amps, "current reading while tool idle, dropped");
                }
            }
        }
        None
    }

    /// Close the current record and open an empty one.
    ///
    /// The closed record is returned for upload unless it never received a
    /// cycle number.
    fn finalize(&mut self) -> Option<CompletedRecord> {
        info!("record completed\n{}", self.record);

        let completed = if self.record.is_unnumbered() {
            self.stats.suppressed += 1;
            if self.stats.completed > 0 {
                warn!("closing record with cycle_total 0, not uploaded");
            } else {
                debug!("startup record not uploaded");
            }
            None
        } else {
            self.stats.completed += 1;
            Some(CompletedRecord {
                record: self.record.clone(),
                completed_at: Local::now(),
            })
        };

        self.record.reset();
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLC: DeviceRole = DeviceRole::Controllino;
    const LOGGER: DeviceRole = DeviceRole::CurrentLogger;

    fn feed(aggregator: &mut Aggregator, lines: &[&str]) -> Vec<Effect> {
        lines
            .iter()
            .filter_map(|line| aggregator.handle_line(PLC, line))
            .collect()
    }

    #[test]
    fn test_full_cycle_scenario() {
        let mut aggregator = Aggregator::new();
        let effects = feed(
            &mut aggregator,
            &[
                "LOG;CYCLE_TOTAL;1",
                "LOG;START_TENSION",
                "LOG;FORCE_TENSION;1234.5",
                "LOG;CURRENT_MAX;40.2",
                "LOG;START_CRIMP",
                "LOG;CURRENT_MAX;55.1",
                "LOG;CYCLE_TOTAL;2",
            ],
        );

        assert_eq!(effects.len(), 1);
        let Effect::Upload(done) = &effects[0] else {
            panic!("expected upload, got {:?}", effects[0]);
        };
        assert_eq!(done.record.cycle_total, 1);
        assert_eq!(done.record.tension_force, 1234.5);
        assert_eq!(done.record.tension_current, 40.2);
        assert_eq!(done.record.crimp_current, 55.1);

        let record = aggregator.record();
        assert_eq!(record.cycle_total, 2);
        assert_eq!(record.tension_force, 0.0);
        assert_eq!(record.tension_current, 0.0);
        assert_eq!(record.crimp_current, 0.0);
        assert_eq!(record.tool_mode, ToolMode::Idle);
    }

    #[test]
    fn test_startup_record_is_not_uploaded() {
        let mut aggregator = Aggregator::new();
        aggregator.handle_line(PLC, "LOG;CYCLE_RESET;4");

        assert_eq!(aggregator.handle_line(PLC, "LOG;CYCLE_TOTAL;17;"), None);
        assert_eq!(aggregator.record().cycle_total, 17);
        assert_eq!(aggregator.record().cycle_reset, 0);
        assert_eq!(aggregator.stats().suppressed, 1);
        assert_eq!(aggregator.stats().completed, 0);
    }

    #[test]
    fn test_snapshot_equals_state_before_reset() {
        let mut aggregator = Aggregator::new();
        feed(
            &mut aggregator,
            &["LOG;CYCLE_TOTAL;5", "LOG;CYCLE_RESET;2", "LOG;START_CRIMP", "LOG;CURRENT_MAX;33.3"],
        );
        let before = aggregator.record().clone();

        let effect = aggregator.handle_line(PLC, "LOG;CYCLE_TOTAL;6");
        let Some(Effect::Upload(done)) = effect else {
            panic!("expected upload");
        };
        assert_eq!(done.record, before);
        assert_eq!(done.upload_value(), "5;2;0;0;33.3;");
    }

    #[test]
    fn test_cycle_total_unchanged_without_cycle_event() {
        let mut aggregator = Aggregator::new();
        aggregator.handle_line(PLC, "LOG;CYCLE_TOTAL;12");
        feed(
            &mut aggregator,
            &[
                "LOG;CYCLE_RESET;3",
                "LOG;START_TENSION",
                "LOG;FORCE_TENSION;900",
                "LOG;CURRENT_MAX;20",
                "LOG;START_CRIMP",
                "LOG;CURRENT_MAX;30",
                "LOG;UNKNOWN_FIELD;99",
            ],
        );
        assert_eq!(aggregator.record().cycle_total, 12);
    }

    #[test]
    fn test_start_crimp_after_tension_leaves_crimping() {
        let mut aggregator = Aggregator::new();
        feed(&mut aggregator, &["LOG;START_TENSION", "LOG;START_CRIMP"]);
        assert_eq!(aggregator.record().tool_mode, ToolMode::Crimping);
    }

    #[test]
    fn test_current_while_idle_is_dropped() {
        let mut aggregator = Aggregator::new();
        assert_eq!(aggregator.handle_line(LOGGER, "LOG;CURRENT_MAX;48.5;"), None);
        assert_eq!(aggregator.record().tension_current, 0.0);
        assert_eq!(aggregator.record().crimp_current, 0.0);
        assert_eq!(aggregator.stats().idle_currents, 1);
    }

    #[test]
    fn test_unknown_field_changes_nothing() {
        let mut aggregator = Aggregator::new();
        feed(&mut aggregator, &["LOG;CYCLE_TOTAL;3", "LOG;START_TENSION"]);
        let before = aggregator.record().clone();

        assert_eq!(aggregator.handle_line(PLC, "LOG;UNKNOWN_FIELD;99"), None);
        assert_eq!(aggregator.handle_line(PLC, "LOG;FORCE_TENSION;heavy"), None);
        assert_eq!(aggregator.handle_line(PLC, "garbage"), None);
        assert_eq!(aggregator.record(), &before);
        assert_eq!(aggregator.stats().discarded, 3);
    }

    #[test]
    fn test_alerts_do_not_touch_record() {
        let mut aggregator = Aggregator::new();
        feed(&mut aggregator, &["LOG;CYCLE_TOTAL;3", "LOG;START_TENSION"]);
        let before = aggregator.record().clone();

        assert_eq!(
            aggregator.handle_line(PLC, "EMAIL;MACHINE_STOPPED;"),
            Some(Effect::Notify(AlertEvent::MachineStopped))
        );
        assert_eq!(
            aggregator.handle_line(PLC, "EMAIL;BUTTON_PUSHED;"),
            Some(Effect::Notify(AlertEvent::ButtonPushed))
        );
        assert_eq!(aggregator.record(), &before);
    }

    #[test]
    fn test_zero_cycle_total_after_real_cycles_is_suppressed() {
        let mut aggregator = Aggregator::new();
        feed(&mut aggregator, &["LOG;CYCLE_TOTAL;1", "LOG;CYCLE_TOTAL;0"]);
        assert_eq!(aggregator.handle_line(PLC, "LOG;CYCLE_TOTAL;1"), None);
        assert_eq!(aggregator.stats().completed, 1);
        assert_eq!(aggregator.stats().suppressed, 2);
    }
}
