//! Poll loop
//!
//! Drives both device links at a fixed cadence, feeds every received line to
//! the [`Aggregator`] and carries out the effects it returns. Lines of one
//! poll are processed in device order (PLC first), then arrival order.

use crate::config::AppConfig;
use crate::core::aggregator::{Aggregator, AggregatorStats, Effect};
use crate::core::device::{DeviceLink, DeviceLocator, DeviceRole, LinkStatus};
use crate::core::notify::Notifier;
use crate::core::sink::{RecordKeys, SinkError, UploadSink};
use crate::core::transport::{SerialBackend, SerialConfig, TransportError};
use chrono::Local;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Timing knobs of the poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Poll cadence
    pub interval: Duration,
    /// Pause after a failed poll cycle
    pub fault_backoff: Duration,
    /// Lines drained per device per poll
    pub max_lines_per_poll: usize,
    /// Upper bound for one upload
    pub sink_timeout: Duration,
    /// Upper bound for one alert delivery
    pub notify_timeout: Duration,
}

impl ManagerSettings {
    /// Settings from the application config
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: config.poll.interval(),
            fault_backoff: config.poll.fault_backoff(),
            max_lines_per_poll: config.poll.max_lines_per_poll.max(1),
            sink_timeout: Duration::from_secs(config.sink.timeout_secs),
            notify_timeout: Duration::from_secs(config.notify.timeout_secs),
        }
    }
}

/// Owns the device links, the aggregator and the outbound sinks
pub struct LogManager<B: SerialBackend> {
    backend: B,
    serial: SerialConfig,
    links: Vec<DeviceLink>,
    last_status: Vec<LinkStatus>,
    aggregator: Aggregator,
    sink: Box<dyn UploadSink>,
    notifier: Box<dyn Notifier>,
    keys: RecordKeys,
    settings: ManagerSettings,
}

impl<B: SerialBackend> LogManager<B> {
    /// Create a manager with both links unresolved
    pub fn new(
        backend: B,
        config: &AppConfig,
        sink: Box<dyn UploadSink>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let links: Vec<DeviceLink> = DeviceRole::all()
            .iter()
            .map(|&role| DeviceLink::new(role, config.devices.identity(role)))
            .collect();
        let last_status = links.iter().map(DeviceLink::status).collect();

        Self {
            backend,
            serial: config.serial.clone(),
            links,
            last_status,
            aggregator: Aggregator::new(),
            sink,
            notifier,
            keys: RecordKeys::new(),
            settings: ManagerSettings::from_config(config),
        }
    }

    /// Replace the timing settings
    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current link states, PLC first
    pub fn link_status(&self) -> Vec<LinkStatus> {
        self.links.iter().map(DeviceLink::status).collect()
    }

    /// Aggregator counters
    pub fn stats(&self) -> AggregatorStats {
        self.aggregator.stats()
    }

    /// Aggregator, for inspection
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Log every attached serial interface
    pub fn log_port_listing(&self) {
        match DeviceLocator::new(&self.backend).list() {
            Ok(ports) if ports.is_empty() => info!("No serial interfaces attached"),
            Ok(ports) => {
                for port in ports {
                    info!(
                        port = %port.name,
                        kind = %port.kind,
                        vid = ?port.vid,
                        pid = ?port.pid,
                        product = ?port.product,
                        "serial interface"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Could not list serial interfaces"),
        }
    }

    /// Run one poll cycle.
    ///
    /// Returns the number of lines processed. Blank frames are skipped. An
    /// enumeration failure only affects the link being located; the other
    /// link is still read and the failure is returned afterwards.
    pub async fn poll_once(&mut self) -> Result<usize, TransportError> {
        let mut pending: Vec<(DeviceRole, String)> = Vec::new();
        let mut fault = None;

        {
            let locator = DeviceLocator::new(&self.backend);
            for link in &mut self.links {
                match link.ensure_located(&locator) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        fault = Some(e);
                        continue;
                    }
                }
                if !link.ensure_connected(&self.backend, &self.serial) {
                    continue;
                }
                for _ in 0..self.settings.max_lines_per_poll {
                    match link.read_line() {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => pending.push((link.role(), line)),
                        None => break,
                    }
                }
            }
        }

        let processed = pending.len();
        for (role, line) in pending {
            if let Some(effect) = self.aggregator.handle_line(role, &line) {
                self.dispatch(effect).await;
            }
        }
        self.report_status_changes();

        match fault {
            Some(e) => Err(e),
            None => Ok(processed),
        }
    }

    /// Carry out one aggregator effect.
    ///
    /// Failures are logged and dropped; the loop never waits past the
    /// configured timeout.
    pub async fn dispatch(&mut self, effect: Effect) {
        match effect {
            Effect::Upload(completed) => {
                let key = self.keys.next(completed.completed_at);
                let value = completed.upload_value();
                let sink = self.sink.name();
                let limit = self.settings.sink_timeout;
                let outcome = timeout(limit, self.sink.upload(&key, &value))
                    .await
                    .unwrap_or(Err(SinkError::Timeout(limit)));
                match outcome {
                    Ok(()) => info!(sink, key = %key, value = %value, "record uploaded"),
                    Err(e) => error!(sink, key = %key, value = %value, error = %e, "upload failed, record dropped"),
                }
            }
            Effect::Notify(event) => {
                let notifier = self.notifier.name();
                let limit = self.settings.notify_timeout;
                let outcome = timeout(limit, self.notifier.notify(event, Local::now()))
                    .await
                    .unwrap_or(Err(SinkError::Timeout(limit)));
                match outcome {
                    Ok(()) => info!(notifier, event = %event, "alert delivered"),
                    Err(e) => error!(notifier, event = %event, error = %e, "alert delivery failed"),
                }
            }
        }
    }

    fn report_status_changes(&mut self) {
        for (link, last) in self.links.iter().zip(self.last_status.iter_mut()) {
            let status = link.status();
            if status != *last {
                info!(resets = status.resets, "link {}", status);
                *last = status;
            }
        }
    }

    /// Poll until `shutdown` resolves.
    ///
    /// A poll cycle in progress always runs to completion before shutdown is
    /// observed.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.settings.interval, "Log manager started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(lines) if lines > 0 => debug!(lines, "poll cycle done"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, backoff = ?self.settings.fault_backoff, "Poll cycle failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.settings.fault_backoff) => {}
                    }
                    ticker.reset();
                }
            }
        }

        let stats = self.aggregator.stats();
        info!(
            lines = stats.lines,
            discarded = stats.discarded,
            completed = stats.completed,
            suppressed = stats.suppressed,
            alerts = stats.alerts,
            "Log manager stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::{AlertEvent, MockNotifier};
    use crate::core::sink::MockUploadSink;
    use crate::core::transport::{MockSerialBackend, MockSerialLine, PortInfo, SerialLine};
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::collections::VecDeque;

    const PLC_PORT: &str = "/dev/ttyUSB0";
    const LOGGER_PORT: &str = "/dev/ttyACM0";

    /// Line source replaying `script`; `None` entries end a poll's batch
    fn scripted(script: &[Option<&str>]) -> Box<dyn SerialLine> {
        let mut queue: VecDeque<Option<String>> =
            script.iter().map(|l| l.map(str::to_string)).collect();
        let mut line = MockSerialLine::new();
        line.expect_read_line()
            .returning(move || Ok(queue.pop_front().flatten()));
        Box::new(line)
    }

    fn both_ports() -> Vec<PortInfo> {
        vec![
            PortInfo::usb(PLC_PORT, 1659, 8963),
            PortInfo::usb(LOGGER_PORT, 1027, 24577),
        ]
    }

    fn backend_with(plc: Box<dyn SerialLine>, logger: Box<dyn SerialLine>) -> MockSerialBackend {
        let mut backend = MockSerialBackend::new();
        backend.expect_available_ports().returning(|| Ok(both_ports()));
        backend
            .expect_open()
            .withf(|path, _| path.to_string() == PLC_PORT)
            .times(1)
            .return_once(move |_, _| Ok(plc));
        backend
            .expect_open()
            .withf(|path, _| path.to_string() == LOGGER_PORT)
            .times(1)
            .return_once(move |_, _| Ok(logger));
        backend
    }

    fn quiet_notifier() -> Box<dyn Notifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        notifier.expect_name().return_const("mock");
        Box::new(notifier)
    }

    #[tokio::test]
    async fn test_full_cycle_uploads_once() {
        let plc = scripted(&[
            Some("LOG;CYCLE_TOTAL;41;"),
            Some("LOG;CYCLE_RESET;3;"),
            Some("LOG;FORCE_TENSION;812.5;"),
            Some("LOG;START_TENSION;"),
            None,
            Some("LOG;START_CRIMP;"),
            None,
            Some("LOG;CYCLE_TOTAL;42;"),
            None,
        ]);
        let logger = scripted(&[
            Some("LOG;CURRENT_MAX;4.2;"),
            None,
            Some("LOG;CURRENT_MAX;6.1;"),
            None,
            None,
        ]);

        let mut sink = MockUploadSink::new();
        sink.expect_upload()
            .withf(|_, value| value.to_string() == "41;3;812.5;4.2;6.1;")
            .times(1)
            .returning(|_, _| Ok(()));
        sink.expect_name().return_const("mock");

        let mut manager = LogManager::new(
            backend_with(plc, logger),
            &AppConfig::default(),
            Box::new(sink),
            quiet_notifier(),
        );

        assert_eq!(manager.poll_once().await.unwrap(), 5);
        assert_eq!(manager.poll_once().await.unwrap(), 2);
        assert_eq!(manager.poll_once().await.unwrap(), 1);

        let stats = manager.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(manager.aggregator().record().cycle_total, 42);
        assert!(manager.link_status().iter().all(|s| s.connected));
    }

    #[tokio::test]
    async fn test_alert_is_forwarded() {
        let plc = scripted(&[Some("EMAIL;MACHINE_STOPPED;"), Some("EMAIL;SELF_DESTRUCT;")]);
        let logger = scripted(&[]);

        let mut sink = MockUploadSink::new();
        sink.expect_upload().never();
        sink.expect_name().return_const("mock");

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|event, _| *event == AlertEvent::MachineStopped)
            .times(1)
            .returning(|_, _| Ok(()));
        notifier.expect_name().return_const("mock");

        let mut manager = LogManager::new(
            backend_with(plc, logger),
            &AppConfig::default(),
            Box::new(sink),
            Box::new(notifier),
        );

        assert_eq!(manager.poll_once().await.unwrap(), 2);
        assert_eq!(manager.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_stall() {
        let plc = scripted(&[
            Some("LOG;CYCLE_TOTAL;7;"),
            Some("LOG;CYCLE_TOTAL;8;"),
            Some("LOG;CYCLE_TOTAL;9;"),
        ]);
        let logger = scripted(&[]);

        let mut sink = MockUploadSink::new();
        sink.expect_upload()
            .times(2)
            .returning(|_, _| Err(SinkError::Rejected { status: 503 }));
        sink.expect_name().return_const("mock");

        let mut manager = LogManager::new(
            backend_with(plc, logger),
            &AppConfig::default(),
            Box::new(sink),
            quiet_notifier(),
        );

        assert_eq!(manager.poll_once().await.unwrap(), 3);
        assert_eq!(manager.aggregator().record().cycle_total, 9);
    }

    struct StalledSink;

    #[async_trait]
    impl UploadSink for StalledSink {
        async fn upload(&self, _key: &str, _value: &str) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_stalled_upload_times_out() {
        let plc = scripted(&[Some("LOG;CYCLE_TOTAL;7;"), Some("LOG;CYCLE_TOTAL;8;")]);
        let logger = scripted(&[]);

        let config = AppConfig::default();
        let settings = ManagerSettings {
            sink_timeout: Duration::from_millis(20),
            ..ManagerSettings::from_config(&config)
        };
        let mut manager = LogManager::new(
            backend_with(plc, logger),
            &config,
            Box::new(StalledSink),
            quiet_notifier(),
        )
        .with_settings(settings);

        let done = timeout(Duration::from_secs(5), manager.poll_once()).await;
        assert_eq!(done.unwrap().unwrap(), 2);
        assert_eq!(manager.aggregator().record().cycle_total, 8);
    }

    #[tokio::test]
    async fn test_enumeration_failure_then_recovery() {
        let mut backend = MockSerialBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_available_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(TransportError::EnumerationFailed("udev gone".into())));
        backend
            .expect_available_ports()
            .returning(|| Ok(vec![PortInfo::usb(PLC_PORT, 1659, 8963)]));
        let plc = scripted(&[Some("LOG;START_TENSION;")]);
        backend
            .expect_open()
            .withf(|path, _| path.to_string() == PLC_PORT)
            .times(1)
            .return_once(move |_, _| Ok(plc));

        let mut sink = MockUploadSink::new();
        sink.expect_upload().never();
        sink.expect_name().return_const("mock");

        let mut manager =
            LogManager::new(backend, &AppConfig::default(), Box::new(sink), quiet_notifier());

        assert!(manager.poll_once().await.is_err());
        assert_eq!(manager.poll_once().await.unwrap(), 1);

        let status = manager.link_status();
        assert!(status[0].connected);
        assert!(!status[1].available);
    }

    #[tokio::test]
    async fn test_enumeration_failure_keeps_connected_link_reading() {
        let mut backend = MockSerialBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_available_ports()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![PortInfo::usb(LOGGER_PORT, 1027, 24577)]));
        backend
            .expect_available_ports()
            .in_sequence(&mut seq)
            .returning(|| Err(TransportError::EnumerationFailed("udev".into())));
        let logger = scripted(&[None, Some("LOG;CURRENT_MAX;5;"), None]);
        backend
            .expect_open()
            .withf(|path, _| path.to_string() == LOGGER_PORT)
            .times(1)
            .return_once(move |_, _| Ok(logger));

        let mut sink = MockUploadSink::new();
        sink.expect_upload().never();
        sink.expect_name().return_const("mock");

        let mut manager =
            LogManager::new(backend, &AppConfig::default(), Box::new(sink), quiet_notifier());

        assert_eq!(manager.poll_once().await.unwrap(), 0);
        assert!(manager.poll_once().await.is_err());
        assert_eq!(manager.stats().lines, 1);

        let status = manager.link_status();
        assert!(!status[0].available);
        assert!(status[1].connected);
    }

    #[tokio::test]
    async fn test_blank_frames_are_skipped() {
        let plc = scripted(&[Some(""), Some("  "), Some("LOG;START_TENSION;"), None]);
        let logger = scripted(&[]);

        let mut sink = MockUploadSink::new();
        sink.expect_name().return_const("mock");

        let mut manager = LogManager::new(
            backend_with(plc, logger),
            &AppConfig::default(),
            Box::new(sink),
            quiet_notifier(),
        );

        assert_eq!(manager.poll_once().await.unwrap(), 1);
        let stats = manager.stats();
        assert_eq!(stats.lines, 1);
        assert_eq!(stats.discarded, 0);
    }

    #[tokio::test]
    async fn test_drain_is_capped_per_poll() {
        let plc = scripted(&[
            Some("LOG;CYCLE_RESET;1;"),
            Some("LOG;CYCLE_RESET;2;"),
            Some("LOG;CYCLE_RESET;3;"),
        ]);
        let logger = scripted(&[]);

        let mut sink = MockUploadSink::new();
        sink.expect_name().return_const("mock");

        let config = AppConfig::default();
        let settings = ManagerSettings {
            max_lines_per_poll: 2,
            ..ManagerSettings::from_config(&config)
        };
        let mut manager =
            LogManager::new(backend_with(plc, logger), &config, Box::new(sink), quiet_notifier())
                .with_settings(settings);

        assert_eq!(manager.poll_once().await.unwrap(), 2);
        assert_eq!(manager.aggregator().record().cycle_reset, 2);
        assert_eq!(manager.poll_once().await.unwrap(), 1);
        assert_eq!(manager.aggregator().record().cycle_reset, 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut backend = MockSerialBackend::new();
        backend.expect_available_ports().returning(|| Ok(vec![]));

        let mut sink = MockUploadSink::new();
        sink.expect_name().return_const("mock");

        let mut manager =
            LogManager::new(backend, &AppConfig::default(), Box::new(sink), quiet_notifier());

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        timeout(Duration::from_secs(5), manager.run(shutdown))
            .await
            .unwrap();
        assert_eq!(manager.stats().lines, 0);
    }
}
