//! Alert notifications
//!
//! The PLC raises alerts on the `EMAIL` channel. Delivery happens out of band;
//! a failed delivery is logged by the caller and never affects logging.

mod webhook;

pub use webhook::WebhookNotifier;

use crate::config::{NotifierBackend, NotifyConfig};
use crate::core::sink::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Named alert events the rig can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEvent {
    /// Rig was in automatic mode but no tool cycle completed within 60 seconds
    MachineStopped,
    /// Operator pressed the notification button
    ButtonPushed,
}

impl AlertEvent {
    /// Map a protocol field name to an event
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "MACHINE_STOPPED" => Some(Self::MachineStopped),
            "BUTTON_PUSHED" => Some(Self::ButtonPushed),
            _ => None,
        }
    }

    /// Protocol field name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MachineStopped => "MACHINE_STOPPED",
            Self::ButtonPushed => "BUTTON_PUSHED",
        }
    }

    /// Notification subject line
    pub fn subject(&self) -> &'static str {
        match self {
            Self::MachineStopped => "Endurance test rig has stopped",
            Self::ButtonPushed => "Someone pushed the rig button",
        }
    }

    /// Notification body, stamped with the time the event was received
    pub fn body(&self, at: DateTime<Local>) -> String {
        let date = at.format("%d/%m/%Y");
        let time = at.format("%H:%M");
        match self {
            Self::MachineStopped => format!(
                "The endurance test rig stopped on {date} at {time}.\n\
                 Although the rig was in automatic mode, no tool cycle completed \
                 successfully within 60 seconds.\n\
                 Possible causes:\n\
                 - strap empty\n\
                 - tool fault\n\
                 - test rig fault\n\
                 - controller fault\n"
            ),
            Self::ButtonPushed => format!(
                "Someone pushed the rig button on {date} at {time}.\n"
            ),
        }
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for alert events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event
    async fn notify(&self, event: AlertEvent, at: DateTime<Local>) -> Result<(), SinkError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Notifier that only writes the alert to the application log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: AlertEvent, at: DateTime<Local>) -> Result<(), SinkError> {
        warn!(
            event = %event,
            subject = event.subject(),
            at = %at.format("%Y-%m-%d %H:%M:%S"),
            "rig alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the notifier selected in the configuration
pub fn from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>, SinkError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match &config.backend {
        NotifierBackend::Log => Box::new(LogNotifier),
        NotifierBackend::Webhook { url } => Box::new(WebhookNotifier::new(url, timeout)?),
    })
}
