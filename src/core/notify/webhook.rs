//! HTTP webhook notifier

use super::{AlertEvent, Notifier};
use crate::core::sink::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: AlertEvent,
    subject: &'a str,
    body: String,
    timestamp: DateTime<Local>,
}

/// Posts alerts as JSON to a webhook (chat bridge, mail relay, ...)
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`; every request is bounded by `timeout`
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: AlertEvent, at: DateTime<Local>) -> Result<(), SinkError> {
        let payload = WebhookPayload {
            event,
            subject: event.subject(),
            body: event.body(at),
            timestamp: at,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(event = %event, url = %self.url, "webhook delivered");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
