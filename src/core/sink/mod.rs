//! Upload sinks for completed records
//!
//! A sink is an append-only key/value store. Every completed cycle becomes one
//! entry keyed by its completion timestamp; an upload never replaces an
//! existing key.

mod file;
mod http;

pub use file::JsonLinesSink;
pub use http::RealtimeDbSink;

use crate::config::{SinkBackend, SinkConfig};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Format of record keys; only characters a realtime database accepts in keys
pub const KEY_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f";

/// Errors raised by upload sinks and notifiers
#[derive(Error, Debug)]
pub enum SinkError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server rejected request with status {status}")]
    Rejected {
        /// HTTP status code
        status: u16,
    },

    /// Local file failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The call did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// One stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Timestamp-derived unique key
    pub key: String,
    /// `cycle_total;cycle_reset;tension_force;tension_current;crimp_current;`
    pub value: String,
}

/// Append-only destination for completed records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Add one entry
    async fn upload(&self, key: &str, value: &str) -> Result<(), SinkError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Sink that accepts and drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl UploadSink for NullSink {
    async fn upload(&self, _key: &str, _value: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Produces unique record keys from completion timestamps
#[derive(Debug, Default)]
pub struct RecordKeys {
    last: Option<String>,
    repeats: u32,
}

impl RecordKeys {
    /// Create a generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a record completed at `at`, suffixed if the timestamp repeats
    pub fn next(&mut self, at: DateTime<Local>) -> String {
        let base = at.format(KEY_FORMAT).to_string();
        if self.last.as_deref() == Some(base.as_str()) {
            self.repeats += 1;
            return format!("{}-{}", base, self.repeats);
        }
        self.last = Some(base.clone());
        self.repeats = 0;
        base
    }
}

/// Build the sink selected in the configuration
pub fn from_config(config: &SinkConfig) -> Result<Box<dyn UploadSink>, SinkError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match &config.backend {
        SinkBackend::File { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => crate::config::default_store_path().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "could not determine data directory",
                    )
                })?,
            };
            Box::new(JsonLinesSink::new(path))
        }
        SinkBackend::RealtimeDb {
            url,
            path,
            auth_token,
        } => Box::new(RealtimeDbSink::new(url, path, auth_token.clone(), timeout)?),
        SinkBackend::None => Box::new(NullSink),
    })
}
