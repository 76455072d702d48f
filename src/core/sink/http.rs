//! Realtime database sink (REST)
//!
//! Uses `PATCH {url}/{path}.json` so each upload merges one new key into the
//! collection without touching existing ones.

use super::{SinkError, UploadSink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Uploads records to a realtime database over its REST interface
pub struct RealtimeDbSink {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl RealtimeDbSink {
    /// Create a sink for the collection `path` under database `url`
    pub fn new(
        url: &str,
        path: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint(url, path),
            auth_token,
        })
    }

    /// Resolved collection URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint(url: &str, path: &str) -> String {
    let base = url.trim_end_matches('/');
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("{base}/.json")
    } else {
        format!("{base}/{path}.json")
    }
}

#[async_trait]
impl UploadSink for RealtimeDbSink {
    async fn upload(&self, key: &str, value: &str) -> Result<(), SinkError> {
        let body: HashMap<&str, &str> = HashMap::from([(key, value)]);

        let mut request = self.client.patch(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.query(&[("auth", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(key, endpoint = %self.endpoint, "record merged");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "realtime_db"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_path() {
        assert_eq!(
            endpoint("https://rig.example.com/", "/logs/"),
            "https://rig.example.com/logs.json"
        );
        assert_eq!(endpoint("https://rig.example.com", ""), "https://rig.example.com/.json");
    }
}
