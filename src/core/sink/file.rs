//! Local JSON-lines record store

use super::{SinkError, StoredRecord, UploadSink};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Appends one JSON object per record to a file
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// Store records at `path`; the file and its directory are created on first upload
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every record back, in file order. Unparseable lines are skipped.
    pub fn load(path: &Path) -> Result<Vec<StoredRecord>, SinkError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "skipping corrupt store entry"),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl UploadSink for JsonLinesSink {
    async fn upload(&self, key: &str, value: &str) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entry = StoredRecord {
            key: key.to_string(),
            value: value.to_string(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
