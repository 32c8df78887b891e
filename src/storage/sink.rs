//! Downstream sinks for accepted items

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::models::ScoredItem;
use crate::utils::error::SinkError;

/// Shared sink handle
pub type SharedRecordSink = Arc<dyn RecordSink>;

/// Receives every accepted item exactly once per run
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, item: &ScoredItem) -> Result<(), SinkError>;

    /// Push buffered records to durable storage
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Appends one JSON object per line
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<tokio::fs::File>>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories as needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(path = %path.display(), "JSONL sink opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn accept(&self, item: &ScoredItem) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

/// Collects accepted items in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<ScoredItem>>,
    reject_ids: std::sync::Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse records with this id
    pub fn reject(&self, id: impl Into<String>) {
        if let Ok(mut ids) = self.reject_ids.lock() {
            ids.push(id.into());
        }
    }

    pub async fn items(&self) -> Vec<ScoredItem> {
        self.items.lock().await.clone()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.items
            .lock()
            .await
            .iter()
            .map(|i| i.id().to_string())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&self, item: &ScoredItem) -> Result<(), SinkError> {
        let rejected = self
            .reject_ids
            .lock()
            .map(|ids| ids.iter().any(|id| id == item.id()))
            .unwrap_or(false);
        if rejected {
            return Err(SinkError::Rejected {
                id: item.id().to_string(),
                reason: String::from("rejected by sink"),
            });
        }

        self.items.lock().await.push(item.clone());
        Ok(())
    }
}
