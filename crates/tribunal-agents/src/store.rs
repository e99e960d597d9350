//! Append-only JSONL transcript store.
//!
//! One file per conversation (`<dir>/<id>.jsonl`), one [`MessageRecord`]
//! per line. Completion is a sibling `<id>.done` marker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use coordination::{MessageRecord, MessageStore, StoreError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JsonlMessageStore {
    dir: PathBuf,
}

impl JsonlMessageStore {
    /// Store rooted at `dir`; created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_id(conversation_id: &str) -> Result<(), StoreError> {
        let ok = !conversation_id.is_empty()
            && conversation_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if ok {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "invalid conversation id {:?}",
                conversation_id
            )))
        }
    }

    fn transcript_path(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", conversation_id))
    }

    fn marker_path(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.done", conversation_id))
    }

    /// Records for a conversation, in write order. Unknown ids yield an
    /// empty history; malformed lines are skipped with a warning.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Self::check_id(conversation_id)?;
        let raw = match tokio::fs::read_to_string(self.transcript_path(conversation_id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MessageRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(conversation_id, line = idx + 1, error = %e, "Skipping malformed record")
                }
            }
        }
        Ok(records)
    }

    pub async fn is_completed(&self, conversation_id: &str) -> bool {
        Self::check_id(conversation_id).is_ok()
            && tokio::fs::try_exists(self.marker_path(conversation_id))
                .await
                .unwrap_or(false)
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn persist(&self, record: MessageRecord) -> Result<(), StoreError> {
        Self::check_id(&record.conversation_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut line =
            serde_json::to_string(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(&record.conversation_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(
            conversation_id = %record.conversation_id,
            agent = %record.agent,
            round = record.round,
            "Message persisted"
        );
        Ok(())
    }

    async fn mark_completed(&self, conversation_id: &str) -> Result<(), StoreError> {
        Self::check_id(conversation_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let stamp = chrono::Utc::now().to_rfc3339();
        tokio::fs::write(self.marker_path(conversation_id), stamp).await?;
        Ok(())
    }
}
