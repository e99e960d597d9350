//! Message persistence contract.
//!
//! Every finished turn is handed to a [`MessageStore`]. Writes are not
//! required to be idempotent and a failed write never stops a run.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One persisted contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub conversation_id: String,
    /// Lower-cased speaker label (`user`, `openai`, `llama 3.2`, `arbiter`).
    pub agent: String,
    pub content: String,
    /// 0 for the user question and the arbiter.
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(conversation_id: &str, agent: &str, content: &str, round: u32) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            agent: agent.to_lowercase(),
            content: content.to_string(),
            round,
            timestamp: Utc::now(),
        }
    }
}

/// Errors from a message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for transcript entries.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist(&self, record: MessageRecord) -> Result<(), StoreError>;

    /// Flag a conversation as finished. Stores without a notion of
    /// completion can ignore this.
    async fn mark_completed(&self, _conversation_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local store, mostly for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: Mutex<Vec<MessageRecord>>,
    completed: Mutex<Vec<String>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in write order.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Records for one conversation, in write order.
    pub fn history(&self, conversation_id: &str) -> Vec<MessageRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect()
    }

    pub fn is_completed(&self, conversation_id: &str) -> bool {
        self.completed
            .lock()
            .map(|done| done.iter().any(|id| id == conversation_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(&self, record: MessageRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?
            .push(record);
        Ok(())
    }

    async fn mark_completed(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.completed
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?
            .push(conversation_id.to_string());
        Ok(())
    }
}
