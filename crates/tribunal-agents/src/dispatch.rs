//! Conversation dispatcher: one spawned task per deliberation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use coordination::{
    Collaborators, DeliberationOutcome, EventPublisher, MessageRecord, MessageStore,
    ModelInvoker, Orchestrator, Provider, RoleTable, RunError,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::TribunalConfig;
use crate::providers::HttpModelInvoker;
use crate::store::JsonlMessageStore;
use crate::vault::CredentialVault;

pub type RunHandle = JoinHandle<Result<DeliberationOutcome, RunError>>;

/// Starts deliberations and owns what they share.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    vault: Arc<CredentialVault>,
    store: Arc<dyn MessageStore>,
    default_rounds: u32,
}

impl Dispatcher {
    /// Wire the HTTP providers, vault, and JSONL store from config.
    pub fn from_config(config: &TribunalConfig, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        config.validate().context("Invalid tribunal config")?;
        let vault = Arc::new(CredentialVault::new(config.key_ttl));
        let invoker = HttpModelInvoker::new(
            config.endpoints.clone(),
            vault.clone(),
            config.connect_timeout,
        )
        .context("Failed to build model invoker")?;
        let store = Arc::new(JsonlMessageStore::new(config.store_dir.clone()));

        info!(
            store_dir = %config.store_dir.display(),
            ollama = %config.endpoints.ollama_url,
            max_rounds = config.max_rounds,
            "Dispatcher ready"
        );
        Ok(Self::from_parts(
            config.roles.clone(),
            vault,
            Arc::new(invoker),
            publisher,
            store,
            config.max_rounds,
        ))
    }

    /// Assemble from explicit collaborators.
    pub fn from_parts(
        roles: RoleTable,
        vault: Arc<CredentialVault>,
        invoker: Arc<dyn ModelInvoker>,
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn MessageStore>,
        default_rounds: u32,
    ) -> Self {
        let deps = Collaborators {
            credentials: vault.clone(),
            invoker,
            publisher,
            store: store.clone(),
        };
        Self {
            orchestrator: Arc::new(Orchestrator::new(roles, deps)),
            vault,
            store,
            default_rounds,
        }
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// Allocate a conversation, stash its keys, record the question, and
    /// spawn the run. Keys are dropped once the run ends. Subscribe to
    /// events before calling this.
    pub async fn start(
        &self,
        question: &str,
        keys: HashMap<Provider, String>,
        max_rounds: Option<u32>,
    ) -> (String, RunHandle) {
        let conversation_id = Uuid::new_v4().to_string();
        let max_rounds = max_rounds.unwrap_or(self.default_rounds);
        let purged = self.vault.purge_expired();
        if purged > 0 {
            debug!(purged, "Dropped expired credentials");
        }
        self.vault.store(&conversation_id, keys);

        if !question.trim().is_empty() {
            let record = MessageRecord::new(&conversation_id, "User", question, 0);
            if let Err(e) = self.store.persist(record).await {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to persist question");
            }
        }

        info!(conversation_id = %conversation_id, max_rounds, "Deliberation dispatched");

        let orchestrator = self.orchestrator.clone();
        let store = self.store.clone();
        let vault = self.vault.clone();
        let question = question.to_string();
        let id = conversation_id.clone();
        let handle = tokio::spawn(async move {
            let result = orchestrator.run(&question, &id, max_rounds).await;
            vault.forget(&id);
            match result {
                Ok(outcome) => {
                    if let Err(e) = store.mark_completed(&id).await {
                        warn!(conversation_id = %id, error = %e, "Failed to mark conversation completed");
                    }
                    info!(conversation_id = %id, "Conversation completed");
                    Ok(outcome)
                }
                Err(e) => {
                    error!(conversation_id = %id, error = %e, "Conversation failed");
                    Err(e)
                }
            }
        });

        (conversation_id, handle)
    }
}
