//! Per-conversation API key vault.
//!
//! Keys live in process memory only and expire after a fixed TTL. The
//! engine sees nothing but availability flags; providers fetch the secret
//! itself right before a call.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use coordination::{CredentialAvailability, CredentialResolver, Provider};
use tokio::time::Instant;
use tracing::{debug, info};

/// Supplies the secret for a provider call.
pub trait KeySource: Send + Sync {
    fn api_key(&self, conversation_id: &str, provider: Provider) -> Option<String>;
}

/// Short, non-reversible tag for a key, safe to log.
pub fn fingerprint(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    hash.to_hex().as_str()[..8].to_string()
}

#[derive(Debug)]
struct Entry {
    keys: HashMap<Provider, String>,
    expires_at: Instant,
}

/// TTL-bound key store keyed by conversation.
#[derive(Debug)]
pub struct CredentialVault {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl CredentialVault {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store keys for a conversation, replacing any earlier set. Blank keys
    /// and local providers are dropped.
    pub fn store(&self, conversation_id: &str, keys: HashMap<Provider, String>) {
        let keys: HashMap<Provider, String> = keys
            .into_iter()
            .filter(|(provider, key)| !provider.is_local() && !key.trim().is_empty())
            .map(|(provider, key)| (provider, key.trim().to_string()))
            .collect();

        for (provider, key) in &keys {
            debug!(conversation_id, %provider, key = %fingerprint(key), "Stored API key");
        }
        info!(conversation_id, providers = keys.len(), ttl_secs = self.ttl.as_secs(), "Credentials stored");

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                conversation_id.to_string(),
                Entry {
                    keys,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    /// Drop one provider's key; the next turn falls back.
    pub fn revoke(&self, conversation_id: &str, provider: Provider) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        let removed = entries
            .get_mut(conversation_id)
            .and_then(|entry| entry.keys.remove(&provider))
            .is_some();
        if removed {
            info!(conversation_id, %provider, "API key revoked");
        }
        removed
    }

    /// Forget a conversation entirely.
    pub fn forget(&self, conversation_id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(conversation_id);
        }
    }

    /// Remove expired conversations, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_key(&self, conversation_id: &str, provider: Provider) -> Option<String> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(conversation_id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        entry.keys.get(&provider).cloned()
    }
}

impl KeySource for CredentialVault {
    fn api_key(&self, conversation_id: &str, provider: Provider) -> Option<String> {
        self.live_key(conversation_id, provider)
    }
}

#[async_trait]
impl CredentialResolver for CredentialVault {
    async fn resolve(&self, conversation_id: &str) -> CredentialAvailability {
        Provider::CLOUD
            .into_iter()
            .filter(|p| self.live_key(conversation_id, *p).is_some())
            .collect()
    }
}
