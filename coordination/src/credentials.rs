//! Credential availability lookup.
//!
//! The engine only needs to know *whether* a provider has a usable key for a
//! conversation. The secret itself stays with the invoker side.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Provider;

/// Which providers currently have a usable credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialAvailability {
    present: BTreeSet<Provider>,
}

impl CredentialAvailability {
    /// Nothing present; every role falls back to its local model.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every cloud provider present.
    pub fn all_cloud() -> Self {
        Provider::CLOUD.into_iter().collect()
    }

    pub fn with(mut self, provider: Provider) -> Self {
        self.present.insert(provider);
        self
    }

    pub fn without(mut self, provider: Provider) -> Self {
        self.present.remove(&provider);
        self
    }

    /// Build from a `provider -> present` map.
    pub fn from_flags(flags: &HashMap<Provider, bool>) -> Self {
        flags
            .iter()
            .filter(|(_, present)| **present)
            .map(|(provider, _)| *provider)
            .collect()
    }

    /// Local providers are always available.
    pub fn is_present(&self, provider: Provider) -> bool {
        provider.is_local() || self.present.contains(&provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.present.iter().copied()
    }
}

impl FromIterator<Provider> for CredentialAvailability {
    fn from_iter<I: IntoIterator<Item = Provider>>(iter: I) -> Self {
        Self {
            present: iter.into_iter().filter(|p| !p.is_local()).collect(),
        }
    }
}

/// Answers "which providers have a key" for a conversation.
///
/// Queried on every invocation, so a key revoked mid-run takes effect on
/// the next turn.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, conversation_id: &str) -> CredentialAvailability;
}

/// Resolver with a fixed answer for every conversation.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    availability: CredentialAvailability,
}

impl StaticCredentials {
    pub fn new(availability: CredentialAvailability) -> Self {
        Self { availability }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, _conversation_id: &str) -> CredentialAvailability {
        self.availability.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_always_present() {
        let none = CredentialAvailability::none();
        assert!(none.is_present(Provider::Ollama));
        assert!(!none.is_present(Provider::OpenAi));
    }

    #[test]
    fn test_from_flags_keeps_only_true() {
        let mut flags = HashMap::new();
        flags.insert(Provider::OpenAi, true);
        flags.insert(Provider::Gemini, false);
        let creds = CredentialAvailability::from_flags(&flags);
        assert!(creds.is_present(Provider::OpenAi));
        assert!(!creds.is_present(Provider::Gemini));
        assert_eq!(creds.providers().count(), 1);
    }

    #[test]
    fn test_local_never_stored() {
        let creds: CredentialAvailability = [Provider::Ollama, Provider::DeepSeek]
            .into_iter()
            .collect();
        assert_eq!(creds.providers().collect::<Vec<_>>(), vec![Provider::DeepSeek]);
    }

    #[test]
    fn test_with_and_without() {
        let creds = CredentialAvailability::all_cloud().without(Provider::Gemini);
        assert!(creds.is_present(Provider::OpenAi));
        assert!(!creds.is_present(Provider::Gemini));
        assert!(creds.with(Provider::Gemini).is_present(Provider::Gemini));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticCredentials::new(CredentialAvailability::none().with(Provider::Gemini));
        let creds = resolver.resolve("any").await;
        assert!(creds.is_present(Provider::Gemini));
    }
}
