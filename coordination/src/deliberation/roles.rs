//! Role table: which model each seat binds to, and how the arbiter picks.
//!
//! One data-driven table replaces per-provider branching: a seat has a
//! cloud primary and a fixed local fallback, and the binding is resolved
//! fresh from credential availability on every turn.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{DebaterSlot, Speaker};
use crate::credentials::CredentialAvailability;
use crate::model::{ModelSpec, Provider};

/// Display label the arbiter always speaks under.
pub const ARBITER_LABEL: &str = "Arbiter";

const DEBATER_TEMPERATURE: f32 = 0.7;
const ARBITER_TEMPERATURE: f32 = 0.2;

/// A debater seat's two candidate models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebaterRole {
    /// Cloud model used when its provider has a credential.
    pub primary: ModelSpec,
    /// Local model used otherwise. Fixed per seat.
    pub fallback: ModelSpec,
}

impl DebaterRole {
    /// Bind against the current credential answer.
    pub fn bind(&self, slot: DebaterSlot, credentials: &CredentialAvailability) -> RoleBinding {
        let choice = if credentials.is_present(self.primary.provider) {
            BindingChoice::Primary
        } else {
            BindingChoice::Fallback
        };
        RoleBinding {
            speaker: Speaker::Debater(slot),
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            choice,
        }
    }
}

/// Which of a seat's models was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingChoice {
    Primary,
    Fallback,
}

/// A seat resolved for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleBinding {
    pub speaker: Speaker,
    pub primary: ModelSpec,
    pub fallback: ModelSpec,
    pub choice: BindingChoice,
}

impl RoleBinding {
    /// The model that will actually be invoked.
    pub fn active(&self) -> &ModelSpec {
        match self.choice {
            BindingChoice::Primary => &self.primary,
            BindingChoice::Fallback => &self.fallback,
        }
    }

    /// Label derived from the binding in use.
    pub fn display_name(&self) -> &str {
        &self.active().display_name
    }

    pub fn used_fallback(&self) -> bool {
        self.choice == BindingChoice::Fallback
    }
}

/// Arbiter model selection, in strict priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterTier {
    /// Cloud model on the first debater's provider.
    FirstDebaterProvider,
    /// Cloud model on the second debater's provider.
    SecondDebaterProvider,
    /// Local fallback.
    Local,
}

/// The arbiter's three candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterRole {
    /// Must share the first debater's primary provider.
    pub primary: ModelSpec,
    /// Must share the second debater's primary provider.
    pub secondary: ModelSpec,
    pub local: ModelSpec,
}

impl ArbiterRole {
    /// Pick a model from credentials alone, independent of what the
    /// debaters actually ran on.
    pub fn select(&self, credentials: &CredentialAvailability) -> (ArbiterTier, &ModelSpec) {
        if credentials.is_present(self.primary.provider) {
            (ArbiterTier::FirstDebaterProvider, &self.primary)
        } else if credentials.is_present(self.secondary.provider) {
            (ArbiterTier::SecondDebaterProvider, &self.secondary)
        } else {
            (ArbiterTier::Local, &self.local)
        }
    }
}

/// Problems with a (possibly user-supplied) role table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleTableError {
    #[error("{0} fallback must be a local model")]
    FallbackNotLocal(DebaterSlot),

    #[error("{0} primary must be a cloud model")]
    PrimaryNotCloud(DebaterSlot),

    #[error("arbiter {tier} candidate must use provider {expected}")]
    ArbiterProviderMismatch { tier: &'static str, expected: Provider },

    #[error("arbiter local candidate must be a local model")]
    ArbiterLocalNotLocal,

    #[error("display names must be non-empty")]
    EmptyDisplayName,
}

/// Seat → models, plus the arbiter's candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTable {
    pub debaters: [DebaterRole; 3],
    pub arbiter: ArbiterRole,
}

impl RoleTable {
    /// OpenAI / Gemini / DeepSeek with Llama / Qwen / Phi fallbacks.
    pub fn standard() -> Self {
        let debaters = [
            DebaterRole {
                primary: ModelSpec::new(Provider::OpenAi, "gpt-4o", "OpenAI", DEBATER_TEMPERATURE),
                fallback: ModelSpec::new(
                    Provider::Ollama,
                    "llama3.2:1b",
                    "Llama 3.2",
                    DEBATER_TEMPERATURE,
                ),
            },
            DebaterRole {
                primary: ModelSpec::new(
                    Provider::Gemini,
                    "gemini-2.0-flash",
                    "Gemini",
                    DEBATER_TEMPERATURE,
                ),
                fallback: ModelSpec::new(
                    Provider::Ollama,
                    "qwen2.5:1.5b",
                    "Qwen 2.5",
                    DEBATER_TEMPERATURE,
                ),
            },
            DebaterRole {
                primary: ModelSpec::new(
                    Provider::DeepSeek,
                    "deepseek-chat",
                    "DeepSeek",
                    DEBATER_TEMPERATURE,
                ),
                fallback: ModelSpec::new(Provider::Ollama, "phi3:mini", "Phi 3", DEBATER_TEMPERATURE),
            },
        ];
        let arbiter = ArbiterRole {
            primary: ModelSpec::new(Provider::OpenAi, "gpt-4o", ARBITER_LABEL, ARBITER_TEMPERATURE),
            secondary: ModelSpec::new(
                Provider::Gemini,
                "gemini-2.0-flash",
                ARBITER_LABEL,
                ARBITER_TEMPERATURE,
            ),
            local: ModelSpec::new(Provider::Ollama, "llama3.2:3b", ARBITER_LABEL, ARBITER_TEMPERATURE),
        };
        Self { debaters, arbiter }
    }

    pub fn debater(&self, slot: DebaterSlot) -> &DebaterRole {
        &self.debaters[slot.index()]
    }

    /// Role labels in seat order (primary display names).
    pub fn participants(&self) -> Vec<String> {
        self.debaters
            .iter()
            .map(|d| d.primary.display_name.clone())
            .collect()
    }

    /// Current display names of every seat.
    pub fn display_names(&self, credentials: &CredentialAvailability) -> Vec<String> {
        DebaterSlot::ALL
            .iter()
            .map(|slot| self.debater(*slot).bind(*slot, credentials).display_name().to_string())
            .collect()
    }

    /// Display names of the other two seats, in seat order.
    pub fn peers(&self, slot: DebaterSlot, credentials: &CredentialAvailability) -> Vec<String> {
        DebaterSlot::ALL
            .iter()
            .filter(|s| **s != slot)
            .map(|s| self.debater(*s).bind(*s, credentials).display_name().to_string())
            .collect()
    }

    /// Check the structural rules the engine relies on.
    pub fn validate(&self) -> Result<(), RoleTableError> {
        for slot in DebaterSlot::ALL {
            let role = self.debater(slot);
            if role.primary.provider.is_local() {
                return Err(RoleTableError::PrimaryNotCloud(slot));
            }
            if !role.fallback.provider.is_local() {
                return Err(RoleTableError::FallbackNotLocal(slot));
            }
            if role.primary.display_name.trim().is_empty()
                || role.fallback.display_name.trim().is_empty()
            {
                return Err(RoleTableError::EmptyDisplayName);
            }
        }

        let first = self.debaters[0].primary.provider;
        if self.arbiter.primary.provider != first {
            return Err(RoleTableError::ArbiterProviderMismatch {
                tier: "primary",
                expected: first,
            });
        }
        let second = self.debaters[1].primary.provider;
        if self.arbiter.secondary.provider != second {
            return Err(RoleTableError::ArbiterProviderMismatch {
                tier: "secondary",
                expected: second,
            });
        }
        if !self.arbiter.local.provider.is_local() {
            return Err(RoleTableError::ArbiterLocalNotLocal);
        }
        Ok(())
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::standard()
    }
}
