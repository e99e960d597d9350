//! Model invocation contract.
//!
//! The engine never talks HTTP. It hands an [`InvocationRequest`] to a
//! [`ModelInvoker`] and receives either the complete text or a lazy,
//! finite, non-restartable stream of text fragments.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a model is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions.
    OpenAi,
    /// Google Gemini.
    Gemini,
    /// DeepSeek (OpenAI-compatible API).
    DeepSeek,
    /// Locally hosted Ollama server. Needs no credential.
    Ollama,
}

impl Provider {
    /// Cloud providers, in the order credentials are usually listed.
    pub const CLOUD: [Provider; 3] = [Provider::OpenAi, Provider::Gemini, Provider::DeepSeek];

    /// Whether this provider runs locally and never needs a credential.
    pub fn is_local(self) -> bool {
        matches!(self, Self::Ollama)
    }

    /// Parse the lower-case provider key used in configs and key maps.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "deepseek" => Some(Self::DeepSeek),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
            Self::DeepSeek => write!(f, "deepseek"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

fn default_streaming() -> bool {
    true
}

/// A concrete model a role can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: Provider,
    /// Provider-side model name, e.g. `gpt-4o` or `llama3.2:1b`.
    pub model: String,
    /// Label shown to subscribers and peers when this model speaks.
    pub display_name: String,
    pub temperature: f32,
    /// Whether the invoker should request a fragment stream.
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

impl ModelSpec {
    pub fn new(provider: Provider, model: &str, display_name: &str, temperature: f32) -> Self {
        Self {
            provider,
            model: model.to_string(),
            display_name: display_name.to_string(),
            temperature,
            streaming: true,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// Speaker side of a rendered transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One transcript entry as presented to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    /// Speaker label for assistant turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: &str) -> Self {
        Self {
            role: TurnRole::User,
            name: None,
            content: content.to_string(),
        }
    }

    pub fn assistant(name: &str, content: &str) -> Self {
        Self {
            role: TurnRole::Assistant,
            name: Some(name.to_string()),
            content: content.to_string(),
        }
    }
}

/// Everything a provider needs for one call.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Conversation the call belongs to; used to look up the secret.
    pub conversation_id: String,
    pub model: ModelSpec,
    pub system_instruction: String,
    pub turns: Vec<ChatTurn>,
}

/// Errors raised by a single model invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("no API key available for {0}")]
    MissingCredential(Provider),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("provider reported an error: {0}")]
    Provider(String),
}

/// Fragments of a streamed reply, in generation order.
pub type FragmentStream = BoxStream<'static, Result<String, InvocationError>>;

/// What a model produced.
pub enum ModelReply {
    /// The whole text at once.
    Complete(String),
    /// A lazy sequence of fragments; the full text is their concatenation.
    Streaming(FragmentStream),
}

impl std::fmt::Debug for ModelReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Backend able to run a model call.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: InvocationRequest) -> Result<ModelReply, InvocationError>;
}
