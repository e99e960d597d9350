//! HTTP model providers behind the engine's [`ModelInvoker`] seam.
//!
//! One invoker dispatches on the bound provider: OpenAI and DeepSeek share
//! the chat-completions wire format, Gemini has its own, and Ollama speaks
//! NDJSON. Secrets are fetched from the [`KeySource`] at call time.

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::{
    ChatTurn, InvocationError, InvocationRequest, ModelInvoker, ModelReply, Provider,
};
use tracing::debug;

use crate::config::ProviderEndpoints;
use crate::vault::{fingerprint, KeySource};

/// Assistant turns carry their speaker label inline so every provider
/// sees who said what.
pub(crate) fn labeled_content(turn: &ChatTurn) -> String {
    match &turn.name {
        Some(name) => format!("[{}]: {}", name, turn.content),
        None => turn.content.clone(),
    }
}

/// Turn a non-2xx response into [`InvocationError::Status`] with its body.
pub(crate) async fn check_status(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response, InvocationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(InvocationError::Status {
        provider,
        status,
        body,
    })
}

/// reqwest-backed [`ModelInvoker`].
pub struct HttpModelInvoker {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
    keys: Arc<dyn KeySource>,
}

impl HttpModelInvoker {
    /// Only connection establishment is bounded; a slow model is waited on.
    pub fn new(
        endpoints: ProviderEndpoints,
        keys: Arc<dyn KeySource>,
        connect_timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| InvocationError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoints,
            keys,
        })
    }

    fn key_for(&self, request: &InvocationRequest) -> Result<String, InvocationError> {
        let provider = request.model.provider;
        self.keys
            .api_key(&request.conversation_id, provider)
            .ok_or(InvocationError::MissingCredential(provider))
    }
}

#[async_trait]
impl ModelInvoker for HttpModelInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<ModelReply, InvocationError> {
        let provider = request.model.provider;
        let base_url = self.endpoints.base_url(provider);
        debug!(
            conversation_id = %request.conversation_id,
            %provider,
            model = %request.model.model,
            streaming = request.model.streaming,
            turns = request.turns.len(),
            "Invoking model"
        );

        match provider {
            Provider::OpenAi | Provider::DeepSeek => {
                let key = self.key_for(&request)?;
                debug!(key = %fingerprint(&key), "Using API key");
                openai::invoke(&self.client, base_url, &key, &request).await
            }
            Provider::Gemini => {
                let key = self.key_for(&request)?;
                debug!(key = %fingerprint(&key), "Using API key");
                gemini::invoke(&self.client, base_url, &key, &request).await
            }
            Provider::Ollama => ollama::invoke(&self.client, base_url, &request).await,
        }
    }
}
