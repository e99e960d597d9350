//! Local Ollama `/api/chat` (NDJSON streaming).

use coordination::{InvocationError, InvocationRequest, ModelReply, TurnRole};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::stream::{fragments, lines, ndjson_records};
use super::{check_status, labeled_content};

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

/// One NDJSON record (or the whole non-streamed body).
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub fn request_body(request: &InvocationRequest) -> ChatRequest {
    let mut messages = vec![ChatMessage {
        role: "system".into(),
        content: request.system_instruction.clone(),
    }];
    messages.extend(request.turns.iter().map(|turn| ChatMessage {
        role: match turn.role {
            TurnRole::User => "user".into(),
            TurnRole::Assistant => "assistant".into(),
        },
        content: labeled_content(turn),
    }));

    ChatRequest {
        model: request.model.model.clone(),
        messages,
        stream: request.model.streaming,
        options: ChatOptions {
            temperature: request.model.temperature,
        },
    }
}

fn text_of(chunk: ChatChunk) -> Result<Option<String>, InvocationError> {
    if let Some(error) = chunk.error {
        return Err(InvocationError::Provider(error));
    }
    Ok(chunk.message.map(|m| m.content))
}

pub fn decode_chunk(raw: &str) -> Result<Option<String>, InvocationError> {
    let chunk: ChatChunk =
        serde_json::from_str(raw).map_err(|e| InvocationError::Parse(e.to_string()))?;
    text_of(chunk)
}

/// Ends the record stream after the record flagged `done`.
fn until_done(
    records: BoxStream<'static, Result<String, InvocationError>>,
) -> BoxStream<'static, Result<String, InvocationError>> {
    records
        .scan(false, |finished, record| {
            if *finished {
                return futures::future::ready(None);
            }
            if let Ok(raw) = &record {
                *finished = serde_json::from_str::<ChatChunk>(raw)
                    .map(|chunk| chunk.done)
                    .unwrap_or(false);
            }
            futures::future::ready(Some(record))
        })
        .boxed()
}

pub async fn invoke(
    client: &reqwest::Client,
    base_url: &str,
    request: &InvocationRequest,
) -> Result<ModelReply, InvocationError> {
    let url = format!("{}/api/chat", base_url);
    let response = client
        .post(&url)
        .json(&request_body(request))
        .send()
        .await
        .map_err(|e| InvocationError::Request(e.to_string()))?;
    let response = check_status(request.model.provider, response).await?;

    if request.model.streaming {
        let records = until_done(ndjson_records(lines(response.bytes_stream())));
        Ok(ModelReply::Streaming(fragments(records, decode_chunk)))
    } else {
        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| InvocationError::Parse(e.to_string()))?;
        Ok(ModelReply::Complete(text_of(chunk)?.unwrap_or_default()))
    }
}
