//! OpenAI-compatible chat completions (OpenAI and DeepSeek).

use coordination::{InvocationError, InvocationRequest, ModelReply, TurnRole};
use serde_json::{json, Value};

use super::stream::{fragments, lines, sse_payloads};
use super::{check_status, labeled_content};

/// Request body for `/chat/completions`.
pub fn request_body(request: &InvocationRequest) -> Value {
    let mut messages = vec![json!({
        "role": "system",
        "content": request.system_instruction,
    })];
    for turn in &request.turns {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": labeled_content(turn) }));
    }

    json!({
        "model": request.model.model,
        "messages": messages,
        "temperature": request.model.temperature,
        "stream": request.model.streaming,
    })
}

fn provider_error(value: &Value) -> Option<InvocationError> {
    let error = value.get("error")?;
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(InvocationError::Provider(message))
}

/// Text of one streamed chunk (`choices[0].delta.content`).
pub fn decode_chunk(raw: &str) -> Result<Option<String>, InvocationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| InvocationError::Parse(e.to_string()))?;
    if let Some(err) = provider_error(&value) {
        return Err(err);
    }
    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

/// Text of a complete response (`choices[0].message.content`).
pub fn decode_complete(value: &Value) -> Result<String, InvocationError> {
    if let Some(err) = provider_error(value) {
        return Err(err);
    }
    Ok(value["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string())
}

pub async fn invoke(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &InvocationRequest,
) -> Result<ModelReply, InvocationError> {
    let url = format!("{}/chat/completions", base_url);
    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&request_body(request))
        .send()
        .await
        .map_err(|e| InvocationError::Request(e.to_string()))?;
    let response = check_status(request.model.provider, response).await?;

    if request.model.streaming {
        let records = sse_payloads(lines(response.bytes_stream()));
        Ok(ModelReply::Streaming(fragments(records, decode_chunk)))
    } else {
        let value: Value = response
            .json()
            .await
            .map_err(|e| InvocationError::Parse(e.to_string()))?;
        Ok(ModelReply::Complete(decode_complete(&value)?))
    }
}
