//! Google Gemini `generateContent` / `streamGenerateContent`.

use coordination::{InvocationError, InvocationRequest, ModelReply, TurnRole};
use serde_json::{json, Value};

use super::stream::{fragments, lines, sse_payloads};
use super::{check_status, labeled_content};

pub fn request_body(request: &InvocationRequest) -> Value {
    let contents: Vec<Value> = request
        .turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": labeled_content(turn) }] })
        })
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": contents,
        "generationConfig": { "temperature": request.model.temperature },
    })
}

/// Concatenated `candidates[0].content.parts[*].text`.
pub fn decode(value: &Value) -> Result<Option<String>, InvocationError> {
    if let Some(error) = value.get("error") {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(InvocationError::Provider(message));
    }
    let Some(parts) = value["candidates"][0]["content"]["parts"].as_array() else {
        return Ok(None);
    };
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    Ok(Some(text))
}

pub fn decode_chunk(raw: &str) -> Result<Option<String>, InvocationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| InvocationError::Parse(e.to_string()))?;
    decode(&value)
}

pub async fn invoke(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    request: &InvocationRequest,
) -> Result<ModelReply, InvocationError> {
    let model = &request.model.model;
    let url = if request.model.streaming {
        format!("{}/models/{}:streamGenerateContent?alt=sse", base_url, model)
    } else {
        format!("{}/models/{}:generateContent", base_url, model)
    };

    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
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
        Ok(ModelReply::Complete(decode(&value)?.unwrap_or_default()))
    }
}
