//! Anthropic Messages API driver.

use crate::drivers::post_json_with_retry;
use crate::llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
use async_trait::async_trait;
use pulsecrm_types::message::{ContentBlock, Message, Role, StopReason, TokenUsage};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicDriver {
    api_key: Zeroizing<String>,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicDriver {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key: Zeroizing::new(api_key),
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
}

/// The Messages API takes the system prompt as a top-level field, so inline
/// system turns are folded into it.
fn convert_messages(
    messages: &[Message],
    system: &Option<String>,
) -> (Vec<ApiMessage>, Option<String>) {
    let system = system.clone().or_else(|| {
        let inline: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!inline.is_empty()).then(|| inline.join("\n\n"))
    });
    let converted = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(ApiMessage {
                role,
                content: m.content.clone(),
            })
        })
        .collect();
    (converted, system)
}

fn convert_response(resp: ApiResponse) -> CompletionResponse {
    let content = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            ApiContentBlock::Text { text } => Some(ContentBlock::Text { text }),
            ApiContentBlock::Thinking { thinking } => Some(ContentBlock::Thinking { thinking }),
            ApiContentBlock::Other => None,
        })
        .collect();
    let stop_reason = match resp.stop_reason.as_deref() {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };
    let usage = resp
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        })
        .unwrap_or_default();
    CompletionResponse {
        content,
        stop_reason,
        usage,
    }
}

#[async_trait]
impl LlmDriver for AnthropicDriver {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (messages, system) = convert_messages(&request.messages, &request.system);
        let body = ApiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system,
            messages,
        };
        let url = format!("{}/v1/messages", self.base_url);
        let text = post_json_with_retry(
            &self.client,
            &url,
            &body,
            |rb| {
                rb.header("x-api-key", self.api_key.as_str())
                    .header("anthropic-version", API_VERSION)
            },
            error_message,
        )
        .await?;

        let parsed: ApiResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(convert_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_system_is_lifted() {
        let msgs = vec![
            Message::system("Be brief."),
            Message::user("Hola"),
            Message::assistant("Hola!"),
        ];
        let (converted, system) = convert_messages(&msgs, &None);
        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn request_omits_empty_system() {
        let req = ApiRequest {
            model: "claude".into(),
            max_tokens: 10,
            temperature: 0.3,
            system: None,
            messages: vec![],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn response_skips_unknown_blocks() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"ok"},{"type":"tool_use","id":"x","name":"y","input":{}}],
                "stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":1}}"#,
        )
        .unwrap();
        let out = convert_response(resp);
        assert_eq!(out.content.len(), 1);
        assert_eq!(out.text(), "ok");
        assert_eq!(out.usage.input_tokens, 5);
    }

    #[test]
    fn error_body_message() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(error_message(body).as_deref(), Some("invalid x-api-key"));
    }
}
