//! OpenAI-compatible chat completions driver (`/chat/completions`).
//!
//! Covers OpenAI itself plus Groq, OpenRouter and local Ollama servers,
//! which all speak the same wire format.

use crate::drivers::post_json_with_retry;
use crate::llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
use async_trait::async_trait;
use pulsecrm_types::message::{ContentBlock, Message, Role, StopReason, TokenUsage};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub struct OpenAiDriver {
    api_key: Option<Zeroizing<String>>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiDriver {
    /// `api_key` is `None` for keyless local servers.
    pub fn new(api_key: Option<String>, base_url: String) -> Self {
        Self {
            api_key: api_key.map(Zeroizing::new),
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
}

fn convert_messages(messages: &[Message], system: &Option<String>) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(ChatMessage {
            role: "system",
            content: system.clone(),
        });
    }
    for m in messages {
        let role = match m.role {
            // An explicit system field replaces inline system turns.
            Role::System if system.is_some() => continue,
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        out.push(ChatMessage {
            role,
            content: m.content.clone(),
        });
    }
    out
}

fn convert_response(resp: ChatResponse) -> Result<CompletionResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

    let content = choice
        .message
        .content
        .filter(|t| !t.is_empty())
        .map(|text| vec![ContentBlock::Text { text }])
        .unwrap_or_default();

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    let usage = resp
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
    })
}

#[async_trait]
impl LlmDriver for OpenAiDriver {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: convert_messages(&request.messages, &request.system),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let text = post_json_with_retry(
            &self.client,
            &url,
            &body,
            |rb| match &self.api_key {
                Some(key) => rb.bearer_auth(key.as_str()),
                None => rb,
            },
            error_message,
        )
        .await?;

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        convert_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_field_is_prepended_once() {
        let msgs = vec![Message::system("inline"), Message::user("hola")];
        let converted = convert_messages(&msgs, &Some("explicit".into()));
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[0].content, "explicit");
        assert_eq!(converted[1].role, "user");
    }

    #[test]
    fn inline_system_kept_without_explicit() {
        let msgs = vec![Message::system("inline"), Message::user("hola")];
        let converted = convert_messages(&msgs, &None);
        assert_eq!(converted[0].content, "inline");
    }

    #[test]
    fn parses_choice_and_usage() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":9,"completion_tokens":3}}"#,
        )
        .unwrap();
        let out = convert_response(resp).unwrap();
        assert_eq!(out.text(), "Hi there");
        assert_eq!(out.usage.output_tokens, 3);
    }

    #[test]
    fn empty_choices_is_parse_error() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(convert_response(resp), Err(LlmError::Parse(_))));
    }

    #[test]
    fn length_finish_maps_to_max_tokens() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"trunc"},"finish_reason":"length"}]}"#,
        )
        .unwrap();
        assert_eq!(
            convert_response(resp).unwrap().stop_reason,
            StopReason::MaxTokens
        );
    }
}
