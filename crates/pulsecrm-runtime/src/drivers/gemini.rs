//! Google Gemini driver over `models/{model}:generateContent`.
//!
//! The model name is part of the URL and the key travels in the
//! `x-goog-api-key` header. Scoring prompts map to `systemInstruction`;
//! the reply text is read from the first candidate's parts.

use crate::drivers::post_json_with_retry;
use crate::llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
use async_trait::async_trait;
use pulsecrm_types::message::{ContentBlock, Message, Role, StopReason, TokenUsage};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Google Gemini API driver.
pub struct GeminiDriver {
    api_key: Zeroizing<String>,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiDriver {
    /// Create a new Gemini driver.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key: Zeroizing::new(api_key),
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// ── Response types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GeminiErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
}

// ── Message conversion ─────────────────────────────────────────────────

/// Split messages into Gemini contents plus the system instruction.
fn convert_messages(
    messages: &[Message],
    system: &Option<String>,
) -> (Vec<GeminiContent>, Option<GeminiContent>) {
    let system_text = system.clone().or_else(|| {
        messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
    });
    let system_instruction = system_text.map(|text| GeminiContent {
        role: None,
        parts: vec![GeminiPart { text }],
    });

    let contents = messages
        .iter()
        .filter_map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => return None,
            };
            if msg.content.is_empty() {
                return None;
            }
            Some(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            })
        })
        .collect();

    (contents, system_instruction)
}

fn convert_response(resp: GeminiResponse) -> Result<CompletionResponse, LlmError> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("No candidates in Gemini response".to_string()))?;

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.text.is_empty())
                .map(|p| ContentBlock::Text { text: p.text })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match candidate.finish_reason.as_deref() {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    let usage = resp
        .usage_metadata
        .map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
    })
}

// ── LlmDriver implementation ──────────────────────────────────────────

#[async_trait]
impl LlmDriver for GeminiDriver {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (contents, system_instruction) = convert_messages(&request.messages, &request.system);

        let gemini_request = GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GenerationConfig {
                temperature: Some(request.temperature),
                max_output_tokens: Some(request.max_tokens),
            }),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = post_json_with_retry(
            &self.client,
            &url,
            &gemini_request,
            |rb| rb.header("x-goog-api-key", self.api_key.as_str()),
            error_message,
        )
        .await?;

        let gemini_response: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
        convert_response(gemini_response)
    }
}
