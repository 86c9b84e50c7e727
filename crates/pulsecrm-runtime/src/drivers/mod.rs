//! Provider drivers and the factory that picks one from configuration.

pub mod anthropic;
pub mod fallback;
pub mod gemini;
pub mod openai;

use crate::llm_driver::{status_error, DriverConfig, LlmDriver, LlmError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;

/// Default API base URL for a provider, if it has one.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "anthropic" => Some("https://api.anthropic.com"),
        "gemini" | "google" => Some("https://generativelanguage.googleapis.com"),
        _ => None,
    }
}

/// Build a driver for `config.provider`.
pub fn create_driver(config: &DriverConfig) -> Result<Arc<dyn LlmDriver>, LlmError> {
    let provider = config.provider.trim().to_ascii_lowercase();
    let base_url = config
        .base_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| default_base_url(&provider).map(str::to_string))
        .ok_or_else(|| LlmError::UnsupportedProvider(config.provider.clone()))?;
    let base_url = base_url.trim_end_matches('/').to_string();

    let require_key = || {
        config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(provider.clone()))
    };

    match provider.as_str() {
        "anthropic" => Ok(Arc::new(anthropic::AnthropicDriver::new(
            require_key()?,
            base_url,
        ))),
        "gemini" | "google" => Ok(Arc::new(gemini::GeminiDriver::new(require_key()?, base_url))),
        "ollama" => Ok(Arc::new(openai::OpenAiDriver::new(
            config.api_key.clone(),
            base_url,
        ))),
        "openai" | "groq" | "openrouter" => Ok(Arc::new(openai::OpenAiDriver::new(
            Some(require_key()?),
            base_url,
        ))),
        // Unknown names with an explicit base URL are treated as OpenAI-compatible.
        _ if config.base_url.is_some() => Ok(Arc::new(openai::OpenAiDriver::new(
            config.api_key.clone(),
            base_url,
        ))),
        _ => Err(LlmError::UnsupportedProvider(config.provider.clone())),
    }
}

/// POST a JSON body, retrying on 429/503 with a linear backoff, and return
/// the successful response body.
///
/// `prepare` adds provider-specific headers to each attempt; `error_message`
/// extracts a human-readable message from an error body.
pub(crate) async fn post_json_with_retry<B, F>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    prepare: F,
    error_message: fn(&str) -> Option<String>,
) -> Result<String, LlmError>
where
    B: serde::Serialize + ?Sized,
    F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
{
    for attempt in 0..=MAX_RETRIES {
        debug!(url = %url, attempt, "Sending LLM request");
        let resp = prepare(client.post(url))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = resp.status().as_u16();

        if status == 429 || status == 503 || status == 529 {
            if attempt < MAX_RETRIES {
                let retry_ms = (attempt + 1) as u64 * 2000;
                warn!(status, retry_ms, "Rate limited/overloaded, retrying");
                tokio::time::sleep(Duration::from_millis(retry_ms)).await;
                continue;
            }
            return Err(status_error(status, String::new()));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !(200..300).contains(&status) {
            let message = error_message(&text).unwrap_or(text);
            return Err(status_error(status, message));
        }

        return Ok(text);
    }

    Err(LlmError::Api {
        status: 0,
        message: "Max retries exceeded".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: &str, key: Option<&str>, base_url: Option<&str>) -> DriverConfig {
        DriverConfig {
            provider: provider.to_string(),
            api_key: key.map(str::to_string),
            base_url: base_url.map(str::to_string),
        }
    }

    #[test]
    fn test_known_providers_build() {
        for provider in ["openai", "groq", "openrouter", "anthropic", "gemini"] {
            assert!(
                create_driver(&cfg(provider, Some("k"), None)).is_ok(),
                "{provider} should build"
            );
        }
    }

    #[test]
    fn test_missing_key_is_reported() {
        let err = create_driver(&cfg("anthropic", None, None)).err().unwrap();
        assert!(matches!(err, LlmError::MissingApiKey(p) if p == "anthropic"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(create_driver(&cfg("ollama", None, None)).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        assert!(matches!(
            create_driver(&cfg("mystery", Some("k"), None)),
            Err(LlmError::UnsupportedProvider(_))
        ));
        assert!(create_driver(&cfg("vllm", None, Some("http://10.0.0.5:8000/v1"))).is_ok());
    }
}
