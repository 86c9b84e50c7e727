//! The AI facade the CRM services talk to.
//!
//! `CrmAi` hides driver selection and fallback behind three calls: free
//! text, multi-turn chat and structured JSON.

use crate::drivers::{create_driver, fallback::FallbackDriver};
use crate::json::extract_json_payload;
use crate::llm_driver::{CompletionRequest, CompletionResponse, DriverConfig, LlmDriver, LlmError};
use async_trait::async_trait;
use pulsecrm_types::config::{resolve_env, CrmConfig, DefaultModelConfig};
use pulsecrm_types::message::Message;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Forces a model name onto every request, so that each link of a fallback
/// chain talks to its own model.
struct PinnedModel {
    inner: Arc<dyn LlmDriver>,
    model: String,
}

#[async_trait]
impl LlmDriver for PinnedModel {
    async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        request.model.clone_from(&self.model);
        self.inner.complete(request).await
    }
}

#[derive(Clone)]
pub struct CrmAi {
    driver: Arc<dyn LlmDriver>,
    model: String,
}

impl std::fmt::Debug for CrmAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmAi").field("model", &self.model).finish()
    }
}

fn driver_config(model: &DefaultModelConfig) -> DriverConfig {
    DriverConfig {
        provider: model.provider.clone(),
        api_key: resolve_env(&model.api_key_env),
        base_url: model.base_url.clone(),
    }
}

impl CrmAi {
    pub fn new(driver: Arc<dyn LlmDriver>, model: impl Into<String>) -> Self {
        Self {
            driver,
            model: model.into(),
        }
    }

    /// Build the facade from `[default_model]` plus `fallback_models`.
    ///
    /// Models whose API key is not set are skipped. Returns `Ok(None)` when
    /// no model is usable, in which case services run their non-AI paths.
    pub fn from_config(config: &CrmConfig) -> Result<Option<Self>, LlmError> {
        let mut chain: Vec<Arc<dyn LlmDriver>> = Vec::new();
        let mut primary_model = None;

        for model in std::iter::once(&config.default_model).chain(config.fallback_models.iter()) {
            match create_driver(&driver_config(model)) {
                Ok(driver) => {
                    debug!(provider = %model.provider, model = %model.model, "LLM driver ready");
                    primary_model.get_or_insert_with(|| model.model.clone());
                    chain.push(Arc::new(PinnedModel {
                        inner: driver,
                        model: model.model.clone(),
                    }));
                }
                Err(LlmError::MissingApiKey(provider)) => {
                    warn!(
                        provider = %provider,
                        env = %model.api_key_env,
                        "API key not set, skipping model"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let Some(model) = primary_model else {
            warn!("No LLM configured; AI-assisted services will use fallbacks");
            return Ok(None);
        };

        let driver: Arc<dyn LlmDriver> = if chain.len() == 1 {
            chain.remove(0)
        } else {
            info!(models = chain.len(), "LLM fallback chain configured");
            Arc::new(FallbackDriver::new(chain))
        };
        Ok(Some(Self::new(driver, model)))
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Single-turn completion returning the reply text.
    pub async fn complete_text(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.chat(system, vec![Message::user(prompt)], temperature, max_tokens)
            .await
    }

    /// Multi-turn completion over `history` (oldest first).
    pub async fn chat(
        &self,
        system: &str,
        history: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: history,
            max_tokens,
            temperature,
            system: (!system.is_empty()).then(|| system.to_string()),
        };
        let response = self.driver.complete(request).await?;
        Ok(response.text().trim().to_string())
    }

    /// Completion whose reply must contain a JSON object of type `T`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<T, LlmError> {
        let text = self
            .complete_text(system, prompt, temperature, max_tokens)
            .await?;
        let payload = extract_json_payload(&text)
            .ok_or_else(|| LlmError::Parse(format!("no JSON object in reply: {text}")))?;
        serde_json::from_str(&payload).map_err(|e| LlmError::Parse(e.to_string()))
    }
}
