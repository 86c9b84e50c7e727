//! Fallback driver: tries a chain of drivers in order.
//!
//! Rate-limit and overload errors are returned immediately; any other
//! failure moves on to the next driver in the chain.

use crate::llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct FallbackDriver {
    drivers: Vec<Arc<dyn LlmDriver>>,
}

impl FallbackDriver {
    /// The first driver is the primary; the rest are tried in order.
    pub fn new(drivers: Vec<Arc<dyn LlmDriver>>) -> Self {
        Self { drivers }
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[async_trait]
impl LlmDriver for FallbackDriver {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut last_error = None;

        for (i, driver) in self.drivers.iter().enumerate() {
            match driver.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e @ LlmError::RateLimited { .. }) | Err(e @ LlmError::Overloaded { .. }) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(driver_index = i, error = %e, "LLM driver failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Api {
            status: 0,
            message: "No drivers configured in fallback chain".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailDriver;

    #[async_trait]
    impl LlmDriver for FailDriver {
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::Api {
                status: 500,
                message: "Internal error".to_string(),
            })
        }
    }

    struct RateLimitDriver;

    #[async_trait]
    impl LlmDriver for RateLimitDriver {
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RateLimited {
                retry_after_ms: 5000,
            })
        }
    }

    struct OkDriver(&'static str);

    #[async_trait]
    impl LlmDriver for OkDriver {
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse::from_text(self.0))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            max_tokens: 100,
            temperature: 0.0,
            system: None,
        }
    }

    #[tokio::test]
    async fn primary_succeeds() {
        let driver = FallbackDriver::new(vec![
            Arc::new(OkDriver("primary")) as Arc<dyn LlmDriver>,
            Arc::new(FailDriver),
        ]);
        assert_eq!(driver.complete(request()).await.unwrap().text(), "primary");
    }

    #[tokio::test]
    async fn secondary_used_after_failure() {
        let driver = FallbackDriver::new(vec![
            Arc::new(FailDriver) as Arc<dyn LlmDriver>,
            Arc::new(OkDriver("backup")),
        ]);
        assert_eq!(driver.complete(request()).await.unwrap().text(), "backup");
    }

    #[tokio::test]
    async fn all_fail_returns_last_error() {
        let driver = FallbackDriver::new(vec![
            Arc::new(FailDriver) as Arc<dyn LlmDriver>,
            Arc::new(FailDriver),
        ]);
        assert!(matches!(
            driver.complete(request()).await,
            Err(LlmError::Api { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn rate_limit_bubbles_up() {
        let driver = FallbackDriver::new(vec![
            Arc::new(RateLimitDriver) as Arc<dyn LlmDriver>,
            Arc::new(OkDriver("never")),
        ]);
        assert!(matches!(
            driver.complete(request()).await,
            Err(LlmError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn empty_chain_errors() {
        let driver = FallbackDriver::new(vec![]);
        assert!(driver.is_empty());
        assert!(driver.complete(request()).await.is_err());
    }
}
