//! In-crate test doubles: a scripted LLM driver and a kernel wired to an
//! in-memory store and a recording delivery sink.

use crate::CrmKernel;
use async_trait::async_trait;
use pulsecrm_channels::log::LogAdapter;
use pulsecrm_channels::DeliveryHub;
use pulsecrm_memory::CrmStore;
use pulsecrm_runtime::llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
use pulsecrm_runtime::CrmAi;
use pulsecrm_types::config::CrmConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replies with queued texts in order; an empty queue is an API error.
#[derive(Default)]
pub(crate) struct ScriptedDriver {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    pub(crate) requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedDriver {
    pub(crate) fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A driver whose every call fails with `status`.
    pub(crate) fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new((0..16).map(|_| Err(status)).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(CompletionResponse::from_text(text)),
            Some(Err(status)) => Err(LlmError::Api {
                status,
                message: "scripted failure".into(),
            }),
            None => Err(LlmError::Api {
                status: 500,
                message: "script exhausted".into(),
            }),
        }
    }
}

pub(crate) fn test_config() -> CrmConfig {
    let mut config = CrmConfig::default();
    config.n8n.webhook_url = None;
    config.meta.access_token_env = String::new();
    config
}

/// Kernel over an in-memory store. Outbound traffic lands in the returned sink.
pub(crate) fn test_kernel(driver: Option<Arc<ScriptedDriver>>) -> (CrmKernel, Arc<LogAdapter>) {
    test_kernel_with(test_config(), driver)
}

pub(crate) fn test_kernel_with(
    config: CrmConfig,
    driver: Option<Arc<ScriptedDriver>>,
) -> (CrmKernel, Arc<LogAdapter>) {
    let sink = Arc::new(LogAdapter::new());
    let hub = DeliveryHub::new().with_fallback(sink.clone());
    let store = CrmStore::open_in_memory().unwrap();
    let ai = driver.map(|d| CrmAi::new(d, "scripted-model"));
    (
        CrmKernel::new(config, store, ai, Arc::new(hub)),
        sink,
    )
}
