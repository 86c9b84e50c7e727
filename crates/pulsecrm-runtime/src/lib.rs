//! LLM access for PulseCRM: provider drivers, fallback chaining and the
//! [`ai::CrmAi`] facade used by the kernel services.

pub mod ai;
pub mod drivers;
pub mod json;
pub mod llm_driver;

pub use ai::CrmAi;
pub use llm_driver::{CompletionRequest, CompletionResponse, LlmDriver, LlmError};
