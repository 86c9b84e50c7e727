//! Kernel-specific error types.

use pulsecrm_channels::ChannelError;
use pulsecrm_memory::MemoryError;
use pulsecrm_runtime::LlmError;
use pulsecrm_types::config::ConfigError;
use thiserror::Error;

/// Kernel error type wrapping the lower layers.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Persistence failure.
    #[error("Storage error: {0}")]
    Memory(#[from] MemoryError),
    /// LLM call failed.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    /// Outbound delivery or Meta API failure.
    #[error("Delivery error: {0}")]
    Channel(#[from] ChannelError),
    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The request was malformed or the operation is not allowed.
    #[error("Invalid request: {0}")]
    Invalid(String),
    /// The operation needs an LLM and none is configured.
    #[error("No LLM provider configured")]
    AiUnavailable,
    /// `run_job` was given a name it does not know.
    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

impl KernelError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Memory(MemoryError::NotFound { .. })
        )
    }

    /// True for errors caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::UnknownJob(_))
    }
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
