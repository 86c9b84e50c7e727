//! Core kernel for PulseCRM.
//!
//! `CrmKernel` owns the store, the optional LLM facade and the outbound
//! clients. Every business service (scoring, routing, chatbot, follow-ups,
//! cart recovery, reminders, content, data quality, alerts) is an inherent
//! method on it, split across one module per flow. The background scheduler
//! drives the batch services on their configured intervals.

pub mod alerts;
pub mod carts;
pub mod chatbot;
pub mod classifier;
pub mod cleaner;
pub mod closer;
pub mod closure;
pub mod comments;
pub mod content;
pub mod dedup;
pub mod dispatch;
pub mod enrichment;
pub mod error;
pub mod escalation;
pub mod followup;
pub mod ingest;
pub mod intent;
pub mod kernel;
pub mod nurturing;
pub mod payments;
pub mod predictor;
pub mod router;
pub mod scheduler;
pub mod sentiment;
pub mod text;

#[cfg(test)]
mod testing;

pub use error::{KernelError, KernelResult};
pub use kernel::CrmKernel;
pub use scheduler::{spawn_scheduler, JobReport, JOB_NAMES};
