//! HTTP API server for the PulseCRM daemon.
//!
//! Exposes every CRM service as a JSON endpoint under `/api/v1`, plus the
//! Meta webhook endpoints. The kernel runs in-process.

pub mod routes;
pub mod server;
pub mod types;

pub use server::{build_router, run_server};
