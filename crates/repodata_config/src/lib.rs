//! Configuration, error taxonomy, retry policy and tracing setup shared
//! across the worker and redirect binaries.

pub mod error;
pub mod retry;
pub mod telemetry;
pub mod worker_config;

pub use error::{transient, RepoError, Result, Severity};
pub use worker_config::{RedirectConfig, WorkerConfig};
