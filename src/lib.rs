// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod sources;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::{CallError, PipelineError};
pub use crate::pipeline::{ImpactCard, ImpactPipeline, Stage};
pub use crate::sources::{DataSource, FixtureDataSource, LiveDataSource};
pub use crate::types::{ApiType, ApiUsage, CallRecord};
