//! navbench: Benchmark harness for code-navigation tool evaluation.
//!
//! This library drives repeated, isolated executions of an external coding
//! agent against a fixed task corpus, records every attempt to an
//! append-only result set, scores answers against literal ground-truth
//! strings, and aggregates/compares result sets with a retry-aware
//! cost-per-correct metric.

// Core modules
pub mod checker;
pub mod cli;
pub mod compare;
pub mod corpus;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod mode;
pub mod record;
pub mod session;

// Re-export commonly used error types
pub use error::{CorpusError, ExecutorError, MetricsError, RecorderError};
