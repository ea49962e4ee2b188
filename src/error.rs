//! Error types for navbench operations.
//!
//! Defines error types for all major subsystems:
//! - Task corpus loading and registry access
//! - Agent run execution
//! - Result recording and persistence
//! - Metrics aggregation
//!
//! Per-run failures (budget exhaustion, agent crashes) are not errors: they
//! are recorded as terminal run outcomes so a benchmark session with
//! individual failed runs still produces a complete report. Only structural
//! misuse (bad task definitions, bad grouping) surfaces through these types.

use thiserror::Error;

/// Errors that can occur while loading or querying the task corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Task '{0}' not found in registry")]
    TaskNotFound(String),

    #[error("Task '{0}' already exists in registry")]
    DuplicateTask(String),

    #[error("Invalid task '{name}': {reason}")]
    InvalidTask { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur when setting up an agent run.
///
/// Infrastructure failures of a running agent (crash, timeout, budget
/// exhaustion) are captured in the run record itself, not raised here.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Budget cap must be positive, got {0}")]
    InvalidBudget(f64),

    #[error("Fixture directory not found: {0}")]
    FixtureNotFound(String),

    #[error("Unknown agent kind: {0}")]
    UnknownAgent(String),
}

/// Errors that can occur while recording or reading run records.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Invalid run record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during metrics aggregation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Cannot compute metrics for a group with zero attempts")]
    EmptyGroup,
}
