//! Canonical run record schema.
//!
//! Every execution attempt, including budget-killed and crashed ones,
//! is normalized into one [`RunRecord`]. Records are
//! self-describing: they copy the task fields they need so a result set
//! stays interpretable without the task registry, and they are never
//! mutated after creation.

pub mod store;

pub use store::{ResultSetReader, ResultSetWriter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecorderError;
use crate::executor::RawExecutionRecord;
use crate::mode::Mode;

/// Token totals for one execution attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    /// Fresh input tokens.
    pub input: u64,
    /// Output tokens.
    pub output: u64,
    /// Tokens written to the prompt cache.
    pub cache_creation: u64,
    /// Tokens read from the prompt cache.
    pub cache_read: u64,
}

impl TokenTotals {
    /// Total context processed: fresh input plus all cached input.
    pub fn context(&self) -> u64 {
        self.input + self.cache_creation + self.cache_read
    }
}

/// Whether a tool call used the evaluated tool-set or a host built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOrigin {
    /// The navigation tool-set under evaluation.
    Evaluated,
    /// A tool built into the host agent (file read, grep, bash, ...).
    Builtin,
}

/// One tool invocation from the agent's trace, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name as reported by the agent.
    pub name: String,
    /// Which tool-set the call belongs to.
    pub origin: ToolOrigin,
}

/// Binary correctness verdict with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// True iff every ground-truth string occurs in the answer.
    pub correct: bool,
    /// Ground-truth strings found in the answer.
    pub matched: Vec<String>,
    /// Ground-truth strings missing from the answer.
    pub missing: Vec<String>,
}

/// Why a run produced no verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The attempt crossed its monetary budget ceiling and was terminated.
    /// Counts as an incorrect attempt, not a retryable error; the partial
    /// answer captured before termination is kept as best-effort text.
    BudgetExceeded,
    /// The agent process crashed, timed out, or emitted an unreadable
    /// trace. The outer driver may retry as a new repetition.
    ExecutionError { message: String },
}

/// The atomic unit of observation: one isolated execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier for this attempt.
    pub attempt_id: Uuid,
    /// When the record was created.
    pub recorded_at: DateTime<Utc>,
    /// Task name (copied from the spec at run time).
    pub task: String,
    /// Tool-availability mode of the run.
    pub mode: Mode,
    /// Model identifier.
    pub model: String,
    /// Repetition index within the (task, mode, model) configuration.
    pub repetition: u32,
    /// Monetary cost of the attempt in USD.
    pub cost_usd: f64,
    /// Token totals.
    pub tokens: TokenTotals,
    /// Number of assistant turns.
    pub turns: u32,
    /// Ordered tool invocations.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Final natural-language answer (empty if none was captured).
    pub answer: String,
    /// Correctness verdict. Absent only when `failure` explains why.
    pub verdict: Option<Verdict>,
    /// Failure reason, if the run did not complete normally.
    pub failure: Option<FailureReason>,
}

impl RunRecord {
    /// Normalizes a raw execution record plus verdict into the canonical
    /// schema, enforcing the record invariants.
    ///
    /// Invariants:
    /// - cost is non-negative and finite
    /// - turn count is at least 1 unless a failure reason is set
    /// - exactly one of {verdict is defined, failure reason explains its
    ///   absence}: completed runs carry a verdict and no failure, failed
    ///   runs (budget or infrastructure) carry a failure and no verdict
    pub fn from_raw(
        raw: RawExecutionRecord,
        verdict: Option<Verdict>,
    ) -> Result<Self, RecorderError> {
        if !raw.cost_usd.is_finite() || raw.cost_usd < 0.0 {
            return Err(RecorderError::InvalidRecord(format!(
                "cost must be finite and non-negative, got {}",
                raw.cost_usd
            )));
        }

        match &raw.failure {
            None => {
                if verdict.is_none() {
                    return Err(RecorderError::InvalidRecord(
                        "completed run has no verdict".to_string(),
                    ));
                }
                if raw.turns == 0 {
                    return Err(RecorderError::InvalidRecord(
                        "completed run has zero turns".to_string(),
                    ));
                }
            }
            Some(_) => {
                if verdict.is_some() {
                    return Err(RecorderError::InvalidRecord(
                        "failed run cannot carry a verdict".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            attempt_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            task: raw.task,
            mode: raw.mode,
            model: raw.model,
            repetition: raw.repetition,
            cost_usd: raw.cost_usd,
            tokens: raw.tokens,
            turns: raw.turns,
            tool_calls: raw.tool_calls,
            answer: raw.answer,
            verdict,
            failure: raw.failure,
        })
    }

    /// Whether this attempt counts as correct. Failed or unscored runs
    /// never do.
    pub fn is_correct(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RawExecutionRecord;

    fn raw() -> RawExecutionRecord {
        RawExecutionRecord {
            task: "find-rate-limiter".to_string(),
            mode: Mode::Hybrid,
            model: "claude-sonnet-4-5".to_string(),
            repetition: 0,
            cost_usd: 0.1,
            tokens: TokenTotals::default(),
            turns: 3,
            tool_calls: Vec::new(),
            answer: "def rate_limit".to_string(),
            failure: None,
            duration_ms: 1200,
        }
    }

    fn verdict(correct: bool) -> Verdict {
        Verdict {
            correct,
            matched: Vec::new(),
            missing: Vec::new(),
        }
    }

    #[test]
    fn test_normal_completion_requires_verdict() {
        assert!(RunRecord::from_raw(raw(), None).is_err());
        assert!(RunRecord::from_raw(raw(), Some(verdict(true))).is_ok());
    }

    #[test]
    fn test_negative_cost_rejected() {
        let mut r = raw();
        r.cost_usd = -0.01;
        assert!(RunRecord::from_raw(r, Some(verdict(true))).is_err());
    }

    #[test]
    fn test_zero_turns_requires_failure() {
        let mut r = raw();
        r.turns = 0;
        assert!(RunRecord::from_raw(r.clone(), Some(verdict(false))).is_err());

        r.failure = Some(FailureReason::ExecutionError {
            message: "spawn failed".to_string(),
        });
        assert!(RunRecord::from_raw(r, None).is_ok());
    }

    #[test]
    fn test_budget_exceeded_counts_as_incorrect() {
        let mut r = raw();
        r.failure = Some(FailureReason::BudgetExceeded);
        assert!(RunRecord::from_raw(r.clone(), Some(verdict(true))).is_err());

        let record = RunRecord::from_raw(r, None).unwrap();
        assert!(!record.is_correct());
        // The partial answer stays recorded as best-effort text.
        assert_eq!(record.answer, "def rate_limit");
    }

    #[test]
    fn test_execution_error_cannot_carry_verdict() {
        let mut r = raw();
        r.failure = Some(FailureReason::ExecutionError {
            message: "timed out".to_string(),
        });
        assert!(RunRecord::from_raw(r, Some(verdict(false))).is_err());
    }
}
