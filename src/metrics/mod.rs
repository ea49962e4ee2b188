//! Metrics aggregation over result sets.
//!
//! Turns many noisy individual attempts into per-(task, mode, model)
//! statistics. The defining derived metric is **cost-per-correct**: the
//! expected total spend to obtain one correct answer under a geometric
//! independent-retry model, `avg_cost / accuracy`. A group with zero
//! successes has unbounded expected cost, represented by a distinguished
//! sentinel rather than a numeric error.
//!
//! Aggregation is a read-only, single-pass view over a closed result set;
//! metrics are recomputed on demand and never persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::mode::Mode;
use crate::record::{RunRecord, ToolOrigin};

/// Grouping key for aggregation: one configuration of one task.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupKey {
    pub task: String,
    pub mode: Mode,
    pub model: String,
}

impl GroupKey {
    pub fn of(record: &RunRecord) -> Self {
        Self {
            task: record.task.clone(),
            mode: record.mode,
            model: record.model.clone(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.task, self.mode, self.model)
    }
}

/// Expected spend to reach one correct answer.
///
/// `Unbounded` marks groups with zero successes: under independent retries
/// with success probability zero, no finite spend reaches a correct
/// answer. It compares strictly greater than any finite value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPerCorrect {
    Finite(f64),
    Unbounded,
}

impl CostPerCorrect {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, CostPerCorrect::Unbounded)
    }

    /// The finite value, if any.
    pub fn finite(&self) -> Option<f64> {
        match self {
            CostPerCorrect::Finite(v) => Some(*v),
            CostPerCorrect::Unbounded => None,
        }
    }
}

impl PartialOrd for CostPerCorrect {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        use CostPerCorrect::*;
        match (self, other) {
            (Finite(a), Finite(b)) => a.partial_cmp(b),
            (Finite(_), Unbounded) => Some(std::cmp::Ordering::Less),
            (Unbounded, Finite(_)) => Some(std::cmp::Ordering::Greater),
            (Unbounded, Unbounded) => Some(std::cmp::Ordering::Equal),
        }
    }
}

impl std::fmt::Display for CostPerCorrect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostPerCorrect::Finite(v) => write!(f, "{:.4}", v),
            CostPerCorrect::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Derived per-group statistics. A view over a result set, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Attempts observed, including failed runs.
    pub attempts: u32,
    /// Attempts with a correct verdict.
    pub correct: u32,
    /// Attempts that ended in a failure reason.
    pub failures: u32,
    /// correct / attempts.
    pub accuracy: f64,
    /// Mean cost per attempt in USD.
    pub avg_cost_usd: f64,
    /// avg_cost / accuracy, or unbounded when accuracy is zero.
    pub cost_per_correct: CostPerCorrect,
    /// Mean assistant turns per attempt.
    pub avg_turns: f64,
    /// Mean tool calls per attempt.
    pub avg_tool_calls: f64,
    /// Mean context tokens processed per attempt.
    pub avg_context_tokens: f64,
    /// Fraction of tool calls in the group that used the evaluated
    /// tool-set. Zero when the group made no tool calls.
    pub tool_adoption: f64,
}

/// Computes metrics for one group of attempts.
///
/// # Errors
/// Returns `EmptyGroup` for zero attempts: asking for metrics on nothing
/// is caller misuse, distinct from the well-defined zero-accuracy case.
pub fn group_metrics(records: &[&RunRecord]) -> Result<TaskMetrics, MetricsError> {
    if records.is_empty() {
        return Err(MetricsError::EmptyGroup);
    }

    let n = records.len() as f64;
    let correct = records.iter().filter(|r| r.is_correct()).count() as u32;
    let failures = records.iter().filter(|r| r.failure.is_some()).count() as u32;

    let total_cost: f64 = records.iter().map(|r| r.cost_usd).sum();
    let accuracy = correct as f64 / n;
    let avg_cost_usd = total_cost / n;

    let cost_per_correct = if correct > 0 {
        CostPerCorrect::Finite(avg_cost_usd / accuracy)
    } else {
        CostPerCorrect::Unbounded
    };

    let total_tool_calls: usize = records.iter().map(|r| r.tool_calls.len()).sum();
    let evaluated_calls = records
        .iter()
        .flat_map(|r| r.tool_calls.iter())
        .filter(|c| c.origin == ToolOrigin::Evaluated)
        .count();
    let tool_adoption = if total_tool_calls > 0 {
        evaluated_calls as f64 / total_tool_calls as f64
    } else {
        0.0
    };

    Ok(TaskMetrics {
        attempts: records.len() as u32,
        correct,
        failures,
        accuracy,
        avg_cost_usd,
        cost_per_correct,
        avg_turns: records.iter().map(|r| r.turns as f64).sum::<f64>() / n,
        avg_tool_calls: total_tool_calls as f64 / n,
        avg_context_tokens: records
            .iter()
            .map(|r| r.tokens.context() as f64)
            .sum::<f64>()
            / n,
        tool_adoption,
    })
}

/// Aggregates a result set into per-(task, mode, model) metrics.
///
/// Deterministic: the map iterates in key order, and aggregating the same
/// immutable set twice yields identical metrics.
pub fn aggregate(records: &[RunRecord]) -> Result<BTreeMap<GroupKey, TaskMetrics>, MetricsError> {
    let mut groups: BTreeMap<GroupKey, Vec<&RunRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(GroupKey::of(record)).or_default().push(record);
    }

    let mut metrics = BTreeMap::new();
    for (key, group) in groups {
        metrics.insert(key, group_metrics(&group)?);
    }
    Ok(metrics)
}
