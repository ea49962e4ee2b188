//! Version comparison between two result sets.
//!
//! Takes the aggregated metrics of two benchmark sessions (e.g. old vs.
//! new tool version) and classifies each shared (task, mode, model) group
//! with a deterministic precedence: a large accuracy gap wins outright,
//! otherwise a meaningful cost-per-correct gap decides, otherwise the
//! group is a tie. Groups present in only one set are reported separately,
//! never silently dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{CostPerCorrect, GroupKey, TaskMetrics};

/// Accuracy gap (absolute, in probability) that must be exceeded for an
/// accuracy win.
pub const ACCURACY_WIN_MARGIN: f64 = 0.15;

/// Relative cost-per-correct gap at which the cheaper side wins.
pub const COST_WIN_MARGIN: f64 = 0.10;

/// Guards the margins against float noise: an exact 15pp gap (which
/// subtraction can render as 0.15000000000000002) must not count as
/// exceeding the margin.
const EPS: f64 = 1e-9;

/// Which result set a classification favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

/// Classification of one compared group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "label", content = "winner", rename_all = "snake_case")]
pub enum Outcome {
    /// Accuracy difference exceeds the margin; the more accurate side wins.
    AccuracyWin(Side),
    /// Cost-per-correct differs by at least the relative margin; the
    /// cheaper side wins.
    CostWin(Side),
    Tie,
}

/// Side-by-side metrics for one group present in both sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub key: GroupKey,
    pub a: TaskMetrics,
    pub b: TaskMetrics,
    /// `a.accuracy - b.accuracy`.
    pub accuracy_delta: f64,
    /// Relative cost-per-correct gap against the more expensive side, when
    /// both sides are finite.
    pub cost_gap: Option<f64>,
    pub outcome: Outcome,
}

/// Full comparison of two result sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// Groups present in both sets, ordered by key.
    pub records: Vec<ComparisonRecord>,
    /// Groups only set A observed. Non-comparable.
    pub only_in_a: Vec<GroupKey>,
    /// Groups only set B observed. Non-comparable.
    pub only_in_b: Vec<GroupKey>,
}

/// Relative gap between two finite costs, against the more expensive one.
/// None when either side is unbounded or both costs are zero.
fn relative_cost_gap(a: &CostPerCorrect, b: &CostPerCorrect) -> Option<f64> {
    let (ca, cb) = (a.finite()?, b.finite()?);
    let hi = ca.max(cb);
    if hi <= 0.0 {
        return Some(0.0);
    }
    Some((ca - cb).abs() / hi)
}

/// Classifies one group pair by the precedence rules.
pub fn classify(a: &TaskMetrics, b: &TaskMetrics) -> Outcome {
    // Rule 1: accuracy difference beyond the margin decides outright.
    let delta = a.accuracy - b.accuracy;
    if delta.abs() > ACCURACY_WIN_MARGIN + EPS {
        return Outcome::AccuracyWin(if delta > 0.0 { Side::A } else { Side::B });
    }

    // Rule 2: cost-per-correct. Unbounded compares above any finite value,
    // so a finite side always clears the relative margin against it; two
    // unbounded sides tie on cost.
    match (
        a.cost_per_correct.finite(),
        b.cost_per_correct.finite(),
    ) {
        (None, None) => Outcome::Tie,
        (Some(_), None) => Outcome::CostWin(Side::A),
        (None, Some(_)) => Outcome::CostWin(Side::B),
        (Some(ca), Some(cb)) => {
            let gap = relative_cost_gap(&a.cost_per_correct, &b.cost_per_correct)
                .unwrap_or(0.0);
            if gap >= COST_WIN_MARGIN - EPS {
                Outcome::CostWin(if ca < cb { Side::A } else { Side::B })
            } else {
                Outcome::Tie
            }
        }
    }
}

/// Compares two aggregated result sets group by group.
pub fn compare(
    a: &BTreeMap<GroupKey, TaskMetrics>,
    b: &BTreeMap<GroupKey, TaskMetrics>,
) -> Comparison {
    let mut records = Vec::new();
    let mut only_in_a = Vec::new();
    let mut only_in_b = Vec::new();

    for (key, metrics_a) in a {
        match b.get(key) {
            Some(metrics_b) => {
                records.push(ComparisonRecord {
                    key: key.clone(),
                    a: metrics_a.clone(),
                    b: metrics_b.clone(),
                    accuracy_delta: metrics_a.accuracy - metrics_b.accuracy,
                    cost_gap: relative_cost_gap(
                        &metrics_a.cost_per_correct,
                        &metrics_b.cost_per_correct,
                    ),
                    outcome: classify(metrics_a, metrics_b),
                });
            }
            None => only_in_a.push(key.clone()),
        }
    }

    for key in b.keys() {
        if !a.contains_key(key) {
            only_in_b.push(key.clone());
        }
    }

    Comparison {
        records,
        only_in_a,
        only_in_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    fn metrics(accuracy: f64, cost_per_correct: CostPerCorrect) -> TaskMetrics {
        TaskMetrics {
            attempts: 10,
            correct: (accuracy * 10.0).round() as u32,
            failures: 0,
            accuracy,
            avg_cost_usd: 0.1,
            cost_per_correct,
            avg_turns: 5.0,
            avg_tool_calls: 3.0,
            avg_context_tokens: 10_000.0,
            tool_adoption: 0.5,
        }
    }

    fn key(task: &str) -> GroupKey {
        GroupKey {
            task: task.to_string(),
            mode: Mode::Hybrid,
            model: "claude-sonnet-4-5".to_string(),
        }
    }

    #[test]
    fn test_sixteen_point_gap_is_accuracy_win() {
        let a = metrics(1.0, CostPerCorrect::Finite(0.10));
        let b = metrics(0.84, CostPerCorrect::Finite(0.05));
        // Accuracy outranks cost even though B is cheaper.
        assert_eq!(classify(&a, &b), Outcome::AccuracyWin(Side::A));
    }

    #[test]
    fn test_fifteen_point_gap_is_not_accuracy_win() {
        let a = metrics(1.0, CostPerCorrect::Finite(0.10));
        let b = metrics(0.85, CostPerCorrect::Finite(0.10));
        assert_eq!(classify(&a, &b), Outcome::Tie);
    }

    #[test]
    fn test_ten_point_gap_with_cost_gap_is_cost_win() {
        let a = metrics(1.0, CostPerCorrect::Finite(0.09));
        let b = metrics(0.90, CostPerCorrect::Finite(0.10));
        assert_eq!(classify(&a, &b), Outcome::CostWin(Side::A));
    }

    #[test]
    fn test_small_cost_gap_is_tie() {
        let a = metrics(0.9, CostPerCorrect::Finite(0.100));
        let b = metrics(0.9, CostPerCorrect::Finite(0.095));
        assert_eq!(classify(&a, &b), Outcome::Tie);
    }

    #[test]
    fn test_finite_beats_unbounded_on_cost() {
        // Accuracy gap (10pp) is under the margin, so cost decides.
        let a = metrics(0.1, CostPerCorrect::Finite(1.0));
        let b = metrics(0.0, CostPerCorrect::Unbounded);
        assert_eq!(classify(&a, &b), Outcome::CostWin(Side::A));
    }

    #[test]
    fn test_two_unbounded_tie() {
        let a = metrics(0.0, CostPerCorrect::Unbounded);
        let b = metrics(0.0, CostPerCorrect::Unbounded);
        assert_eq!(classify(&a, &b), Outcome::Tie);
    }

    #[test]
    fn test_accuracy_win_favors_b() {
        let a = metrics(0.5, CostPerCorrect::Finite(0.10));
        let b = metrics(0.9, CostPerCorrect::Finite(0.50));
        assert_eq!(classify(&a, &b), Outcome::AccuracyWin(Side::B));
    }

    #[test]
    fn test_non_comparable_groups_reported() {
        let mut a = BTreeMap::new();
        let mut b = BTreeMap::new();
        a.insert(key("shared"), metrics(1.0, CostPerCorrect::Finite(0.1)));
        a.insert(key("a-only"), metrics(1.0, CostPerCorrect::Finite(0.1)));
        b.insert(key("shared"), metrics(1.0, CostPerCorrect::Finite(0.1)));
        b.insert(key("b-only"), metrics(0.5, CostPerCorrect::Finite(0.2)));

        let comparison = compare(&a, &b);
        assert_eq!(comparison.records.len(), 1);
        assert_eq!(comparison.records[0].key, key("shared"));
        assert_eq!(comparison.only_in_a, vec![key("a-only")]);
        assert_eq!(comparison.only_in_b, vec![key("b-only")]);
    }

    #[test]
    fn test_records_ordered_by_key() {
        let mut a = BTreeMap::new();
        let mut b = BTreeMap::new();
        for task in ["zeta", "alpha", "mid"] {
            a.insert(key(task), metrics(1.0, CostPerCorrect::Finite(0.1)));
            b.insert(key(task), metrics(1.0, CostPerCorrect::Finite(0.1)));
        }
        let comparison = compare(&a, &b);
        let tasks: Vec<&str> = comparison
            .records
            .iter()
            .map(|r| r.key.task.as_str())
            .collect();
        assert_eq!(tasks, vec!["alpha", "mid", "zeta"]);
    }
}
