//! Correctness checking for agent answers.
//!
//! The policy is deliberately strict: an answer is correct iff every
//! ground-truth string occurs as a literal, case-sensitive substring of the
//! answer text. No case folding, no whitespace collapsing, no tokenization.
//! Strictness trades recall for zero interpretation ambiguity, and keeping
//! the match literal means published numbers never shift under a smarter
//! matcher.

use crate::record::Verdict;

/// Scores an answer against a task's ground-truth strings.
///
/// Pure and deterministic. An empty answer is always incorrect (an empty
/// ground-truth set is rejected at registration, so vacuous truth never
/// arises from a valid task).
pub fn check(answer: &str, ground_truth: &[String]) -> Verdict {
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for needle in ground_truth {
        if !answer.is_empty() && answer.contains(needle.as_str()) {
            matched.push(needle.clone());
        } else {
            missing.push(needle.clone());
        }
    }

    Verdict {
        correct: !ground_truth.is_empty() && missing.is_empty(),
        matched,
        missing,
    }
}
