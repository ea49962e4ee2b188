//! Task specification types.

use serde::{Deserialize, Serialize};

/// The difficulty tier of a benchmark task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        write!(f, "{}", name)
    }
}

/// An immutable benchmark task definition.
///
/// A task asks one fixed question about one fixture repository and names
/// the literal strings a correct answer must contain. Specs are loaded at
/// session startup and never mutated; run records copy the fields they
/// need so historical results stay interpretable if the corpus evolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task name (registry key).
    pub name: String,
    /// Identifier of the fixture repository the question is about.
    pub repo: String,
    /// Natural-language question posed to the agent.
    pub prompt: String,
    /// Literal strings a correct answer must contain. Never empty.
    pub ground_truth: Vec<String>,
    /// Difficulty tier.
    pub difficulty: Difficulty,
}

impl TaskSpec {
    /// Validates the spec for registration.
    ///
    /// A task with no verifiable ground truth cannot be scored, and an
    /// empty ground-truth string would match every answer.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("task name is empty".to_string());
        }
        if self.ground_truth.is_empty() {
            return Err("ground truth set is empty".to_string());
        }
        if self.ground_truth.iter().any(|s| s.is_empty()) {
            return Err("ground truth contains an empty string".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ground_truth: Vec<&str>) -> TaskSpec {
        TaskSpec {
            name: "find-rate-limiter".to_string(),
            repo: "fastapi".to_string(),
            prompt: "Where is request rate limiting implemented?".to_string(),
            ground_truth: ground_truth.into_iter().map(String::from).collect(),
            difficulty: Difficulty::Easy,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec(vec!["rate_limit"]).validate().is_ok());
    }

    #[test]
    fn test_empty_ground_truth_rejected() {
        assert!(spec(vec![]).validate().is_err());
    }

    #[test]
    fn test_empty_ground_truth_entry_rejected() {
        assert!(spec(vec!["rate_limit", ""]).validate().is_err());
    }
}
