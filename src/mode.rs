//! Tool-availability modes for benchmark runs.
//!
//! A mode describes which tool capabilities are exposed to the agent for a
//! single run. It is a closed configuration value: every run record carries
//! its mode, and aggregation groups by it.

use serde::{Deserialize, Serialize};

/// Which tool-set the agent may use during a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Host built-in tools only; the navigation server is not attached.
    Baseline,
    /// Built-in tools plus the navigation tool-set.
    Hybrid,
    /// Navigation tool-set with the host's search/read built-ins disallowed.
    Forced,
}

impl Mode {
    /// All modes, in the order they are reported.
    pub const ALL: [Mode; 3] = [Mode::Baseline, Mode::Hybrid, Mode::Forced];

    /// Returns the display name for this mode.
    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Hybrid => "hybrid",
            Mode::Forced => "forced",
        }
    }

    /// Whether the navigation server is attached to the agent in this mode.
    pub fn attaches_nav_server(&self) -> bool {
        matches!(self, Mode::Hybrid | Mode::Forced)
    }

    /// Whether the host's built-in search/read tools are disallowed.
    pub fn disallows_builtin_search(&self) -> bool {
        matches!(self, Mode::Forced)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(Mode::Baseline),
            "hybrid" => Ok(Mode::Hybrid),
            "forced" | "forced-exclusive" => Ok(Mode::Forced),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for mode in Mode::ALL {
            let parsed: Mode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_forced_exclusive_alias() {
        let parsed: Mode = "forced-exclusive".parse().unwrap();
        assert_eq!(parsed, Mode::Forced);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!("yolo".parse::<Mode>().is_err());
    }

    #[test]
    fn test_tool_wiring() {
        assert!(!Mode::Baseline.attaches_nav_server());
        assert!(Mode::Hybrid.attaches_nav_server());
        assert!(Mode::Forced.disallows_builtin_search());
        assert!(!Mode::Hybrid.disallows_builtin_search());
    }
}
