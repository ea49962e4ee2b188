//! Run execution: one isolated agent attempt per call.
//!
//! The executor drives a single (task, mode, model, repetition) attempt:
//! it launches one external agent process with a fixed system prompt and a
//! monetary budget ceiling, captures the full interaction trace, and
//! returns a raw execution record. Budget exhaustion and agent crashes are
//! first-class outcomes carried inside the record; only structural misuse
//! (non-positive budget, missing fixture) surfaces as an error.
//!
//! The concrete transport lives behind the [`AgentRunner`] trait so tests
//! can substitute doubles that return canned records deterministically.

pub mod claude;
pub mod codex;
pub mod pricing;
pub mod trace;

pub use claude::ClaudeRunner;
pub use codex::CodexRunner;
pub use pricing::ModelPricing;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};

use crate::corpus::TaskSpec;
use crate::error::ExecutorError;
use crate::mode::Mode;
use crate::record::{FailureReason, TokenTotals, ToolCallRecord, ToolOrigin};

use trace::{ParsedTrace, TraceError};

/// Supported agent CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Claude Code (`claude -p`).
    Claude,
    /// Codex CLI (`codex exec`).
    Codex,
}

impl AgentKind {
    /// Builds the runner for this agent kind.
    pub fn runner(&self) -> Box<dyn AgentRunner> {
        match self {
            AgentKind::Claude => Box::new(ClaudeRunner::new()),
            AgentKind::Codex => Box::new(CodexRunner::new()),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for AgentKind {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            other => Err(ExecutorError::UnknownAgent(other.to_string())),
        }
    }
}

/// Everything one attempt needs, passed explicitly so a single process can
/// run many configurations concurrently without ambient state.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    /// The task under test (copied from the registry).
    pub task: TaskSpec,
    /// Tool-availability mode.
    pub mode: Mode,
    /// Model identifier handed to the agent CLI.
    pub model: String,
    /// Repetition index, recorded for i.i.d. sampling.
    pub repetition: u32,
    /// Monetary ceiling for this single attempt, in USD. Must be positive.
    pub budget_cap_usd: f64,
    /// Fixed system prompt, identical across modes/models in a session.
    pub system_prompt: String,
    /// Fixture repository checkout the agent runs in. Read-only from the
    /// harness's perspective.
    pub workdir: PathBuf,
    /// Name of the evaluated MCP server; tool calls belonging to it are
    /// flagged as evaluated-origin.
    pub nav_server: String,
    /// MCP server configuration handed to the agent in nav-attached modes.
    pub mcp_config: Option<PathBuf>,
    /// Wall-clock ceiling for the attempt.
    pub timeout: Duration,
}

impl AttemptRequest {
    /// Validates structural inputs before spawning anything.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if !(self.budget_cap_usd > 0.0) {
            return Err(ExecutorError::InvalidBudget(self.budget_cap_usd));
        }
        if !self.workdir.is_dir() {
            return Err(ExecutorError::FixtureNotFound(
                self.workdir.display().to_string(),
            ));
        }
        Ok(())
    }
}

/// Raw outcome of one execution attempt, before correctness scoring.
#[derive(Debug, Clone)]
pub struct RawExecutionRecord {
    pub task: String,
    pub mode: Mode,
    pub model: String,
    pub repetition: u32,
    /// Cost incurred, in USD. For budget-killed runs this is the partial
    /// cost already spent.
    pub cost_usd: f64,
    pub tokens: TokenTotals,
    pub turns: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Final answer, or the best-effort partial answer on failure.
    pub answer: String,
    pub failure: Option<FailureReason>,
    pub duration_ms: u64,
}

/// One attempt, one process, no internal retry.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Executes one isolated attempt and returns its raw record.
    async fn execute(&self, request: &AttemptRequest) -> Result<RawExecutionRecord, ExecutorError>;
}

/// Normalizes a parsed trace into a raw execution record, classifying each
/// tool call's origin against the evaluated server name.
pub(crate) fn raw_from_trace(
    request: &AttemptRequest,
    trace: ParsedTrace,
    cost_usd: f64,
    failure: Option<FailureReason>,
    duration: Duration,
) -> RawExecutionRecord {
    let tool_calls = trace
        .tool_calls()
        .map(|call| ToolCallRecord {
            name: call.name.clone(),
            origin: if call.server.as_deref() == Some(request.nav_server.as_str()) {
                ToolOrigin::Evaluated
            } else {
                ToolOrigin::Builtin
            },
        })
        .collect();

    RawExecutionRecord {
        task: request.task.name.clone(),
        mode: request.mode,
        model: request.model.clone(),
        repetition: request.repetition,
        cost_usd,
        tokens: trace.totals,
        turns: trace.num_turns,
        tool_calls,
        answer: trace.answer,
        failure,
        duration_ms: duration.as_millis() as u64,
    }
}

/// Incremental event parser, implemented by both stream shapes.
pub(crate) trait EventParser {
    fn feed_line(&mut self, line: &str) -> Result<(), TraceError>;
    fn running_totals(&self) -> TokenTotals;
}

impl EventParser for trace::ClaudeStreamParser {
    fn feed_line(&mut self, line: &str) -> Result<(), TraceError> {
        trace::ClaudeStreamParser::feed_line(self, line)
    }
    fn running_totals(&self) -> TokenTotals {
        trace::ClaudeStreamParser::running_totals(self)
    }
}

impl EventParser for trace::CodexStreamParser {
    fn feed_line(&mut self, line: &str) -> Result<(), TraceError> {
        trace::CodexStreamParser::feed_line(self, line)
    }
    fn running_totals(&self) -> TokenTotals {
        trace::CodexStreamParser::running_totals(self)
    }
}

/// Drives an agent child process to a terminal state: feeds its stdout
/// through the parser, enforces the budget ceiling on the running cost
/// estimate, and kills the child on budget or timeout.
///
/// Returns the failure reason, if the run did not end normally.
pub(crate) async fn drive_stream<P: EventParser>(
    child: &mut Child,
    parser: &mut P,
    pricing: &ModelPricing,
    budget_cap_usd: f64,
    deadline: tokio::time::Instant,
) -> Option<FailureReason> {
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            return Some(FailureReason::ExecutionError {
                message: "agent stdout was not captured".to_string(),
            })
        }
    };
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match tokio::time::timeout_at(deadline, lines.next_line()).await {
            // Wall-clock ceiling hit.
            Err(_) => {
                kill_child(child).await;
                return Some(FailureReason::ExecutionError {
                    message: "agent timed out".to_string(),
                });
            }
            // Stream closed normally.
            Ok(Ok(None)) => return None,
            Ok(Ok(Some(line))) => {
                if let Err(e) = parser.feed_line(&line) {
                    kill_child(child).await;
                    return Some(FailureReason::ExecutionError {
                        message: e.to_string(),
                    });
                }
                let running = pricing.estimate(&parser.running_totals());
                if running > budget_cap_usd {
                    debug!(
                        running_cost = running,
                        budget = budget_cap_usd,
                        "budget ceiling crossed, terminating agent"
                    );
                    kill_child(child).await;
                    return Some(FailureReason::BudgetExceeded);
                }
            }
            Ok(Err(e)) => {
                kill_child(child).await;
                return Some(FailureReason::ExecutionError {
                    message: format!("failed reading agent stdout: {}", e),
                });
            }
        }
    }
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to kill agent process: {}", e);
    }
}

/// Waits for the child to exit after its stream closed; a non-zero exit is
/// an execution error carrying the stderr tail.
pub(crate) async fn wait_for_exit(
    child: &mut Child,
    stderr_tail: &str,
) -> Option<FailureReason> {
    // Grace period: the stream already closed, exit should be imminent.
    match tokio::time::timeout(Duration::from_secs(10), child.wait()).await {
        Ok(Ok(status)) if status.success() => None,
        Ok(Ok(status)) => Some(FailureReason::ExecutionError {
            message: format!(
                "agent exited with {}: {}",
                status.code().unwrap_or(-1),
                stderr_tail
            ),
        }),
        Ok(Err(e)) => Some(FailureReason::ExecutionError {
            message: format!("failed waiting for agent: {}", e),
        }),
        Err(_) => {
            kill_child(child).await;
            Some(FailureReason::ExecutionError {
                message: "agent did not exit after closing its stream".to_string(),
            })
        }
    }
}

/// Keeps the last `limit` bytes of captured stderr for error messages.
pub(crate) fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.trim().to_string();
    }
    let start = text.len() - limit;
    // Don't split a UTF-8 character.
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    text[start..].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Difficulty;

    fn request() -> AttemptRequest {
        AttemptRequest {
            task: TaskSpec {
                name: "find-rate-limiter".to_string(),
                repo: "fastapi".to_string(),
                prompt: "Where is rate limiting implemented?".to_string(),
                ground_truth: vec!["rate_limit".to_string()],
                difficulty: Difficulty::Easy,
            },
            mode: Mode::Hybrid,
            model: "claude-sonnet-4-5".to_string(),
            repetition: 0,
            budget_cap_usd: 1.0,
            system_prompt: "Answer with file and symbol names.".to_string(),
            workdir: std::env::temp_dir(),
            nav_server: "nav".to_string(),
            mcp_config: None,
            timeout: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_non_positive_budget_rejected() {
        let mut req = request();
        req.budget_cap_usd = 0.0;
        assert!(matches!(
            req.validate(),
            Err(ExecutorError::InvalidBudget(_))
        ));
    }

    #[test]
    fn test_missing_fixture_rejected() {
        let mut req = request();
        req.workdir = PathBuf::from("/definitely/not/a/dir");
        assert!(matches!(
            req.validate(),
            Err(ExecutorError::FixtureNotFound(_))
        ));
    }

    #[test]
    fn test_origin_classification() {
        let trace = trace::parse_claude_stream(
            r#"{"type":"assistant","message":{"usage":{"input_tokens":1,"output_tokens":1},"content":[{"type":"tool_use","name":"mcp__nav__search_code"},{"type":"tool_use","name":"mcp__other__lookup"},{"type":"tool_use","name":"Grep"},{"type":"text","text":"done"}]}}"#,
        )
        .unwrap();

        let raw = raw_from_trace(&request(), trace, 0.01, None, Duration::from_secs(1));
        let origins: Vec<ToolOrigin> = raw.tool_calls.iter().map(|c| c.origin).collect();
        assert_eq!(
            origins,
            vec![ToolOrigin::Evaluated, ToolOrigin::Builtin, ToolOrigin::Builtin]
        );
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!("claude".parse::<AgentKind>().unwrap(), AgentKind::Claude);
        assert_eq!("codex".parse::<AgentKind>().unwrap(), AgentKind::Codex);
        assert!("aider".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_tail_keeps_suffix() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
    }
}
