//! Benchmark session driver.
//!
//! Expands the task corpus across modes and repetitions into independent
//! attempt units, runs them with bounded concurrency, and records every
//! terminal outcome (correct, incorrect, budget-killed, or crashed)
//! through a shared append-only writer. Units share no mutable state
//! beyond the writer's append lock, which is what lets repetitions be
//! treated as i.i.d. samples downstream.
//!
//! A failed run never aborts the batch; a session with individual failures
//! still produces a complete result set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::checker;
use crate::corpus::TaskRegistry;
use crate::error::{ExecutorError, RecorderError};
use crate::executor::{AgentRunner, AttemptRequest, RawExecutionRecord};
use crate::mode::Mode;
use crate::record::{FailureReason, ResultSetWriter, RunRecord, TokenTotals};

/// System prompt shared by every run in a session, identical across modes
/// and models so the comparison stays controlled.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are answering a question about the codebase in the current directory. \
Investigate with the tools available to you, then answer concisely. \
Name the exact files, functions, and symbols involved.";

/// Configuration for one benchmark session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Modes to run every task under.
    pub modes: Vec<Mode>,
    /// Repetitions per (task, mode) configuration.
    pub repetitions: u32,
    /// Monetary ceiling per attempt, USD.
    pub budget_cap_usd: f64,
    /// Fixed system prompt for every run.
    pub system_prompt: String,
    /// Directory containing one fixture checkout per task repo.
    pub fixtures_root: PathBuf,
    /// Name of the evaluated MCP server.
    pub nav_server: String,
    /// MCP configuration handed to the agent in nav-attached modes.
    pub mcp_config: Option<PathBuf>,
    /// Wall-clock ceiling per attempt.
    pub run_timeout: Duration,
    /// Maximum in-flight runs. Bounded by external API rate limits, not by
    /// anything in this system.
    pub concurrency: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modes: Mode::ALL.to_vec(),
            repetitions: 1,
            budget_cap_usd: 2.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fixtures_root: PathBuf::from("./fixtures"),
            nav_server: "nav".to_string(),
            mcp_config: None,
            run_timeout: Duration::from_secs(600),
            concurrency: 4,
        }
    }
}

/// Totals for one completed session, per model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub attempts: u32,
    pub correct: u32,
    pub failures: u32,
    pub total_cost_usd: f64,
    /// Path of the result set the session wrote.
    pub result_set: PathBuf,
}

/// Drives one benchmark session for one model.
pub struct BenchSession {
    config: SessionConfig,
}

impl BenchSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Runs every (task, mode, repetition) unit and appends each outcome
    /// to the writer.
    ///
    /// Only structural problems (a non-positive budget, an unwritable
    /// result set) abort the session; per-run failures are recorded and
    /// the batch continues.
    pub async fn run(
        &self,
        registry: &TaskRegistry,
        model: &str,
        runner: Arc<dyn AgentRunner>,
        writer: &ResultSetWriter,
    ) -> Result<SessionSummary, SessionError> {
        if !(self.config.budget_cap_usd > 0.0) {
            return Err(SessionError::Executor(ExecutorError::InvalidBudget(
                self.config.budget_cap_usd,
            )));
        }

        let requests = self.expand(registry, model);
        info!(
            model,
            tasks = registry.len(),
            units = requests.len(),
            concurrency = self.config.concurrency,
            "starting benchmark session"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut unit_futures = Vec::with_capacity(requests.len());
        for request in requests {
            let semaphore = semaphore.clone();
            let runner = runner.clone();
            unit_futures.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                run_unit(runner.as_ref(), request, writer).await
            });
        }

        let outcomes = futures::future::join_all(unit_futures).await;

        let mut summary = SessionSummary {
            result_set: writer.path().to_path_buf(),
            ..Default::default()
        };
        for outcome in outcomes {
            let record = outcome?;
            summary.attempts += 1;
            summary.total_cost_usd += record.cost_usd;
            if record.is_correct() {
                summary.correct += 1;
            }
            if record.failure.is_some() {
                summary.failures += 1;
            }
        }

        info!(
            model,
            attempts = summary.attempts,
            correct = summary.correct,
            failures = summary.failures,
            total_cost_usd = summary.total_cost_usd,
            "benchmark session finished"
        );

        Ok(summary)
    }

    /// Expands corpus x modes x repetitions into attempt requests.
    fn expand(&self, registry: &TaskRegistry, model: &str) -> Vec<AttemptRequest> {
        let mut requests = Vec::new();
        for task in registry.all() {
            for &mode in &self.config.modes {
                for repetition in 0..self.config.repetitions {
                    requests.push(AttemptRequest {
                        task: task.clone(),
                        mode,
                        model: model.to_string(),
                        repetition,
                        budget_cap_usd: self.config.budget_cap_usd,
                        system_prompt: self.config.system_prompt.clone(),
                        workdir: self.config.fixtures_root.join(&task.repo),
                        nav_server: self.config.nav_server.clone(),
                        mcp_config: self.config.mcp_config.clone(),
                        timeout: self.config.run_timeout,
                    });
                }
            }
        }
        requests
    }
}

/// Errors that abort a whole session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Executor misuse: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Recorder failure: {0}")]
    Recorder(#[from] RecorderError),
}

/// Runs one attempt to a terminal record and appends it.
async fn run_unit(
    runner: &dyn AgentRunner,
    request: AttemptRequest,
    writer: &ResultSetWriter,
) -> Result<RunRecord, SessionError> {
    let task = request.task.clone();

    let raw = match runner.execute(&request).await {
        Ok(raw) => raw,
        // Per-run setup problems (e.g. a missing fixture checkout) become
        // recorded execution errors so they stay visible in the report
        // instead of vanishing from the attempt counts.
        Err(e) => {
            error!(task = %task.name, mode = %request.mode, "run setup failed: {}", e);
            failed_raw(&request, e.to_string())
        }
    };

    // Failed runs (budget or infrastructure) carry no verdict and count
    // as incorrect attempts downstream.
    let verdict = match &raw.failure {
        None => Some(checker::check(&raw.answer, &task.ground_truth)),
        Some(_) => None,
    };

    let record = RunRecord::from_raw(raw, verdict)?;
    writer.append(&record).await?;
    Ok(record)
}

/// Synthesizes a terminal record for an attempt that never produced one.
fn failed_raw(request: &AttemptRequest, message: String) -> RawExecutionRecord {
    RawExecutionRecord {
        task: request.task.name.clone(),
        mode: request.mode,
        model: request.model.clone(),
        repetition: request.repetition,
        cost_usd: 0.0,
        tokens: TokenTotals::default(),
        turns: 0,
        tool_calls: Vec::new(),
        answer: String::new(),
        failure: Some(FailureReason::ExecutionError { message }),
        duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Difficulty, TaskSpec};
    use crate::record::ResultSetReader;
    use async_trait::async_trait;

    /// Canned runner: answers from a fixed table, no subprocess.
    struct StubRunner {
        answer_for: fn(&AttemptRequest) -> String,
    }

    #[async_trait]
    impl AgentRunner for StubRunner {
        fn name(&self) -> &str {
            "stub"
        }

        async fn execute(
            &self,
            request: &AttemptRequest,
        ) -> Result<RawExecutionRecord, ExecutorError> {
            Ok(RawExecutionRecord {
                task: request.task.name.clone(),
                mode: request.mode,
                model: request.model.clone(),
                repetition: request.repetition,
                cost_usd: 0.01,
                tokens: TokenTotals::default(),
                turns: 2,
                tool_calls: Vec::new(),
                answer: (self.answer_for)(request),
                failure: None,
                duration_ms: 5,
            })
        }
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry
            .register(TaskSpec {
                name: "find-rate-limiter".to_string(),
                repo: "fastapi".to_string(),
                prompt: "Where is rate limiting implemented?".to_string(),
                ground_truth: vec!["rate_limit".to_string()],
                difficulty: Difficulty::Easy,
            })
            .unwrap();
        registry
    }

    fn config(fixtures_root: PathBuf) -> SessionConfig {
        SessionConfig {
            modes: vec![Mode::Baseline, Mode::Hybrid],
            repetitions: 3,
            fixtures_root,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_session_records_every_unit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fastapi")).unwrap();
        let writer = ResultSetWriter::create(dir.path(), "stub-model")
            .await
            .unwrap();

        let session = BenchSession::new(config(dir.path().to_path_buf()));
        let runner = Arc::new(StubRunner {
            answer_for: |_| "def rate_limit(...)".to_string(),
        });

        let summary = session
            .run(&registry(), "stub-model", runner, &writer)
            .await
            .unwrap();

        // 1 task x 2 modes x 3 repetitions.
        assert_eq!(summary.attempts, 6);
        assert_eq!(summary.correct, 6);
        assert_eq!(summary.failures, 0);

        let records = ResultSetReader::read_all(writer.path()).unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.is_correct()));
    }

    #[tokio::test]
    async fn test_missing_fixture_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // No fixture checkout created: the claude runner would refuse the
        // workdir; the stub runner here doesn't touch it, so use the real
        // validation path through a runner that validates.
        struct ValidatingStub;

        #[async_trait]
        impl AgentRunner for ValidatingStub {
            fn name(&self) -> &str {
                "validating-stub"
            }

            async fn execute(
                &self,
                request: &AttemptRequest,
            ) -> Result<RawExecutionRecord, ExecutorError> {
                request.validate()?;
                unreachable!("fixture is missing, validate always fails")
            }
        }

        let writer = ResultSetWriter::create(dir.path(), "stub-model")
            .await
            .unwrap();
        let mut cfg = config(dir.path().join("nonexistent-fixtures"));
        cfg.modes = vec![Mode::Baseline];
        cfg.repetitions = 2;

        let session = BenchSession::new(cfg);
        let summary = session
            .run(&registry(), "stub-model", Arc::new(ValidatingStub), &writer)
            .await
            .unwrap();

        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.correct, 0);
        assert_eq!(summary.failures, 2);

        let records = ResultSetReader::read_all(writer.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.failure.is_some()));
        assert!(records.iter().all(|r| r.verdict.is_none()));
    }

    #[tokio::test]
    async fn test_non_positive_budget_aborts_session() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultSetWriter::create(dir.path(), "stub-model")
            .await
            .unwrap();
        let mut cfg = config(dir.path().to_path_buf());
        cfg.budget_cap_usd = 0.0;

        let session = BenchSession::new(cfg);
        let runner = Arc::new(StubRunner {
            answer_for: |_| String::new(),
        });
        let result = session.run(&registry(), "stub-model", runner, &writer).await;
        assert!(matches!(
            result,
            Err(SessionError::Executor(ExecutorError::InvalidBudget(_)))
        ));
    }
}
