//! End-to-end pipeline tests.
//!
//! Exercises the full Run -> Record -> Aggregate -> Compare flow with a
//! canned agent runner: no subprocess, deterministic traces, real
//! append-only result sets on disk.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use navbench::checker;
use navbench::compare::{compare, Outcome, Side};
use navbench::corpus::{Difficulty, TaskRegistry, TaskSpec};
use navbench::error::ExecutorError;
use navbench::executor::{AgentRunner, AttemptRequest, RawExecutionRecord};
use navbench::metrics::aggregate;
use navbench::mode::Mode;
use navbench::record::{
    FailureReason, ResultSetReader, ResultSetWriter, RunRecord, TokenTotals, ToolCallRecord,
    ToolOrigin,
};
use navbench::session::{BenchSession, SessionConfig};

/// Scripted runner: one canned outcome per (task, mode, repetition).
struct ScriptedRunner {
    script: fn(&AttemptRequest) -> RawExecutionRecord,
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, request: &AttemptRequest) -> Result<RawExecutionRecord, ExecutorError> {
        request.validate()?;
        Ok((self.script)(request))
    }
}

fn completed(request: &AttemptRequest, answer: &str, cost: f64) -> RawExecutionRecord {
    RawExecutionRecord {
        task: request.task.name.clone(),
        mode: request.mode,
        model: request.model.clone(),
        repetition: request.repetition,
        cost_usd: cost,
        tokens: TokenTotals {
            input: 2_000,
            output: 400,
            cache_creation: 8_000,
            cache_read: 30_000,
        },
        turns: 5,
        tool_calls: vec![
            ToolCallRecord {
                name: "mcp__nav__search_code".to_string(),
                origin: ToolOrigin::Evaluated,
            },
            ToolCallRecord {
                name: "Read".to_string(),
                origin: ToolOrigin::Builtin,
            },
        ],
        answer: answer.to_string(),
        failure: None,
        duration_ms: 1_000,
    }
}

fn corpus() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(TaskSpec {
            name: "find-rate-limiter".to_string(),
            repo: "webapp".to_string(),
            prompt: "Where is request rate limiting implemented?".to_string(),
            ground_truth: vec!["rate_limit".to_string()],
            difficulty: Difficulty::Easy,
        })
        .unwrap();
    registry
        .register(TaskSpec {
            name: "trace-auth-flow".to_string(),
            repo: "webapp".to_string(),
            prompt: "Which middleware authenticates API requests?".to_string(),
            ground_truth: vec!["AuthMiddleware".to_string()],
            difficulty: Difficulty::Hard,
        })
        .unwrap();
    registry
}

fn session_config(fixtures: &TempDir) -> SessionConfig {
    SessionConfig {
        modes: vec![Mode::Baseline, Mode::Hybrid],
        repetitions: 2,
        fixtures_root: fixtures.path().to_path_buf(),
        ..Default::default()
    }
}

fn make_fixtures() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("webapp")).unwrap();
    dir
}

async fn run_session(
    script: fn(&AttemptRequest) -> RawExecutionRecord,
    fixtures: &TempDir,
    out: &TempDir,
    model: &str,
) -> PathBuf {
    let writer = ResultSetWriter::create(out.path(), model).await.unwrap();
    let session = BenchSession::new(session_config(fixtures));
    session
        .run(
            &corpus(),
            model,
            Arc::new(ScriptedRunner { script }),
            &writer,
        )
        .await
        .unwrap();
    writer.path().to_path_buf()
}

#[tokio::test]
async fn test_full_pipeline_records_aggregates() {
    let fixtures = make_fixtures();
    let out = tempfile::tempdir().unwrap();

    // Hybrid runs find the answer; baseline runs miss the exact symbol.
    let path = run_session(
        |request| match (request.task.name.as_str(), request.mode) {
            ("find-rate-limiter", Mode::Hybrid) => {
                completed(request, "It is in def rate_limit() in middleware.py", 0.10)
            }
            ("find-rate-limiter", Mode::Baseline) => {
                completed(request, "The app does rate limiting in middleware", 0.05)
            }
            (_, Mode::Hybrid) => completed(request, "AuthMiddleware.process_request", 0.20),
            _ => completed(request, "some auth middleware", 0.10),
        },
        &fixtures,
        &out,
        "claude-sonnet-4-5",
    )
    .await;

    // 2 tasks x 2 modes x 2 repetitions, append-only.
    let records = ResultSetReader::read_all(&path).unwrap();
    assert_eq!(records.len(), 8);

    let metrics = aggregate(&records).unwrap();
    assert_eq!(metrics.len(), 4);

    for (key, m) in &metrics {
        assert_eq!(m.attempts, 2);
        match key.mode {
            Mode::Hybrid => {
                assert_eq!(m.correct, 2);
                assert!((m.accuracy - 1.0).abs() < 1e-12);
                // Full accuracy: cost-per-correct equals average cost.
                assert!(
                    (m.cost_per_correct.finite().unwrap() - m.avg_cost_usd).abs() < 1e-12
                );
            }
            _ => {
                assert_eq!(m.correct, 0);
                assert!(m.cost_per_correct.is_unbounded());
            }
        }
        // Every scripted run makes one evaluated call out of two.
        assert!((m.tool_adoption - 0.5).abs() < 1e-12);
        assert!((m.avg_context_tokens - 40_000.0).abs() < 1e-12);
    }
}

#[tokio::test]
async fn test_failures_stay_visible_in_report() {
    let fixtures = make_fixtures();
    let out = tempfile::tempdir().unwrap();

    let path = run_session(
        |request| {
            // First repetition succeeds; second crashes.
            if request.repetition == 0 {
                completed(request, "rate_limit and AuthMiddleware", 0.10)
            } else {
                RawExecutionRecord {
                    answer: String::new(),
                    turns: 0,
                    cost_usd: 0.02,
                    failure: Some(FailureReason::ExecutionError {
                        message: "agent exited with 1".to_string(),
                    }),
                    ..completed(request, "", 0.0)
                }
            }
        },
        &fixtures,
        &out,
        "claude-sonnet-4-5",
    )
    .await;

    let records = ResultSetReader::read_all(&path).unwrap();
    assert_eq!(records.len(), 8);

    let failed: Vec<&RunRecord> = records.iter().filter(|r| r.failure.is_some()).collect();
    assert_eq!(failed.len(), 4);
    // Failed runs carry no verdict but keep their partial cost.
    assert!(failed.iter().all(|r| r.verdict.is_none()));
    assert!(failed.iter().all(|r| (r.cost_usd - 0.02).abs() < 1e-12));

    let metrics = aggregate(&records).unwrap();
    for m in metrics.values() {
        // Failures reduce accuracy, never disappear.
        assert_eq!(m.attempts, 2);
        assert_eq!(m.failures, 1);
        assert!((m.accuracy - 0.5).abs() < 1e-12);
    }
}

#[tokio::test]
async fn test_version_comparison_end_to_end() {
    let fixtures = make_fixtures();
    let out_a = tempfile::tempdir().unwrap();
    let out_b = tempfile::tempdir().unwrap();

    // Version A: always correct, expensive.
    let path_a = run_session(
        |request| completed(request, "rate_limit AuthMiddleware", 0.50),
        &fixtures,
        &out_a,
        "claude-sonnet-4-5",
    )
    .await;

    // Version B: always correct, 20% cheaper.
    let path_b = run_session(
        |request| completed(request, "rate_limit AuthMiddleware", 0.40),
        &fixtures,
        &out_b,
        "claude-sonnet-4-5",
    )
    .await;

    let metrics_a = aggregate(&ResultSetReader::read_all(&path_a).unwrap()).unwrap();
    let metrics_b = aggregate(&ResultSetReader::read_all(&path_b).unwrap()).unwrap();

    let comparison = compare(&metrics_a, &metrics_b);
    assert_eq!(comparison.records.len(), 4);
    assert!(comparison.only_in_a.is_empty());
    assert!(comparison.only_in_b.is_empty());

    for record in &comparison.records {
        // Same accuracy, 20% relative cost gap: B cost-wins everywhere.
        assert_eq!(record.outcome, Outcome::CostWin(Side::B));
        let gap = record.cost_gap.unwrap();
        assert!((gap - 0.2).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_budget_exceeded_counts_as_incorrect_attempt() {
    let fixtures = make_fixtures();
    let out = tempfile::tempdir().unwrap();

    let path = run_session(
        |request| RawExecutionRecord {
            answer: "partial notes about middlew".to_string(),
            failure: Some(FailureReason::BudgetExceeded),
            cost_usd: 2.0,
            ..completed(request, "", 0.0)
        },
        &fixtures,
        &out,
        "claude-sonnet-4-5",
    )
    .await;

    let records = ResultSetReader::read_all(&path).unwrap();
    // Budget-killed runs carry no verdict, count as incorrect, and keep
    // both the partial answer and the partial cost already incurred.
    assert!(records.iter().all(|r| r.verdict.is_none()));
    assert!(records.iter().all(|r| !r.is_correct()));
    assert!(records
        .iter()
        .all(|r| r.answer == "partial notes about middlew"));

    let metrics = aggregate(&records).unwrap();
    for m in metrics.values() {
        assert_eq!(m.correct, 0);
        assert_eq!(m.failures, 2);
        assert!(m.cost_per_correct.is_unbounded());
        assert!((m.avg_cost_usd - 2.0).abs() < 1e-12);
    }
}

#[test]
fn test_checker_scenarios_match_published_examples() {
    let gt = vec!["rate_limit".to_string()];
    assert!(checker::check("def rate_limit(...)", &gt).correct);
    assert!(!checker::check("the code does rate limiting", &gt).correct);
}
