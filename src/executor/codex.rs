//! Codex CLI agent runner.
//!
//! Launches `codex exec --json` per attempt. Codex reports token usage but
//! no cost, so the runner prices the usage with the static per-model table
//! both for the recorded cost and for mid-run budget enforcement. Tool
//! availability is selected through codex profiles, one per mode,
//! configured out of band (`navbench-baseline`, `navbench-hybrid`,
//! `navbench-forced`).

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::info;

use crate::error::ExecutorError;
use crate::record::FailureReason;

use super::pricing::ModelPricing;
use super::trace::CodexStreamParser;
use super::{
    drive_stream, raw_from_trace, tail, wait_for_exit, AgentRunner, AttemptRequest,
    RawExecutionRecord,
};

/// Runner for the Codex CLI.
pub struct CodexRunner {
    binary: String,
}

impl CodexRunner {
    pub fn new() -> Self {
        Self {
            binary: "codex".to_string(),
        }
    }

    /// Overrides the binary path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn build_command(&self, request: &AttemptRequest) -> Command {
        // Codex has no system-prompt flag; the fixed system prompt is
        // prepended to the task prompt instead.
        let prompt = format!("{}\n\n{}", request.system_prompt, request.task.prompt);

        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&request.workdir)
            .arg("exec")
            .arg("--json")
            .arg("--model")
            .arg(&request.model)
            .arg("--profile")
            .arg(format!("navbench-{}", request.mode))
            .arg(prompt);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for CodexRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for CodexRunner {
    fn name(&self) -> &str {
        "codex"
    }

    async fn execute(&self, request: &AttemptRequest) -> Result<RawExecutionRecord, ExecutorError> {
        request.validate()?;

        let pricing = ModelPricing::for_model(&request.model);
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + request.timeout;

        info!(
            task = %request.task.name,
            mode = %request.mode,
            model = %request.model,
            repetition = request.repetition,
            "starting codex run"
        );

        let mut child = match self.build_command(request).spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(raw_from_trace(
                    request,
                    Default::default(),
                    0.0,
                    Some(FailureReason::ExecutionError {
                        message: format!("failed to spawn {}: {}", self.binary, e),
                    }),
                    start.elapsed(),
                ));
            }
        };

        let mut stderr_task = None;
        if let Some(mut stderr) = child.stderr.take() {
            stderr_task = Some(tokio::spawn(async move {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).await.ok();
                buf
            }));
        }

        let mut parser = CodexStreamParser::new();
        let mut failure = drive_stream(
            &mut child,
            &mut parser,
            &pricing,
            request.budget_cap_usd,
            deadline,
        )
        .await;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let stderr_tail = tail(&stderr, 2000);

        if failure.is_none() {
            failure = wait_for_exit(&mut child, &stderr_tail).await;
        } else {
            child.wait().await.ok();
        }

        let trace = parser.finish();
        let cost_usd = pricing.estimate(&trace.totals);

        let record = raw_from_trace(request, trace, cost_usd, failure, start.elapsed());

        info!(
            task = %request.task.name,
            cost_usd = record.cost_usd,
            turns = record.turns,
            failed = record.failure.is_some(),
            "codex run finished"
        );

        Ok(record)
    }
}
