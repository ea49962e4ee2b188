//! Claude Code agent runner.
//!
//! Launches one isolated `claude -p` process per attempt with
//! `--output-format stream-json --verbose`, feeds the prompt on stdin, and
//! parses the event stream while the run is in flight so the budget
//! ceiling can terminate it mid-run.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ExecutorError;
use crate::record::FailureReason;

use super::pricing::ModelPricing;
use super::trace::ClaudeStreamParser;
use super::{
    drive_stream, raw_from_trace, tail, wait_for_exit, AgentRunner, AttemptRequest,
    RawExecutionRecord,
};

/// Built-in tools withheld in forced-exclusive mode, so code navigation
/// must go through the evaluated server.
const FORCED_DISALLOWED_TOOLS: &str = "Grep,Glob,Read,WebSearch";

/// Runner for the Claude Code CLI.
pub struct ClaudeRunner {
    /// Binary to invoke.
    binary: String,
}

impl ClaudeRunner {
    pub fn new() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }

    /// Overrides the binary path (useful for pinned installs).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn build_command(&self, request: &AttemptRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&request.workdir)
            .arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--model")
            .arg(&request.model)
            .arg("--append-system-prompt")
            .arg(&request.system_prompt);

        if request.mode.attaches_nav_server() {
            if let Some(mcp_config) = &request.mcp_config {
                cmd.arg("--mcp-config").arg(mcp_config);
            }
        }
        if request.mode.disallows_builtin_search() {
            cmd.arg("--disallowed-tools").arg(FORCED_DISALLOWED_TOOLS);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for ClaudeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for ClaudeRunner {
    fn name(&self) -> &str {
        "claude"
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
            "starting claude run"
        );

        let mut child = match self.build_command(request).spawn() {
            Ok(child) => child,
            Err(e) => {
                // Spawn failure is an infrastructure outcome of this run,
                // recorded rather than thrown, so the batch keeps going.
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

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(request.task.prompt.as_bytes()).await {
                debug!("failed writing prompt to agent stdin: {}", e);
            }
            stdin.shutdown().await.ok();
        }

        let mut stderr_task = None;
        if let Some(mut stderr) = child.stderr.take() {
            stderr_task = Some(tokio::spawn(async move {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).await.ok();
                buf
            }));
        }

        let mut parser = ClaudeStreamParser::new();
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
            // Already killed; reap without overriding the recorded reason.
            child.wait().await.ok();
        }

        let trace = parser.finish();
        // The final result event carries the authoritative cost; for
        // killed runs only the running estimate exists.
        let cost_usd = trace
            .reported_cost_usd
            .unwrap_or_else(|| pricing.estimate(&trace.totals));

        let record = raw_from_trace(request, trace, cost_usd, failure, start.elapsed());

        info!(
            task = %request.task.name,
            cost_usd = record.cost_usd,
            turns = record.turns,
            failed = record.failure.is_some(),
            "claude run finished"
        );

        Ok(record)
    }
}
