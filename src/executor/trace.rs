//! Incremental parsers for agent trace streams.
//!
//! Both supported agents emit newline-delimited JSON events on stdout:
//! `claude -p --output-format stream-json --verbose` and
//! `codex exec --json`. The parsers here consume one line at a time so the
//! runner can enforce the budget ceiling while the run is still in flight,
//! and normalize both stream shapes into the same [`ParsedTrace`].
//!
//! Unknown event types are skipped; a line that is not valid JSON is a
//! hard parse error (the stream is unreadable past that point).

use serde_json::Value;
use thiserror::Error;

use crate::record::TokenTotals;

/// Errors raised while parsing a trace stream.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Malformed trace event on line {line}: {source}")]
    MalformedEvent {
        line: usize,
        source: serde_json::Error,
    },
}

/// One tool invocation as seen in the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceToolCall {
    /// Tool name as reported by the agent.
    pub name: String,
    /// MCP server the tool belongs to, if it is an MCP tool.
    pub server: Option<String>,
}

/// One assistant turn: token usage plus the tool calls it made.
#[derive(Debug, Clone, Default)]
pub struct TraceTurn {
    pub index: u32,
    pub tokens: TokenTotals,
    pub tool_calls: Vec<TraceToolCall>,
}

/// A fully parsed execution trace, agent-shape agnostic.
#[derive(Debug, Clone, Default)]
pub struct ParsedTrace {
    /// Agent session identifier, if the stream reported one.
    pub session_id: String,
    /// Assistant turns in order.
    pub turns: Vec<TraceTurn>,
    /// Turn count as reported by the agent (falls back to `turns.len()`).
    pub num_turns: u32,
    /// Cost as reported by the agent, if it reports one (claude does,
    /// codex does not).
    pub reported_cost_usd: Option<f64>,
    /// Token totals across the whole run.
    pub totals: TokenTotals,
    /// Final answer text (empty if none was captured).
    pub answer: String,
}

impl ParsedTrace {
    /// Ordered tool calls across all turns.
    pub fn tool_calls(&self) -> impl Iterator<Item = &TraceToolCall> + '_ {
        self.turns.iter().flat_map(|t| t.tool_calls.iter())
    }
}

fn usage_tokens(usage: &Value, cached_key: &str, cache_creation_key: &str) -> TokenTotals {
    let get = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    TokenTotals {
        input: get("input_tokens"),
        output: get("output_tokens"),
        cache_creation: get(cache_creation_key),
        cache_read: get(cached_key),
    }
}

/// Extracts the MCP server name from a claude tool name
/// (`mcp__<server>__<tool>`).
fn mcp_server_of(name: &str) -> Option<String> {
    let rest = name.strip_prefix("mcp__")?;
    let (server, _tool) = rest.split_once("__")?;
    Some(server.to_string())
}

/// Streaming parser for `claude -p --output-format stream-json --verbose`.
///
/// Event vocabulary: `system` (session id), `assistant` (one turn: usage
/// plus content blocks of type `text` / `tool_use`), `result` (final
/// summary with authoritative turn count, cost, and usage totals).
#[derive(Debug, Default)]
pub struct ClaudeStreamParser {
    session_id: String,
    turns: Vec<TraceTurn>,
    answer: String,
    summary: Option<Value>,
    lines_seen: usize,
}

impl ClaudeStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one stdout line. Blank lines are ignored.
    pub fn feed_line(&mut self, line: &str) -> Result<(), TraceError> {
        self.lines_seen += 1;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let event: Value =
            serde_json::from_str(line).map_err(|source| TraceError::MalformedEvent {
                line: self.lines_seen,
                source,
            })?;

        match event.get("type").and_then(Value::as_str) {
            Some("system") => {
                if let Some(id) = event.get("session_id").and_then(Value::as_str) {
                    self.session_id = id.to_string();
                }
            }
            Some("assistant") => self.feed_assistant(&event),
            Some("result") => self.summary = Some(event),
            _ => {}
        }

        Ok(())
    }

    fn feed_assistant(&mut self, event: &Value) {
        let message = event.get("message").cloned().unwrap_or_default();
        let usage = message.get("usage").cloned().unwrap_or_default();

        let index = self.turns.len() as u32;
        let mut turn = TraceTurn {
            index,
            tokens: usage_tokens(&usage, "cache_read_input_tokens", "cache_creation_input_tokens"),
            tool_calls: Vec::new(),
        };

        let mut text_blocks: Vec<&str> = Vec::new();
        if let Some(blocks) = message.get("content").and_then(Value::as_array) {
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        let name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let server = mcp_server_of(&name);
                        turn.tool_calls.push(TraceToolCall { name, server });
                    }
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            text_blocks.push(text);
                        }
                    }
                    _ => {}
                }
            }
        }

        // The last turn that produced text carries the final answer.
        if !text_blocks.is_empty() {
            self.answer = text_blocks.join("\n");
        }

        self.turns.push(turn);
    }

    /// Token totals accumulated so far. Used by the runner for the running
    /// cost estimate while the stream is still open.
    pub fn running_totals(&self) -> TokenTotals {
        sum_turn_tokens(&self.turns)
    }

    /// Best-effort answer text captured so far.
    pub fn partial_answer(&self) -> &str {
        &self.answer
    }

    /// Finalizes the trace. The `result` summary event, when present,
    /// overrides the per-turn sums with the agent's own totals.
    pub fn finish(self) -> ParsedTrace {
        let mut trace = ParsedTrace {
            session_id: self.session_id,
            num_turns: self.turns.len() as u32,
            totals: sum_turn_tokens(&self.turns),
            answer: self.answer,
            turns: self.turns,
            reported_cost_usd: None,
        };

        if let Some(summary) = self.summary {
            if let Some(n) = summary.get("num_turns").and_then(Value::as_u64) {
                trace.num_turns = n as u32;
            }
            trace.reported_cost_usd = summary.get("total_cost_usd").and_then(Value::as_f64);
            if let Some(usage) = summary.get("usage") {
                trace.totals = usage_tokens(
                    usage,
                    "cache_read_input_tokens",
                    "cache_creation_input_tokens",
                );
            }
        }

        trace
    }
}

/// Streaming parser for `codex exec --json`.
///
/// Event vocabulary: `thread.started` (session id), `turn.started`,
/// `item.completed` (commands, MCP tool calls, file edits, and the final
/// `agent_message`), `turn.completed` (per-turn usage). Codex reports no
/// cost; the runner prices the usage itself.
#[derive(Debug, Default)]
pub struct CodexStreamParser {
    session_id: String,
    turns: Vec<TraceTurn>,
    answer: String,
    lines_seen: usize,
}

impl CodexStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one stdout line. Blank lines are ignored.
    pub fn feed_line(&mut self, line: &str) -> Result<(), TraceError> {
        self.lines_seen += 1;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let event: Value =
            serde_json::from_str(line).map_err(|source| TraceError::MalformedEvent {
                line: self.lines_seen,
                source,
            })?;

        match event.get("type").and_then(Value::as_str) {
            Some("thread.started") => {
                if let Some(id) = event.get("thread_id").and_then(Value::as_str) {
                    self.session_id = id.to_string();
                }
            }
            Some("turn.started") => {
                let index = self.turns.len() as u32;
                self.turns.push(TraceTurn {
                    index,
                    ..Default::default()
                });
            }
            Some("item.completed") => self.feed_item(&event),
            Some("turn.completed") => {
                if let (Some(turn), Some(usage)) = (self.turns.last_mut(), event.get("usage")) {
                    turn.tokens = usage_tokens(usage, "cached_input_tokens", "_unreported");
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn feed_item(&mut self, event: &Value) {
        let item = match event.get("item") {
            Some(item) => item,
            None => return,
        };

        if item.get("type").and_then(Value::as_str) == Some("agent_message") {
            if let Some(text) = item.get("text").and_then(Value::as_str) {
                self.answer = text.to_string();
            }
            return;
        }

        let call = match item.get("type").and_then(Value::as_str) {
            Some("command_execution") => TraceToolCall {
                name: "Bash".to_string(),
                server: None,
            },
            Some("mcp_tool_call") => TraceToolCall {
                name: item
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                server: item
                    .get("server")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            Some("file_edit") => TraceToolCall {
                name: "Edit".to_string(),
                server: None,
            },
            Some("file_write") => TraceToolCall {
                name: "Write".to_string(),
                server: None,
            },
            _ => return,
        };

        if let Some(turn) = self.turns.last_mut() {
            turn.tool_calls.push(call);
        }
    }

    /// Token totals accumulated so far.
    pub fn running_totals(&self) -> TokenTotals {
        sum_turn_tokens(&self.turns)
    }

    /// Best-effort answer text captured so far.
    pub fn partial_answer(&self) -> &str {
        &self.answer
    }

    pub fn finish(self) -> ParsedTrace {
        ParsedTrace {
            session_id: self.session_id,
            num_turns: self.turns.len() as u32,
            totals: sum_turn_tokens(&self.turns),
            answer: self.answer,
            turns: self.turns,
            reported_cost_usd: None,
        }
    }
}

fn sum_turn_tokens(turns: &[TraceTurn]) -> TokenTotals {
    let mut totals = TokenTotals::default();
    for turn in turns {
        totals.input += turn.tokens.input;
        totals.output += turn.tokens.output;
        totals.cache_creation += turn.tokens.cache_creation;
        totals.cache_read += turn.tokens.cache_read;
    }
    totals
}

/// Parses a complete claude stream in one call.
pub fn parse_claude_stream(raw: &str) -> Result<ParsedTrace, TraceError> {
    let mut parser = ClaudeStreamParser::new();
    for line in raw.lines() {
        parser.feed_line(line)?;
    }
    Ok(parser.finish())
}

/// Parses a complete codex stream in one call.
pub fn parse_codex_stream(raw: &str) -> Result<ParsedTrace, TraceError> {
    let mut parser = CodexStreamParser::new();
    for line in raw.lines() {
        parser.feed_line(line)?;
    }
    Ok(parser.finish())
}
