//! CLI command definitions for navbench.
//!
//! Three commands compose the pipeline: `run` executes a benchmark session
//! and writes one result set per model, `report` aggregates a result set
//! into per-task metrics, and `compare` diffs two result sets. The
//! commands are a thin driver over the library; all pipeline logic lives
//! in the library modules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::compare::{compare, Comparison};
use crate::corpus::TaskRegistry;
use crate::executor::AgentKind;
use crate::metrics::{aggregate, TaskMetrics};
use crate::mode::Mode;
use crate::record::{ResultSetReader, ResultSetWriter, RunRecord};
use crate::session::{BenchSession, SessionConfig, SessionSummary, DEFAULT_SYSTEM_PROMPT};

/// Default model to benchmark.
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Default output directory for result sets.
const DEFAULT_OUTPUT_DIR: &str = "./results";

/// Benchmark harness for code-navigation tool evaluation.
#[derive(Parser)]
#[command(name = "navbench")]
#[command(about = "Measure how a code-navigation tool-set changes agent cost and correctness")]
#[command(version)]
#[command(
    long_about = "navbench runs an autonomous coding agent against fixed questions about real \
codebases under multiple tool-availability modes, records every attempt to an append-only \
result set, and aggregates/compares the results with a retry-aware cost-per-correct metric.\n\n\
Example usage:\n  navbench run --corpus tasks.yaml --models claude-sonnet-4-5 --repetitions 5"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a benchmark session: execute the agent on every (task, mode,
    /// repetition) unit and write one result set per model.
    Run(RunArgs),

    /// Aggregate one result set into per-(task, mode, model) metrics.
    Report(ReportArgs),

    /// Compare two result sets (e.g. old vs. new tool version).
    Compare(CompareArgs),
}

/// Arguments for `navbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Task corpus YAML file.
    #[arg(short, long, default_value = "./tasks.yaml")]
    pub corpus: String,

    /// Agent CLI to drive (claude, codex).
    #[arg(long, default_value = "claude")]
    pub agent: String,

    /// Comma-separated model identifiers. One result set per model.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub models: String,

    /// Comma-separated modes to run (baseline, hybrid, forced).
    #[arg(long, default_value = "baseline,hybrid,forced")]
    pub modes: String,

    /// Repetitions per (task, mode) configuration.
    #[arg(short = 'n', long, default_value = "3")]
    pub repetitions: u32,

    /// Budget ceiling per attempt in USD.
    #[arg(long, default_value = "2.0")]
    pub budget: f64,

    /// Wall-clock ceiling per attempt in seconds.
    #[arg(long, default_value = "600")]
    pub timeout_secs: u64,

    /// Directory of fixture checkouts, one subdirectory per task repo.
    #[arg(long, default_value = "./fixtures")]
    pub fixtures: String,

    /// File containing the fixed system prompt. Defaults to the built-in
    /// prompt.
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Evaluated MCP server name, used to flag tool-call origin.
    #[arg(long, default_value = "nav", env = "NAVBENCH_SERVER")]
    pub nav_server: String,

    /// MCP config file handed to the agent in hybrid/forced modes.
    #[arg(long, env = "NAVBENCH_MCP_CONFIG")]
    pub mcp_config: Option<String>,

    /// Maximum concurrent runs.
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Output directory for result sets.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,
}

/// Arguments for `navbench report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Result set file to aggregate.
    #[arg(short, long)]
    pub results: String,

    /// Emit JSON instead of the line summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `navbench compare`.
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Result set A (e.g. the old tool version).
    #[arg(long)]
    pub a: String,

    /// Result set B (e.g. the new tool version).
    #[arg(long)]
    pub b: String,

    /// Emit JSON instead of the line summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Report(args) => handle_report(args),
        Commands::Compare(args) => handle_compare(args),
    }
}

async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    let agent: AgentKind = args.agent.parse()?;
    let registry = TaskRegistry::load(&args.corpus)?;
    if registry.is_empty() {
        anyhow::bail!("corpus '{}' contains no tasks", args.corpus);
    }

    let modes = parse_modes(&args.modes)?;
    let system_prompt = match &args.system_prompt {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let config = SessionConfig {
        modes,
        repetitions: args.repetitions,
        budget_cap_usd: args.budget,
        system_prompt,
        fixtures_root: PathBuf::from(&args.fixtures),
        nav_server: args.nav_server.clone(),
        mcp_config: args.mcp_config.as_ref().map(PathBuf::from),
        run_timeout: Duration::from_secs(args.timeout_secs),
        concurrency: args.concurrency,
    };

    let runner: Arc<dyn crate::executor::AgentRunner> = Arc::from(agent.runner());
    let session = BenchSession::new(config);

    let mut summaries: Vec<SessionSummary> = Vec::new();
    for model in args.models.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        let writer = ResultSetWriter::create(&args.output, model).await?;
        let summary = session
            .run(&registry, model, runner.clone(), &writer)
            .await?;
        summaries.push(summary);
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

/// One aggregated group, flattened for output.
#[derive(Serialize)]
struct ReportRow<'a> {
    task: &'a str,
    mode: Mode,
    model: &'a str,
    #[serde(flatten)]
    metrics: &'a TaskMetrics,
}

fn handle_report(args: ReportArgs) -> anyhow::Result<()> {
    let records = load_result_set(&args.results)?;
    let metrics = aggregate(&records)?;

    if args.json {
        let rows: Vec<ReportRow> = metrics
            .iter()
            .map(|(key, metrics)| ReportRow {
                task: &key.task,
                mode: key.mode,
                model: &key.model,
                metrics,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (key, m) in &metrics {
        println!(
            "{:40} accuracy {:5.1}%  avg ${:.4}  per-correct {}  adoption {:5.1}%  ({} attempts, {} failed)",
            key.to_string(),
            pct(m.accuracy),
            m.avg_cost_usd,
            m.cost_per_correct,
            pct(m.tool_adoption),
            m.attempts,
            m.failures,
        );
    }
    Ok(())
}

fn handle_compare(args: CompareArgs) -> anyhow::Result<()> {
    let records_a = load_result_set(&args.a)?;
    let records_b = load_result_set(&args.b)?;
    let comparison = compare(&aggregate(&records_a)?, &aggregate(&records_b)?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    render_comparison(&comparison);
    Ok(())
}

fn render_comparison(comparison: &Comparison) {
    use crate::compare::{Outcome, Side};

    for record in &comparison.records {
        let label = match record.outcome {
            Outcome::AccuracyWin(Side::A) => "accuracy-win: A",
            Outcome::AccuracyWin(Side::B) => "accuracy-win: B",
            Outcome::CostWin(Side::A) => "cost-win: A",
            Outcome::CostWin(Side::B) => "cost-win: B",
            Outcome::Tie => "tie",
        };
        println!(
            "{:40} {:16} accuracy {:5.1}% vs {:5.1}%  per-correct {} vs {}",
            record.key.to_string(),
            label,
            pct(record.a.accuracy),
            pct(record.b.accuracy),
            record.a.cost_per_correct,
            record.b.cost_per_correct,
        );
    }

    for key in &comparison.only_in_a {
        println!("{:40} non-comparable (only in A)", key.to_string());
    }
    for key in &comparison.only_in_b {
        println!("{:40} non-comparable (only in B)", key.to_string());
    }
}

fn load_result_set(path: &str) -> anyhow::Result<Vec<RunRecord>> {
    let records = ResultSetReader::read_all(path)?;
    if records.is_empty() {
        warn!("result set '{}' is empty", path);
    } else {
        info!("loaded {} records from '{}'", records.len(), path);
    }
    Ok(records)
}

fn parse_modes(raw: &str) -> anyhow::Result<Vec<Mode>> {
    let mut modes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mode: Mode = part.parse().map_err(anyhow::Error::msg)?;
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    if modes.is_empty() {
        anyhow::bail!("no modes given");
    }
    Ok(modes)
}

/// Ratio to display percent, one decimal, round-half-even. Display only;
/// stored values keep full precision.
fn pct(ratio: f64) -> f64 {
    (ratio * 1000.0).round_ties_even() / 10.0
}
