//! # STRIPStream CLI
//!
//! Builds the block rearrangement tutorial problem, solves it with the
//! incremental planner and prints the plan.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use strips_core::Problem;
use strips_planner::{IncrementalPlanner, PlannerConfig, SolveReport};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod tutorial;

use tutorial::{create_problem, display_names, TutorialOptions};

/// Exit code for a solve that ended without a plan.
const EXIT_INFEASIBLE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "strips-cli")]
#[command(about = "Solve the block rearrangement tutorial with conditional streams", version)]
struct Cli {
    /// Number of blocks on the line
    #[arg(long, default_value_t = 3)]
    blocks: usize,

    /// Highest level to explore before giving up
    #[arg(long)]
    max_level: Option<usize>,

    /// Wall-clock budget for the whole solve, in milliseconds
    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Planner configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable inverse kinematics, leaving the problem without a plan
    #[arg(long)]
    no_kinematics: bool,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// JSON output: the report plus the human-readable plan rows.
#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a SolveReport,
    rendered: Vec<String>,
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn load_config(cli: &Cli) -> anyhow::Result<PlannerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            PlannerConfig::from_json(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => PlannerConfig::default(),
    };
    if let Some(max_level) = cli.max_level {
        config.max_level = max_level;
    }
    if let Some(budget) = cli.time_budget_ms {
        config.search_time_budget_ms = Some(budget);
    }
    Ok(config)
}

/// Solve on a blocking thread; Ctrl-C cancels the search.
async fn solve(problem: Problem, config: PlannerConfig) -> anyhow::Result<SolveReport> {
    let planner = IncrementalPlanner::with_config(config);
    let cancel = planner.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the solve");
            cancel.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || planner.solve(&problem))
        .await
        .context("planner thread panicked")?;
    interrupt.abort();
    Ok(report?)
}

fn rendered_rows(report: &SolveReport) -> Vec<String> {
    let Some(plan) = report.plan() else {
        return Vec::new();
    };
    plan.render(&display_names(plan))
        .into_iter()
        .map(|(action, args)| format!("{}({})", action, args.join(", ")))
        .collect()
}

fn print_report(report: &SolveReport) {
    match report.infeasible_reason() {
        None => {
            println!("Plan:");
            for (index, row) in rendered_rows(report).iter().enumerate() {
                println!("{:>3}. {}", index + 1, row);
            }
        }
        Some(reason) => println!("Plan: None ({})", reason),
    }

    let diagnostics = &report.diagnostics;
    println!(
        "\nlevels: {}  stream calls: {}  refinements: {}  searches: {}  states: {}  time: {}ms",
        diagnostics.levels_explored,
        diagnostics.stream_calls,
        diagnostics.refinements,
        diagnostics.search_calls,
        diagnostics.states_explored,
        diagnostics.elapsed_ms
    );
}

async fn run(cli: Cli) -> anyhow::Result<SolveReport> {
    let config = load_config(&cli).await?;
    let problem = create_problem(TutorialOptions {
        blocks: cli.blocks,
        kinematics: !cli.no_kinematics,
    })?;

    if !cli.json {
        println!("{}\n", problem);
    }
    info!("🚀 Solving {} block(s), max level {}", cli.blocks, config.max_level);

    let report = solve(problem, config).await?;

    if cli.json {
        let output = JsonOutput {
            report: &report,
            rendered: rendered_rows(&report),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("error: {:#}", err);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(report) if report.is_solved() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_INFEASIBLE),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
