#![warn(missing_docs)]
//! timeit CLI Library
//!
//! Command-line runner for functions registered with `process_fn!` or
//! decorated with `substrate = "processes"`. Call `timeit::run()` (or
//! `timeit_cli::run()`) from a binary's `main` to time any of them from the
//! shell.
//!
//! # Example
//!
//! ```ignore
//! fn fib(n: u64) -> u64 { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } }
//!
//! timeit::process_fn! {
//!     static FIB: fn(u64) -> u64 = fib;
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     timeit::run()
//! }
//! ```
//!
//! ```text
//! $ my-bin run FIB --args 30 --runs 8 --workers 4 --substrate processes
//! ```

mod config;

pub use config::*;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::Path;
use timeit_core::process::{self, ProcessTarget};
use timeit_core::{Substrate, Timeit, TimeitConfig};
use timeit_report::{OutputFormat, generate_json_summary};

/// timeit CLI arguments
#[derive(Parser, Debug)]
#[command(name = "timeit")]
#[command(author, version, about = "timeit - time registered functions")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered functions
    List {
        /// Filter function ids by regex pattern
        #[arg(default_value = ".*")]
        pattern: String,
    },
    /// Time a registered function
    Run(RunArgs),
    /// Write a default timeit.toml to the current directory
    Init,
}

/// Options of `run`; unset flags fall back to timeit.toml, then defaults
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Full id or last path segment of a registered function
    pub target: String,

    /// Arguments as JSON, e.g. `42` or `[1, "two"]` for several parameters
    #[arg(long, default_value = "null")]
    pub args: String,

    /// Number of runs
    #[arg(long)]
    pub runs: Option<usize>,

    /// Concurrency width
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-run deadline (e.g., "500ms", "2s")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Cancel runs at the deadline instead of only warning
    #[arg(long)]
    pub enforce_timeout: bool,

    /// Substrate: none, threads or processes
    #[arg(long)]
    pub substrate: Option<Substrate>,

    /// Emit the detailed table
    #[arg(long)]
    pub detailed: bool,

    /// Output format: human or json
    #[arg(long)]
    pub format: Option<OutputFormat>,
}

/// Run the timeit CLI with the process arguments.
///
/// Serves as a worker first when this process was spawned as one, so it
/// must be the first thing `main` does.
pub fn run() -> anyhow::Result<()> {
    process::run_worker_if_requested();
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the timeit CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    match cli.command {
        Commands::List { ref pattern } => list_targets(pattern),
        Commands::Run(ref args) => {
            let file = FileConfig::discover().unwrap_or_default();
            run_target(args, &file)
        }
        Commands::Init => init_config(Path::new("timeit.toml")),
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info,timeit=trace,timeit_core=debug,timeit_cli=debug")
            .with_target(false)
            .try_init();
    } else {
        timeit_report::init_tracing();
    }
}

fn list_targets(pattern: &str) -> anyhow::Result<()> {
    let filter = Regex::new(pattern).with_context(|| format!("invalid pattern `{pattern}`"))?;
    let targets: Vec<_> = process::registered_targets()
        .into_iter()
        .filter(|target| filter.is_match(target.id))
        .collect();

    println!("Registered functions:");
    for target in &targets {
        println!("├── {}", target.id);
    }
    println!("{} functions found.", targets.len());
    Ok(())
}

/// Find a registered function by full id, or by a unique `::`-separated suffix
pub fn resolve_target(name: &str) -> anyhow::Result<&'static ProcessTarget> {
    if let Some(target) = process::find_target(name) {
        return Ok(target);
    }

    let suffix = format!("::{name}");
    let matches: Vec<_> = process::registered_targets()
        .into_iter()
        .filter(|target| target.id.ends_with(&suffix))
        .collect();

    match matches.as_slice() {
        [target] => Ok(*target),
        [] => Err(anyhow::anyhow!("no registered function matches `{name}`")),
        many => {
            let ids: Vec<_> = many.iter().map(|target| target.id).collect();
            Err(anyhow::anyhow!(
                "`{name}` is ambiguous, candidates: {}",
                ids.join(", ")
            ))
        }
    }
}

/// Layer timeit.toml under the command-line flags
pub fn build_config(args: &RunArgs, file: &FileConfig) -> anyhow::Result<TimeitConfig> {
    let mut config = file.runner.to_timeit_config()?;

    if let Some(runs) = args.runs {
        config = config.runs(runs);
    }
    if let Some(workers) = args.workers {
        config = config.workers(workers);
    }
    if let Some(timeout) = &args.timeout {
        config = config.timeout(FileConfig::parse_duration(timeout)?.as_secs_f64());
    }
    if args.enforce_timeout {
        config = config.enforce_timeout(true);
    }
    if let Some(substrate) = args.substrate {
        config = config.substrate(substrate);
    }
    if args.detailed {
        config = config.detailed(true);
    }

    config.validate()?;
    Ok(config)
}

fn output_format(args: &RunArgs, file: &FileConfig) -> OutputFormat {
    args.format
        .or_else(|| file.output.format.parse().ok())
        .unwrap_or_default()
}

fn run_target(args: &RunArgs, file: &FileConfig) -> anyhow::Result<()> {
    let target = resolve_target(&args.target)?;
    let config = build_config(args, file)?;
    let format = output_format(args, file);

    let payload: serde_json::Value =
        serde_json::from_str(&args.args).context("--args must be valid JSON")?;
    let payload = serde_json::to_vec(&payload)?;

    tracing::debug!(function = target.id, ?config, "running from the command line");
    let timeit = Timeit::new(config)?;
    let aggregate = timeit.call_registered(target.id, &payload)?;

    match format {
        OutputFormat::Json => {
            println!("{}", generate_json_summary(&aggregate.summary())?);
            aggregate.into_result()?;
        }
        OutputFormat::Human => {
            let value = aggregate.into_result()?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(path, FileConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}
