//! covtrace - Measure requirement coverage recorded by test runs
//!
//! Test suites record which requirements each test exercises into coverage
//! directories; covtrace aggregates those recordings into per-feature
//! coverage statistics and reports.

use covtrace::config::Config;
use covtrace::output::{OutputFormat, render_report, render_stats};
use covtrace::{
    CONFIG_PATH, check_threshold, coverage_dirs, find_project_root, load_config,
    load_config_or_default,
};
use covtrace_core::{Coverage, calculate_totals, read_coverage};
use eyre::{Result, WrapErr};
use figue as args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Subcommand to run
    #[facet(args::subcommand)]
    command: Option<Command>,

    /// Path to config file (default: .config/covtrace/config.yaml)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Show verbose output including the tests covering each requirement
    #[facet(args::named, args::short = 'v', default)]
    verbose: bool,
}

/// Subcommands
#[derive(Debug, facet::Facet)]
#[repr(u8)]
enum Command {
    /// Print coverage totals and per-feature numbers
    Stats {
        /// Coverage directories (default: from config, else ./coverage)
        #[facet(args::positional, default)]
        dirs: Vec<PathBuf>,

        /// Output format: text, json, markdown
        #[facet(args::named, args::short = 'f', default)]
        format: Option<String>,
    },

    /// Exit with status 1 when coverage is below the threshold
    Check {
        /// Coverage directories (default: from config, else ./coverage)
        #[facet(args::positional, default)]
        dirs: Vec<PathBuf>,

        /// Minimum coverage percentage (default: from config, else 0)
        #[facet(args::named, args::short = 't', default)]
        threshold: Option<f64>,
    },

    /// Print every requirement with the tests covering it
    Report {
        /// Coverage directories (default: from config, else ./coverage)
        #[facet(args::positional, default)]
        dirs: Vec<PathBuf>,

        /// Output format: text, json, markdown, lcov
        #[facet(args::named, args::short = 'f', default)]
        format: Option<String>,

        /// Output file (default: stdout)
        #[facet(args::named, args::short = 'o', default)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args: Args = args::from_std_args()
        .into_result()
        .map(|output| output.get())
        .wrap_err("Failed to parse command line arguments")?;
    init_tracing(args.verbose);

    let project_root = find_project_root()?;
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_config_or_default(&project_root.join(CONFIG_PATH)),
    };

    let Some(command) = args.command else {
        eyre::bail!("No command given. Usage: covtrace <stats|check|report> [DIRS...]");
    };

    match command {
        Command::Stats { dirs, format } => {
            let format = output_format(format.as_deref(), &config)?;
            let coverage = read(&project_root, &config, dirs)?;
            print!("{}", render_stats(&coverage, format)?);
            Ok(())
        }
        Command::Check { dirs, threshold } => {
            let threshold = threshold.or(config.threshold).unwrap_or(0.0);
            let coverage = read(&project_root, &config, dirs)?;
            run_check(&coverage, threshold)
        }
        Command::Report {
            dirs,
            format,
            output,
        } => {
            let format = output_format(format.as_deref(), &config)?;
            let coverage = read(&project_root, &config, dirs)?;
            let rendered = render_report(&coverage, format, args.verbose)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered)
                        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("{} Wrote report to {}", "OK".green().bold(), path.display());
                }
                None => print!("{rendered}"),
            }
            Ok(())
        }
    }
}

/// Logs go to stderr; `COVTRACE_LOG` overrides the level.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("COVTRACE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn output_format(requested: Option<&str>, config: &Config) -> Result<OutputFormat> {
    match requested.or(config.format.as_deref()) {
        None => Ok(OutputFormat::default()),
        Some(name) => OutputFormat::from_str(name).ok_or_else(|| {
            eyre::eyre!("Unknown format '{name}'. Expected one of: text, json, markdown, lcov")
        }),
    }
}

fn read(root: &std::path::Path, config: &Config, dirs: Vec<PathBuf>) -> Result<Coverage> {
    let dirs = coverage_dirs(root, config, dirs);
    read_coverage(&dirs, None).wrap_err("Failed to read coverage")
}

fn run_check(coverage: &Coverage, threshold: f64) -> Result<()> {
    let totals = calculate_totals(coverage);
    let failures = check_threshold(coverage, threshold);

    if failures.is_empty() {
        eprintln!(
            "{} Coverage {}% ({}/{} requirements) meets the {}% threshold",
            "OK".green().bold(),
            totals.coverage_percent,
            totals.covered,
            totals.requirements,
            threshold
        );
        return Ok(());
    }

    eprintln!(
        "{} Coverage below the {}% threshold:",
        "!".red().bold(),
        threshold
    );
    for failure in &failures {
        let name = failure.feature.as_deref().unwrap_or("total");
        eprintln!("   {} {}: {}%", "-".red(), name, failure.coverage_percent);
    }
    std::process::exit(1);
}
