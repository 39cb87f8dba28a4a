//! covtrace library - Measure requirement coverage recorded by test runs
//!
//! This library exposes the pieces of the `covtrace` CLI for testing and
//! embedding purposes.

pub mod config;
pub mod output;

use config::Config;
use covtrace_core::{Coverage, GlobalFeature, calculate_feature_stats, calculate_totals};
use eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config file location, relative to the project root.
pub const CONFIG_PATH: &str = ".config/covtrace/config.yaml";

/// Coverage directory used when neither the command line nor the config
/// names one.
pub const DEFAULT_COVERAGE_DIR: &str = "coverage";

/// The nearest ancestor of the current directory holding a covtrace config
/// or a `.git` directory, or the current directory when there is none.
pub fn find_project_root() -> Result<PathBuf> {
    let start = std::env::current_dir().wrap_err("Failed to get current directory")?;
    let mut current = start.clone();

    loop {
        if current.join(CONFIG_PATH).exists() || current.join(".git").exists() {
            return Ok(current);
        }

        if !current.pop() {
            return Ok(start);
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        eyre::bail!(
            "Config file not found at {}\n\n\
             Create a config file naming your coverage directories:\n\n\
             coverage:\n  \
                 - coverage\n\
             threshold: 80",
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = facet_yaml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Load config if it exists, otherwise return the default config.
pub fn load_config_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            warn!("ignoring config: {err:#}");
            Config::default()
        }
    }
}

/// Directories to read coverage from: the ones given on the command line,
/// else the config's, else [`DEFAULT_COVERAGE_DIR`]. Config entries are
/// relative to the project root.
pub fn coverage_dirs(root: &Path, config: &Config, dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    if !dirs.is_empty() {
        return dirs;
    }
    if config.coverage.is_empty() {
        return vec![root.join(DEFAULT_COVERAGE_DIR)];
    }
    config.coverage.iter().map(|dir| root.join(dir)).collect()
}

/// Display name of a feature: `group / title`, or the title alone.
pub fn feature_name(feature: &GlobalFeature) -> String {
    if feature.group.is_empty() {
        feature.title.clone()
    } else {
        format!("{} / {}", feature.group, feature.title)
    }
}

/// Something that is covered less than the threshold asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdFailure {
    /// Feature name, or `None` for the overall total.
    pub feature: Option<String>,
    pub coverage_percent: u32,
}

/// Everything below `threshold` percent: the overall total, then each
/// feature that has requirements.
pub fn check_threshold(coverage: &Coverage, threshold: f64) -> Vec<ThresholdFailure> {
    let mut failures = Vec::new();

    let totals = calculate_totals(coverage);
    if f64::from(totals.coverage_percent) < threshold {
        failures.push(ThresholdFailure {
            feature: None,
            coverage_percent: totals.coverage_percent,
        });
    }

    for feature in coverage.features.iter() {
        let stats = calculate_feature_stats(feature);
        if stats.requirements_total > 0 && f64::from(stats.coverage_percent) < threshold {
            failures.push(ThresholdFailure {
                feature: Some(feature_name(feature)),
                coverage_percent: stats.coverage_percent,
            });
        }
    }

    failures
}
