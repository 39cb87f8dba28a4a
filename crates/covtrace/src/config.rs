//! Configuration schema for covtrace
//!
//! Config lives at `.config/covtrace/config.yaml` relative to the project root.

use facet::Facet;

/// Root configuration for covtrace
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Directories holding coverage recordings, relative to the project root
    #[facet(default)]
    pub coverage: Vec<String>,

    /// Minimum coverage percentage for `covtrace check`
    #[facet(default)]
    pub threshold: Option<f64>,

    /// Default output format: text, json, markdown, lcov
    #[facet(default)]
    pub format: Option<String>,
}
