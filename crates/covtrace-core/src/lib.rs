//! covtrace-core - Core library for requirement coverage aggregation
//!
//! Test runs record, per feature, a tree of requirements (the *structure*)
//! and a list of trace records naming the requirement each test covers. This
//! crate turns a directory of such recordings into per-feature coverage:
//!
//! - [`structure`] holds requirement trees and the operations on them
//! - [`identity`] gives every requirement a stable identity and resolves
//!   names and paths to it
//! - [`features`] merges recordings of the same feature from many files
//! - [`stats`] computes coverage numbers and table layouts
//!
//! # Reading a coverage directory
//!
//! ```ignore
//! use covtrace_core::{read_coverage, calculate_totals};
//!
//! let coverage = read_coverage(&["coverage".into()], None)?;
//! let totals = calculate_totals(&coverage);
//! println!("{}% of {} requirements", totals.coverage_percent, totals.requirements);
//! ```
//!
//! # Aggregating in memory
//!
//! ```
//! use covtrace_core::{AggregationSession, calculate_feature_stats};
//!
//! let json = r#"[{
//!     "title": "Login",
//!     "group": "Auth",
//!     "structure": { "Valid password": {}, "Wrong password": {} },
//!     "records": [{
//!         "requirement": "Valid password",
//!         "title": "logs in",
//!         "filePath": "login.spec.ts",
//!         "titlePath": ["Login", "logs in"]
//!     }]
//! }]"#;
//!
//! let mut session = AggregationSession::new();
//! for recording in covtrace_core::parse_recordings(json).unwrap() {
//!     session.add_feature(recording, "login.json");
//! }
//! let (features, diagnostics) = session.finish();
//! assert!(diagnostics.is_empty());
//!
//! let login = features.find("Auth", "Login").unwrap();
//! assert_eq!(calculate_feature_stats(login).coverage_percent, 50);
//! ```

pub mod features;
pub mod identity;
mod reader;
pub mod recording;
pub mod scan;
mod specs;
pub mod stats;
pub mod structure;

pub use features::{
    AggregationSession, Diagnostic, Evidence, FeatureSet, GlobalFeature, LocalFeature, feature_key,
};
pub use identity::{IdentityAllocator, ResolveError};
pub use reader::{Coverage, read_coverage};
pub use recording::{FeatureRecording, RawRecord, RequirementRef, parse_recordings, recordings_to_json};
pub use scan::STAGING_DIR;
pub use specs::{Spec, SpecCache, dedupe_specs, distinct_specs};
pub use stats::{
    FeatureStats, HeaderCell, RequirementRow, Totals, calculate_feature_stats, calculate_totals,
    coverage_percent, requirement_rows, vertical_headers,
};
pub use structure::{
    Branch, RequirementPath, Structure, StructureNode, leaf_paths, normalize_keys, normalize_name,
};
