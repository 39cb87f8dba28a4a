//! Reading a whole coverage tree into global features

use crate::features::{AggregationSession, Diagnostic, FeatureSet};
use crate::scan::{DirectoryInfo, FileInfo, scan_roots};
use eyre::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Everything known after reading a set of coverage directories.
#[derive(Debug, Clone)]
pub struct Coverage {
    pub roots: Vec<DirectoryInfo>,
    pub files: BTreeMap<PathBuf, FileInfo>,
    pub features: FeatureSet,
    pub diagnostics: Vec<Diagnostic>,
}

/// Scan `paths` for coverage files and aggregate them.
///
/// Files are processed one at a time, directories in path order and files in
/// scan order within a directory. Pass the `features` of an earlier
/// [`Coverage`] as `previous` to keep accumulating into it. An unreadable
/// directory or file, or a file that is not valid recording JSON, aborts the
/// whole read.
pub fn read_coverage(paths: &[PathBuf], previous: Option<FeatureSet>) -> Result<Coverage> {
    let scan = scan_roots(paths)?;
    let mut session = AggregationSession::resume(previous.unwrap_or_default());

    for directory in scan.directories() {
        for path in &directory.files {
            let key = match scan.files.get(path) {
                Some(file) => file.key(),
                None => path.display().to_string(),
            };
            session.add_file(path, &key)?;
        }
    }

    let (features, diagnostics) = session.finish();
    info!(
        features = features.len(),
        files = scan.files.len(),
        diagnostics = diagnostics.len(),
        "read coverage"
    );

    Ok(Coverage {
        roots: scan.roots,
        files: scan.files,
        features,
        diagnostics,
    })
}
