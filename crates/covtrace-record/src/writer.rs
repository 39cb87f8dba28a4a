use crate::scope::FeatureRecorder;
use covtrace_core::recordings_to_json;
use eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name the recordings of `spec_file` are written under.
pub fn recording_file_name(spec_file: &str) -> String {
    let name: String = spec_file
        .trim_start_matches("./")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    format!("{name}.json")
}

/// Write every recorder's feature for one test file into `dir`, replacing
/// what an earlier run of the same file wrote. Returns the written path.
pub fn write_recordings(
    dir: &Path,
    spec_file: &str,
    recorders: &[&FeatureRecorder],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create coverage directory {}", dir.display()))?;

    let recordings: Vec<_> = recorders.iter().map(|r| r.to_recording()).collect();
    let json = recordings_to_json(&recordings)?;

    let path = dir.join(recording_file_name(spec_file));
    std::fs::write(&path, json)
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;

    debug!(path = %path.display(), features = recordings.len(), "wrote recordings");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_flattens_the_spec_path() {
        assert_eq!(recording_file_name("./tests/auth/login.rs"), "tests_auth_login.rs.json");
        assert_eq!(recording_file_name("C:\\suite\\a.rs"), "C__suite_a.rs.json");
    }
}
