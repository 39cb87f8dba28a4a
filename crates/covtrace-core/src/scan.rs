//! Finding coverage files on disk

use eyre::{Result, WrapErr};
use ignore::{DirEntry, WalkBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Dot-directory that is scanned anyway: recorders stage their output there.
pub const STAGING_DIR: &str = ".$features";

/// A coverage file found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    /// Path relative to the scan root.
    pub local_path: PathBuf,
    pub root: PathBuf,
}

impl FileInfo {
    /// `local_path` with forward slashes, used to name the file in reports.
    pub fn key(&self) -> String {
        self.local_path.to_string_lossy().replace('\\', "/")
    }
}

/// A scanned directory and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub path: PathBuf,
    /// Path relative to the scan root (empty for the root itself).
    pub local_path: PathBuf,
    pub directories: Vec<DirectoryInfo>,
    /// Coverage files directly in this directory, in scan order.
    pub files: Vec<PathBuf>,
    pub has_files: bool,
    pub has_files_deep: bool,
}

impl DirectoryInfo {
    /// This directory and every directory below it, parents first.
    pub fn walk(&self) -> Vec<&DirectoryInfo> {
        let mut out = vec![self];
        for child in &self.directories {
            out.extend(child.walk());
        }
        out
    }

    /// Number of coverage files in this directory and below.
    pub fn file_count_deep(&self) -> usize {
        self.files.len()
            + self
                .directories
                .iter()
                .map(DirectoryInfo::file_count_deep)
                .sum::<usize>()
    }
}

/// Result of scanning one or more roots.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub roots: Vec<DirectoryInfo>,
    pub files: BTreeMap<PathBuf, FileInfo>,
}

impl Scan {
    /// Every scanned directory, sorted by path. This is the order coverage
    /// files are aggregated in.
    pub fn directories(&self) -> Vec<&DirectoryInfo> {
        let mut directories: Vec<&DirectoryInfo> =
            self.roots.iter().flat_map(DirectoryInfo::walk).collect();
        directories.sort_by(|a, b| a.path.cmp(&b.path));
        directories
    }
}

/// Scan every root for `*.json` coverage files.
///
/// A root that is the same directory as, or lies inside, another root is
/// skipped so no file is read twice.
pub fn scan_roots(paths: &[PathBuf]) -> Result<Scan> {
    let canonical = paths
        .iter()
        .map(|root| {
            std::fs::canonicalize(root)
                .wrap_err_with(|| format!("Failed to read coverage directory {}", root.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut scan = Scan::default();
    for (index, root) in paths.iter().enumerate() {
        let covered_by = canonical.iter().enumerate().find(|&(other, outer)| {
            other != index
                && canonical[index].starts_with(outer)
                && (outer != &canonical[index] || other < index)
        });
        if let Some((other, _)) = covered_by {
            debug!(
                root = %root.display(),
                covered_by = %paths[other].display(),
                "skipping nested coverage root"
            );
            continue;
        }

        let (directory, files) = scan_directory(root)?;
        for file in files {
            scan.files.insert(file.path.clone(), file);
        }
        scan.roots.push(directory);
    }
    Ok(scan)
}

/// Scan one root. Dot-directories are skipped, except [`STAGING_DIR`].
pub fn scan_directory(root: &Path) -> Result<(DirectoryInfo, Vec<FileInfo>)> {
    let metadata = std::fs::metadata(root)
        .wrap_err_with(|| format!("Failed to read coverage directory {}", root.display()))?;
    if !metadata.is_dir() {
        eyre::bail!("Coverage path {} is not a directory", root.display());
    }

    let mut child_dirs: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut json_files: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut infos = Vec::new();

    // Coverage output is usually gitignored, so no ignore files apply here.
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_directory(entry))
        .build();

    for entry in walker {
        let entry = entry.wrap_err_with(|| format!("Failed to scan {}", root.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };

        let path = entry.path();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if file_type.is_dir() {
            child_dirs.entry(parent).or_default().push(path.to_path_buf());
        } else if path.extension().is_some_and(|ext| ext == "json") {
            json_files.entry(parent).or_default().push(path.to_path_buf());
            infos.push(FileInfo {
                path: path.to_path_buf(),
                local_path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
                root: root.to_path_buf(),
            });
        }
    }

    let directory = build_directory(root, root, &child_dirs, &json_files);
    Ok((directory, infos))
}

fn is_skipped_directory(entry: &DirEntry) -> bool {
    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
    let name = entry.file_name().to_string_lossy();
    is_dir && name.starts_with('.') && name != STAGING_DIR
}

fn build_directory(
    path: &Path,
    root: &Path,
    child_dirs: &BTreeMap<PathBuf, Vec<PathBuf>>,
    json_files: &BTreeMap<PathBuf, Vec<PathBuf>>,
) -> DirectoryInfo {
    let directories: Vec<DirectoryInfo> = child_dirs
        .get(path)
        .into_iter()
        .flatten()
        .map(|child| build_directory(child, root, child_dirs, json_files))
        .collect();
    let files = json_files.get(path).cloned().unwrap_or_default();
    let has_files = !files.is_empty();
    let has_files_deep = has_files || directories.iter().any(|d| d.has_files_deep);

    DirectoryInfo {
        path: path.to_path_buf(),
        local_path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
        directories,
        files,
        has_files,
        has_files_deep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "[]").unwrap();
    }

    #[test]
    fn finds_json_files_and_skips_dot_directories() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(&root.join("b.json"));
        touch(&root.join("a.json"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested/deep/c.json"));
        touch(&root.join(".cache/hidden.json"));
        touch(&root.join(".$features/staged.json"));
        fs::create_dir_all(root.join("empty")).unwrap();

        let (directory, files) = scan_directory(root).unwrap();

        assert_eq!(directory.files, [root.join("a.json"), root.join("b.json")]);
        assert!(directory.has_files);
        assert_eq!(directory.file_count_deep(), 4);

        let names: Vec<_> = directory
            .directories
            .iter()
            .map(|d| d.local_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, [".$features", "empty", "nested"]);

        let empty = &directory.directories[1];
        assert!(!empty.has_files && !empty.has_files_deep);
        let nested = &directory.directories[2];
        assert!(!nested.has_files);
        assert!(nested.has_files_deep);

        let keys: Vec<_> = files.iter().map(FileInfo::key).collect();
        assert!(keys.contains(&"nested/deep/c.json".to_string()));
        assert!(!keys.iter().any(|k| k.contains("hidden")));
    }

    #[test]
    fn directories_are_ordered_by_path() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(&root.join("z/1.json"));
        touch(&root.join("a/b/2.json"));
        touch(&root.join("a/3.json"));

        let scan = scan_roots(&[root.to_path_buf()]).unwrap();
        let order: Vec<_> = scan
            .directories()
            .into_iter()
            .map(|d| d.local_path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(order, ["", "a", "a/b", "z"]);
        assert_eq!(scan.files.len(), 3);
    }

    #[test]
    fn nested_and_repeated_roots_are_scanned_once() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(&root.join("a.json"));
        touch(&root.join("sub/b.json"));

        let scan = scan_roots(&[root.join("sub"), root.to_path_buf(), root.join("sub/.")]).unwrap();
        assert_eq!(scan.roots.len(), 1);
        assert_eq!(scan.roots[0].path, root);
        assert_eq!(scan.files.len(), 2);
        assert_eq!(scan.directories().len(), 2);

        let scan = scan_roots(&[root.to_path_buf(), root.to_path_buf()]).unwrap();
        assert_eq!(scan.roots.len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = scan_roots(&[temp.path().join("missing")]).unwrap_err();
        assert!(format!("{err}").contains("Failed to read coverage directory"));
    }
}
