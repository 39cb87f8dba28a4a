//! Integration tests reading coverage directories from disk

use covtrace_core::structure::get_branch;
use covtrace_core::{
    Branch, Diagnostic, GlobalFeature, calculate_feature_stats, calculate_totals, read_coverage,
    requirement_rows,
};
use std::path::{Path, PathBuf};

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn fixture_path(name: &str) -> PathBuf {
    Path::new(FIXTURES_DIR).join(name)
}

fn id_at(feature: &GlobalFeature, path: &[&str]) -> String {
    match get_branch(&feature.structure, path) {
        Some(Branch::Requirement(Some(id))) => id.to_string(),
        other => panic!("no seeded requirement at {path:?}: {other:?}"),
    }
}

#[test]
fn test_read_project_fixture() {
    let coverage = read_coverage(&[fixture_path("project")], None).expect("Failed to read coverage");

    // Hidden directories are skipped, the staging directory is not
    assert_eq!(coverage.features.len(), 2);
    assert!(coverage.features.find("Hidden", "Ignored").is_none());
    assert_eq!(coverage.files.len(), 3);

    let login = coverage.features.find("Auth", "Login").unwrap();
    assert_eq!(login.description, "Signing in with a password");
    assert_eq!(login.headers, ["Requirement", "Covered"]);
    assert_eq!(login.depth, 2);

    let req_a = id_at(login, &["High", "Req A"]);
    let req_b = id_at(login, &["High", "Req B"]);
    let req_c = id_at(login, &["Low", "Req C"]);
    assert_eq!(login.records[&req_a].len(), 1);
    assert!(login.records[&req_b].is_empty());
    assert_eq!(login.records[&req_c].len(), 1);
    assert_eq!(
        login.records[&req_a][0].id,
        "test/login.spec.js#login/accepts a valid password"
    );

    // Evidence is attributed to the file that recorded it
    assert!(login.files.contains_key("auth/login.spec.json"));
    assert!(login.files["auth/login.json"].is_empty());
    assert_eq!(login.files["auth/login.spec.json"].len(), 2);

    let stats = calculate_feature_stats(login);
    assert_eq!(stats.requirements_total, 3);
    assert_eq!(stats.requirements_covered, 2);
    assert_eq!(stats.specs_count, 1);
    assert_eq!(stats.coverage_percent, 67);

    let rows = requirement_rows(login);
    let names: Vec<_> = rows.iter().map(|row| row.path.join("/")).collect();
    assert_eq!(names, ["High/Req A", "High/Req B", "Low/Req C"]);
}

#[test]
fn test_category_trace_is_reported() {
    let coverage = read_coverage(&[fixture_path("project")], None).unwrap();
    assert_eq!(coverage.diagnostics.len(), 1);
    match &coverage.diagnostics[0] {
        Diagnostic::DroppedRecord {
            feature,
            file,
            requirement,
            ..
        } => {
            assert_eq!(feature, "Auth-/-Login");
            assert_eq!(file, "auth/login.spec.json");
            assert_eq!(requirement, "High");
        }
        other => panic!("unexpected diagnostic: {other}"),
    }
}

#[test]
fn test_totals_over_project() {
    let coverage = read_coverage(&[fixture_path("project")], None).unwrap();
    let totals = calculate_totals(&coverage);
    assert_eq!(totals.features, 2);
    assert_eq!(totals.files, 3);
    assert_eq!(totals.requirements, 4);
    assert_eq!(totals.covered, 3);
    assert_eq!(totals.specs, 2);
    assert_eq!(totals.coverage_percent, 75);
}

#[test]
fn test_overlapping_roots_count_each_file_once() {
    let project = fixture_path("project");
    let coverage = read_coverage(&[project.join("auth"), project.clone()], None).unwrap();
    let totals = calculate_totals(&coverage);
    assert_eq!(totals.files, 3);
    assert_eq!(totals.specs, 2);
    assert_eq!(totals.coverage_percent, 75);
    assert_eq!(coverage.diagnostics.len(), 1);
}

#[test]
fn test_rereading_keeps_identities_and_evidence() {
    let first = read_coverage(&[fixture_path("project")], None).unwrap();
    let login = first.features.find("Auth", "Login").unwrap();
    let ids: Vec<_> = login.records.keys().cloned().collect();

    let second = read_coverage(&[fixture_path("project")], Some(first.features.clone())).unwrap();
    let login = second.features.find("Auth", "Login").unwrap();
    assert_eq!(login.records.keys().cloned().collect::<Vec<_>>(), ids);
    assert_eq!(calculate_feature_stats(login).specs_count, 1);
    for specs in login.records.values() {
        assert!(specs.len() <= 1);
    }
}

#[test]
fn test_malformed_file_aborts_read() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("good.json"), "[]").unwrap();
    std::fs::write(temp.path().join("bad.json"), "{ not json").unwrap();

    let err = read_coverage(&[temp.path().to_path_buf()], None).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to parse coverage file"), "{message}");
    assert!(message.contains("bad.json"), "{message}");
}

#[test]
fn test_empty_directory_reads_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let coverage = read_coverage(&[temp.path().to_path_buf()], None).unwrap();
    assert!(coverage.features.is_empty());
    assert_eq!(calculate_totals(&coverage).coverage_percent, 100);
}
