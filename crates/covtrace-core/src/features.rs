//! Feature aggregation
//!
//! Every coverage file contributes a [`LocalFeature`] per recorded feature.
//! Recordings of the same logical feature (same group and title) from
//! different files are reconciled into one [`GlobalFeature`]: structures are
//! merged, trace records are resolved to requirement identities, and the
//! evidence is accumulated per requirement and per file.

use crate::identity::{IdentityAllocator, resolve_reference, seed_structure};
use crate::recording::{FeatureRecording, parse_recordings};
use crate::specs::{Spec, SpecCache, dedupe_specs};
use crate::structure::{Structure, StructureNode, depth, normalize_name, requirement_paths};
use eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// Requirement identity → evidence.
pub type Evidence = BTreeMap<String, Vec<Rc<Spec>>>;

/// Key of a global feature: `{group}-/-{title}`.
pub fn feature_key(group: &str, title: &str) -> String {
    format!("{group}-/-{title}")
}

/// The cross-file aggregate of one logical feature.
#[derive(Debug, Clone)]
pub struct GlobalFeature {
    pub key: String,
    pub title: String,
    pub group: String,
    pub description: String,
    pub headers: Vec<String>,
    /// Seeded structure; every leaf carries an identity.
    pub structure: Structure,
    /// Evidence per requirement identity, across all files.
    pub records: Evidence,
    /// Category depth of `structure`, recomputed when the session finishes.
    pub depth: usize,
    /// Evidence broken down by coverage file.
    pub files: BTreeMap<String, Evidence>,
}

/// One coverage file's view of a feature: its own evidence, reading
/// everything else through to the global aggregate.
#[derive(Debug)]
pub struct LocalFeature<'g> {
    pub title: String,
    pub group: String,
    pub description: String,
    pub file: String,
    pub records: Evidence,
    global: &'g GlobalFeature,
}

impl<'g> LocalFeature<'g> {
    pub fn global(&self) -> &'g GlobalFeature {
        self.global
    }

    pub fn structure(&self) -> &'g Structure {
        &self.global.structure
    }

    pub fn depth(&self) -> usize {
        self.global.depth
    }
}

/// All global features of a coverage run, plus the identity allocator they
/// were seeded with. Pass it back into [`AggregationSession::resume`] to keep
/// accumulating without reusing identities.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: BTreeMap<String, GlobalFeature>,
    identities: IdentityAllocator,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&GlobalFeature> {
        self.features.get(key)
    }

    /// Look a feature up by group and title.
    pub fn find(&self, group: &str, title: &str) -> Option<&GlobalFeature> {
        self.get(&feature_key(&normalize_name(group), &normalize_name(title)))
    }

    /// Features ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = &GlobalFeature> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn identities(&self) -> &IdentityAllocator {
        &self.identities
    }
}

/// Something worth telling the user about that did not stop aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A name is a category on one side and a requirement on the other.
    StructureMismatch {
        feature: String,
        file: String,
        path: Vec<String>,
    },
    /// A trace record that could not be resolved and was skipped.
    DroppedRecord {
        feature: String,
        file: String,
        requirement: String,
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::StructureMismatch {
                feature,
                file,
                path,
            } => write!(
                f,
                "{file}: `{}` in feature {feature} is a category in one recording and a requirement in another",
                path.join(" / ")
            ),
            Diagnostic::DroppedRecord {
                feature,
                file,
                requirement,
                reason,
            } => write!(
                f,
                "{file}: dropped trace of `{requirement}` in feature {feature}: {reason}"
            ),
        }
    }
}

/// Union `source` into `target`, reporting every path where one side has a
/// category and the other a requirement. The target's node is kept there, as
/// it is where both sides have a requirement.
pub fn merge_feature_structure(source: Structure, target: &mut Structure) -> Vec<Vec<String>> {
    let mut mismatches = Vec::new();
    merge_level(source, target, &mut Vec::new(), &mut mismatches);
    mismatches
}

fn merge_level(
    source: Structure,
    target: &mut Structure,
    path: &mut Vec<String>,
    mismatches: &mut Vec<Vec<String>>,
) {
    for (name, incoming) in source {
        path.push(name.clone());
        match target.get_mut(&name) {
            None => {
                target.insert(name, incoming);
            }
            Some(existing) => {
                let existing_leaf = existing.is_leaf();
                let incoming_leaf = incoming.is_leaf();
                match (existing, incoming) {
                    (StructureNode::Category(children), StructureNode::Category(more))
                        if !existing_leaf && !incoming_leaf =>
                    {
                        merge_level(more, children, path, mismatches)
                    }
                    _ if existing_leaf && incoming_leaf => {}
                    _ => mismatches.push(path.clone()),
                }
            }
        }
        path.pop();
    }
}

/// One aggregation run over a set of coverage files.
///
/// Owns the mutable state of a run: the global features (with their identity
/// allocator) and the spec cache. The spec cache lives exactly as long as the
/// session.
#[derive(Debug, Default)]
pub struct AggregationSession {
    features: FeatureSet,
    specs: SpecCache,
    diagnostics: Vec<Diagnostic>,
}

impl AggregationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue aggregating into features returned by an earlier session.
    pub fn resume(features: FeatureSet) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Read one coverage file and add every feature it records.
    ///
    /// `file_key` names the file in each feature's per-file breakdown.
    /// Returns the number of features read.
    pub fn add_file(&mut self, path: &Path, file_key: &str) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read coverage file {}", path.display()))?;
        let recordings = parse_recordings(&content)
            .wrap_err_with(|| format!("Failed to parse coverage file {}", path.display()))?;

        debug!(file = %path.display(), features = recordings.len(), "read coverage file");

        let count = recordings.len();
        for recording in recordings {
            self.add_feature(recording, file_key);
        }
        Ok(count)
    }

    /// Reconcile one recorded feature with its global aggregate.
    pub fn add_feature(&mut self, source: FeatureRecording, file: &str) -> LocalFeature<'_> {
        let FeatureRecording {
            title,
            group,
            description,
            mut structure,
            headers,
            records: raw_records,
        } = source;
        let title = normalize_name(&title);
        let group = normalize_name(&group);
        let description = normalize_name(&description);
        let key = feature_key(&group, &title);

        let FeatureSet {
            features,
            identities,
        } = &mut self.features;

        seed_structure(&mut structure, identities);

        let global = match features.entry(key.clone()) {
            Entry::Vacant(slot) => slot.insert(GlobalFeature {
                key,
                title: title.clone(),
                group: group.clone(),
                description: description.clone(),
                headers,
                structure,
                records: Evidence::new(),
                depth: 1,
                files: BTreeMap::new(),
            }),
            Entry::Occupied(slot) => {
                let global = slot.into_mut();
                for path in merge_feature_structure(structure, &mut global.structure) {
                    warn!(
                        feature = %global.key,
                        file,
                        path = %path.join(" / "),
                        "requirement structure disagrees with an earlier recording"
                    );
                    self.diagnostics.push(Diagnostic::StructureMismatch {
                        feature: global.key.clone(),
                        file: file.to_string(),
                        path,
                    });
                }
                if global.description.is_empty() {
                    global.description = description.clone();
                }
                if global.headers.is_empty() {
                    global.headers = headers;
                }
                global
            }
        };

        let mut records = Evidence::new();
        for record in raw_records {
            match resolve_reference(
                &record.requirement,
                record.category_path(),
                &mut global.structure,
                identities,
            ) {
                Ok(id) => records
                    .entry(id)
                    .or_default()
                    .push(self.specs.get_spec(&record)),
                Err(err) => {
                    warn!(
                        feature = %global.key,
                        file,
                        requirement = %record.requirement,
                        "dropping trace record: {err}"
                    );
                    self.diagnostics.push(Diagnostic::DroppedRecord {
                        feature: global.key.clone(),
                        file: file.to_string(),
                        requirement: record.requirement.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        for specs in records.values_mut() {
            dedupe_specs(specs);
        }

        // Cross-file duplicates are left for `finish`.
        let breakdown = global.files.entry(file.to_string()).or_default();
        for (id, specs) in &records {
            global
                .records
                .entry(id.clone())
                .or_default()
                .extend(specs.iter().cloned());
            let per_file = breakdown.entry(id.clone()).or_default();
            per_file.extend(specs.iter().cloned());
            dedupe_specs(per_file);
        }

        LocalFeature {
            title,
            group,
            description,
            file: file.to_string(),
            records,
            global,
        }
    }

    /// Normalize every global feature and end the session.
    ///
    /// Recomputes depths, removes duplicate evidence accumulated across files
    /// and gives every requirement an evidence list, empty when nothing
    /// traced it.
    pub fn finish(self) -> (FeatureSet, Vec<Diagnostic>) {
        let Self {
            mut features,
            diagnostics,
            ..
        } = self;

        for feature in features.features.values_mut() {
            feature.depth = depth(&feature.structure);
            for specs in feature.records.values_mut() {
                dedupe_specs(specs);
            }
            for requirement in requirement_paths(&feature.structure) {
                feature.records.entry(requirement.id).or_default();
            }
        }

        (features, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RawRecord, RequirementRef};
    use crate::structure::{get_branch, leaf_names};

    fn record(requirement: impl Into<RequirementRef>, file: &str, title_path: &[&str]) -> RawRecord {
        RawRecord {
            requirement: requirement.into(),
            category: None,
            title: title_path.last().copied().unwrap_or_default().to_string(),
            file_path: file.to_string(),
            title_path: title_path.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn feature(structure: Structure, records: Vec<RawRecord>) -> FeatureRecording {
        FeatureRecording {
            title: "Login".into(),
            group: "Auth".into(),
            structure,
            records,
            ..Default::default()
        }
    }

    fn high() -> Structure {
        Structure::new().with_category(
            "High",
            Structure::new()
                .with_requirement("Req A")
                .with_requirement("Req B"),
        )
    }

    fn id_at(feature: &GlobalFeature, path: &[&str]) -> String {
        match get_branch(&feature.structure, path) {
            Some(crate::structure::Branch::Requirement(Some(id))) => id.to_string(),
            other => panic!("no seeded requirement at {path:?}: {other:?}"),
        }
    }

    #[test]
    fn structure_from_one_file_and_records_from_another() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![]), "f1.json");
        session.add_feature(
            feature(Structure::new(), vec![record("Req A", "f2", &["t1"])]),
            "f2.json",
        );
        let (features, diagnostics) = session.finish();
        assert!(diagnostics.is_empty());

        let login = features.find("Auth", "Login").unwrap();
        assert_eq!(login.key, "Auth-/-Login");
        assert_eq!(leaf_names(&login.structure), ["Req A", "Req B"]);
        assert_eq!(login.depth, 2);

        let req_a = id_at(login, &["High", "Req A"]);
        let req_b = id_at(login, &["High", "Req B"]);
        assert_eq!(login.records[&req_a].len(), 1);
        assert_eq!(login.records[&req_a][0].id, "f2#t1");
        assert!(login.records[&req_b].is_empty());
        assert_eq!(login.records.len(), 2);
    }

    #[test]
    fn local_feature_reads_through_to_global() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![]), "f1.json");
        let local = session.add_feature(
            feature(
                Structure::new().with_requirement("Extra"),
                vec![record("Req B", "f2", &["t1"])],
            ),
            "f2.json",
        );

        assert_eq!(local.title, "Login");
        assert_eq!(local.records.len(), 1);
        assert_eq!(leaf_names(local.structure()), ["Req A", "Req B", "Extra"]);
        assert_eq!(local.global().files.len(), 2);
    }

    #[test]
    fn merging_same_structure_keeps_identities() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![]), "f1.json");
        let before: Vec<_> = requirement_paths(&session.features().find("Auth", "Login").unwrap().structure);

        session.add_feature(feature(high(), vec![]), "f2.json");
        let after = requirement_paths(&session.features().find("Auth", "Login").unwrap().structure);
        assert_eq!(before, after);
    }

    #[test]
    fn shape_mismatch_is_reported_and_target_wins() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![]), "f1.json");
        session.add_feature(
            feature(Structure::new().with_requirement("High"), vec![]),
            "f2.json",
        );
        let (features, diagnostics) = session.finish();

        assert_eq!(
            diagnostics,
            [Diagnostic::StructureMismatch {
                feature: "Auth-/-Login".into(),
                file: "f2.json".into(),
                path: vec!["High".into()],
            }]
        );
        let login = features.find("Auth", "Login").unwrap();
        assert_eq!(leaf_names(&login.structure), ["Req A", "Req B"]);
    }

    #[test]
    fn tracing_a_category_drops_the_record() {
        let mut session = AggregationSession::new();
        session.add_feature(
            feature(
                Structure::new().with_category("Category", Structure::new().with_requirement("Leaf")),
                vec![
                    record(vec!["Category".to_string(), "Leaf".to_string()], "f1", &["t1"]),
                    record("Category", "f1", &["t2"]),
                ],
            ),
            "f1.json",
        );
        let (features, diagnostics) = session.finish();

        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::DroppedRecord { requirement, .. }] if requirement == "Category"
        ));
        let login = features.find("Auth", "Login").unwrap();
        assert_eq!(login.records.len(), 1);
        let leaf = id_at(login, &["Category", "Leaf"]);
        assert_eq!(login.records[&leaf].len(), 1);
        assert!(get_branch(&login.structure, &["Category"]).unwrap().as_category().is_some());
    }

    #[test]
    fn same_test_tracing_two_requirements_shares_evidence() {
        let mut session = AggregationSession::new();
        session.add_feature(
            feature(
                high(),
                vec![record("Req A", "f1", &["t1"]), record("Req B", "f1", &["t1"])],
            ),
            "f1.json",
        );
        let (features, _) = session.finish();
        let login = features.find("Auth", "Login").unwrap();
        let a = &login.records[&id_at(login, &["High", "Req A"])][0];
        let b = &login.records[&id_at(login, &["High", "Req B"])][0];
        assert!(Rc::ptr_eq(a, b));
    }

    #[test]
    fn repeated_evidence_across_files_is_deduplicated_on_finish() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![record("Req A", "shared", &["t1"])]), "f1.json");
        session.add_feature(feature(high(), vec![record("Req A", "shared", &["t1"])]), "f2.json");

        let id = id_at(session.features().find("Auth", "Login").unwrap(), &["High", "Req A"]);
        assert_eq!(session.features().find("Auth", "Login").unwrap().records[&id].len(), 2);

        let (features, _) = session.finish();
        let login = features.find("Auth", "Login").unwrap();
        assert_eq!(login.records[&id].len(), 1);
        assert_eq!(login.files["f1.json"][&id].len(), 1);
        assert_eq!(login.files["f2.json"][&id].len(), 1);
    }

    #[test]
    fn unknown_requirement_is_registered_in_global_structure() {
        let mut session = AggregationSession::new();
        session.add_feature(feature(high(), vec![]), "f1.json");
        session.add_feature(
            feature(Structure::new(), vec![record("Surprise", "f2", &["t1"])]),
            "f2.json",
        );
        let (features, _) = session.finish();
        let login = features.find("Auth", "Login").unwrap();
        assert_eq!(leaf_names(&login.structure), ["Req A", "Req B", "Surprise"]);
        assert_eq!(login.records.len(), 3);
    }

    #[test]
    fn titles_are_whitespace_normalized_into_one_key() {
        let mut session = AggregationSession::new();
        let mut spaced = feature(high(), vec![]);
        spaced.title = "  Login ".into();
        spaced.group = "Auth\n".into();
        session.add_feature(spaced, "f1.json");
        session.add_feature(feature(high(), vec![]), "f2.json");
        assert_eq!(session.features().len(), 1);
    }

    #[test]
    fn resumed_session_never_reuses_identities() {
        let mut first = AggregationSession::new();
        first.add_feature(feature(high(), vec![]), "f1.json");
        let (features, _) = first.finish();
        assert_eq!(features.identities().allocated(), 2);

        let mut second = AggregationSession::resume(features);
        let mut other = feature(Structure::new().with_requirement("Other"), vec![]);
        other.title = "Logout".into();
        second.add_feature(other, "f2.json");
        let (features, _) = second.finish();

        let logout = features.find("Auth", "Logout").unwrap();
        assert_eq!(id_at(logout, &["Other"]), "requirement-00000003");
    }
}
