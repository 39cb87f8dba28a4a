//! Test evidence ("specs") and their deduplication
//!
//! A spec is one physical test, identified by its file and title path. The
//! same test tracing several requirements must show up as a single shared
//! [`Spec`], so every aggregation session owns a [`SpecCache`] handing out
//! one `Rc<Spec>` per spec id.

use crate::recording::RawRecord;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// One test that produced coverage evidence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spec {
    /// `filePath#title/path`
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub title_path: Vec<String>,
}

impl Spec {
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            id: record.spec_id(),
            title: record.title.clone(),
            file_path: record.file_path.clone(),
            title_path: record.title_path.clone(),
        }
    }
}

/// Spec id → canonical shared spec.
#[derive(Debug, Default)]
pub struct SpecCache {
    specs: HashMap<String, Rc<Spec>>,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached spec for this record's test, creating it on first sight.
    pub fn get_spec(&mut self, record: &RawRecord) -> Rc<Spec> {
        self.specs
            .entry(record.spec_id())
            .or_insert_with(|| Rc::new(Spec::from_record(record)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn clear(&mut self) {
        self.specs.clear();
    }
}

/// Drop repeated evidence, keeping the first occurrence of each spec id.
pub fn dedupe_specs(specs: &mut Vec<Rc<Spec>>) {
    let mut seen = HashSet::new();
    specs.retain(|spec| seen.insert(spec.id.clone()));
}

/// Number of distinct specs across several evidence lists.
pub fn distinct_specs<'a>(lists: impl IntoIterator<Item = &'a Vec<Rc<Spec>>>) -> usize {
    lists
        .into_iter()
        .flatten()
        .map(|spec| spec.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}
