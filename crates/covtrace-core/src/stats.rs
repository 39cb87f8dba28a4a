//! Coverage statistics over aggregated features

use crate::features::{Evidence, GlobalFeature};
use crate::reader::Coverage;
use crate::specs::{Spec, distinct_specs};
use crate::structure::{Structure, depth, requirement_paths};
use facet::Facet;
use std::rc::Rc;

/// Coverage numbers for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct FeatureStats {
    pub requirements_total: usize,
    pub requirements_covered: usize,
    pub specs_count: usize,
    pub coverage_percent: u32,
}

/// Coverage numbers summed over every feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct Totals {
    pub features: usize,
    pub files: usize,
    pub specs: usize,
    pub requirements: usize,
    pub covered: usize,
    pub coverage_percent: u32,
}

/// Rounded percentage. Nothing to cover counts as fully covered.
pub fn coverage_percent(covered: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (covered as f64 / total as f64 * 100.0).round() as u32
}

pub fn calculate_feature_stats(feature: &GlobalFeature) -> FeatureStats {
    let requirements_total = feature.records.len();
    let requirements_covered = feature
        .records
        .values()
        .filter(|specs| !specs.is_empty())
        .count();

    FeatureStats {
        requirements_total,
        requirements_covered,
        specs_count: distinct_specs(feature.records.values()),
        coverage_percent: coverage_percent(requirements_covered, requirements_total),
    }
}

pub fn calculate_totals(coverage: &Coverage) -> Totals {
    let mut totals = Totals {
        features: coverage.features.len(),
        files: coverage
            .roots
            .iter()
            .map(|root| root.file_count_deep())
            .sum(),
        specs: 0,
        requirements: 0,
        covered: 0,
        coverage_percent: 100,
    };

    for feature in coverage.features.iter() {
        let stats = calculate_feature_stats(feature);
        totals.specs += stats.specs_count;
        totals.requirements += stats.requirements_total;
        totals.covered += stats.requirements_covered;
    }
    totals.coverage_percent = coverage_percent(totals.covered, totals.requirements);
    totals
}

/// One requirement of a feature with its evidence.
#[derive(Debug, Clone)]
pub struct RequirementRow<'a> {
    pub id: String,
    pub path: Vec<String>,
    pub specs: &'a [Rc<Spec>],
}

impl RequirementRow<'_> {
    pub fn is_covered(&self) -> bool {
        !self.specs.is_empty()
    }
}

/// Every requirement of `feature` in structure order.
pub fn requirement_rows(feature: &GlobalFeature) -> Vec<RequirementRow<'_>> {
    requirement_paths(&feature.structure)
        .into_iter()
        .map(|requirement| {
            let specs = feature
                .records
                .get(&requirement.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            RequirementRow {
                id: requirement.id,
                path: requirement.path,
                specs,
            }
        })
        .collect()
}

/// A header cell of the requirement table.
///
/// Rows are category levels. A category spans the columns of all the
/// requirements beneath it; a requirement spans down to the last row.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct HeaderCell {
    pub name: String,
    pub path: Vec<String>,
    pub row: usize,
    pub colspan: usize,
    pub rowspan: usize,
    /// Covered requirements in this subtree.
    pub covered: usize,
    /// Requirements in this subtree.
    pub total: usize,
    /// Identity, for requirement cells.
    pub requirement: Option<String>,
}

/// Header rows for laying `feature` out as a table with one column per
/// requirement.
pub fn vertical_headers(feature: &GlobalFeature) -> Vec<Vec<HeaderCell>> {
    let rows = depth(&feature.structure);
    let mut out = vec![Vec::new(); rows];
    fill_headers(
        &feature.structure,
        &feature.records,
        0,
        &mut Vec::new(),
        &mut out,
    );
    out
}

fn fill_headers(
    structure: &Structure,
    records: &Evidence,
    row: usize,
    path: &mut Vec<String>,
    out: &mut Vec<Vec<HeaderCell>>,
) -> (usize, usize) {
    let rows = out.len();
    let mut covered_sum = 0;
    let mut total_sum = 0;

    for (name, node) in structure.iter() {
        path.push(name.to_string());
        let cell = match node.as_category() {
            Some(children) => {
                let (covered, total) = fill_headers(children, records, row + 1, path, out);
                HeaderCell {
                    name: name.to_string(),
                    path: path.clone(),
                    row,
                    colspan: total,
                    rowspan: 1,
                    covered,
                    total,
                    requirement: None,
                }
            }
            None => {
                let requirement = node.identity().map(str::to_string);
                let covered = requirement
                    .as_ref()
                    .and_then(|id| records.get(id))
                    .is_some_and(|specs| !specs.is_empty());
                HeaderCell {
                    name: name.to_string(),
                    path: path.clone(),
                    row,
                    colspan: 1,
                    rowspan: rows - row,
                    covered: usize::from(covered),
                    total: 1,
                    requirement,
                }
            }
        };
        covered_sum += cell.covered;
        total_sum += cell.total;
        out[row].push(cell);
        path.pop();
    }

    (covered_sum, total_sum)
}
