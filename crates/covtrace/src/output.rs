//! Output formatting for coverage statistics and reports

use crate::feature_name;
use covtrace_core::{
    Coverage, FeatureStats, GlobalFeature, Totals, calculate_feature_stats, calculate_totals,
    coverage_percent, requirement_rows, vertical_headers,
};
use eyre::Result;
use facet::Facet;
use owo_colors::OwoColorize;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
    Lcov,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            "markdown" | "md" => Some(Self::Markdown),
            "lcov" => Some(Self::Lcov),
            _ => None,
        }
    }
}

fn colored_percent(percent: u32) -> String {
    let text = format!("{percent}%");
    if percent >= 80 {
        text.green().to_string()
    } else if percent >= 50 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Render totals and per-feature numbers. LCOV has no summary form.
pub fn render_stats(coverage: &Coverage, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_stats_text(coverage)),
        OutputFormat::Json => render_stats_json(coverage),
        OutputFormat::Markdown => Ok(render_stats_markdown(coverage)),
        OutputFormat::Lcov => eyre::bail!("The stats command does not support lcov output"),
    }
}

/// Render the full report: every requirement with the tests covering it.
pub fn render_report(coverage: &Coverage, format: OutputFormat, verbose: bool) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_report_text(coverage, verbose)),
        OutputFormat::Json => render_report_json(coverage),
        OutputFormat::Markdown => Ok(render_report_markdown(coverage, verbose)),
        OutputFormat::Lcov => Ok(render_lcov(coverage)),
    }
}

fn render_stats_text(coverage: &Coverage) -> String {
    let totals = calculate_totals(coverage);
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!("{} Coverage Statistics\n", "##".bold()));
    output.push('\n');
    output.push_str(&format!(
        "Coverage: {} ({}/{} requirements)\n",
        colored_percent(totals.coverage_percent),
        totals.covered,
        totals.requirements
    ));
    output.push_str(&format!(
        "  {}, {}, {}\n",
        plural(totals.features, "feature"),
        plural(totals.files, "file"),
        plural(totals.specs, "spec"),
    ));
    output.push('\n');

    let width = coverage
        .features
        .iter()
        .map(|f| feature_name(f).chars().count())
        .max()
        .unwrap_or(0);
    for feature in coverage.features.iter() {
        let stats = calculate_feature_stats(feature);
        output.push_str(&format!(
            "  {:<width$}  {:>4}  ({}/{}, {})\n",
            feature_name(feature),
            colored_percent(stats.coverage_percent),
            stats.requirements_covered,
            stats.requirements_total,
            plural(stats.specs_count, "spec").dimmed(),
        ));
    }

    output
}

fn render_stats_markdown(coverage: &Coverage) -> String {
    let totals = calculate_totals(coverage);
    let mut output = String::new();

    output.push_str("# Coverage Statistics\n\n");
    output.push_str(&format!(
        "**Coverage:** {}% ({}/{} requirements)\n\n",
        totals.coverage_percent, totals.covered, totals.requirements
    ));
    output.push_str(&format!(
        "{} features, {} files, {} specs\n\n",
        totals.features, totals.files, totals.specs
    ));

    if !coverage.features.is_empty() {
        output.push_str("| Feature | Coverage | Covered | Specs |\n");
        output.push_str("|---|---|---|---|\n");
        for feature in coverage.features.iter() {
            let stats = calculate_feature_stats(feature);
            output.push_str(&format!(
                "| {} | {}% | {}/{} | {} |\n",
                feature_name(feature),
                stats.coverage_percent,
                stats.requirements_covered,
                stats.requirements_total,
                stats.specs_count
            ));
        }
    }

    output
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonStats {
    totals: Totals,
    features: Vec<JsonFeatureStats>,
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonFeatureStats {
    key: String,
    title: String,
    group: String,
    stats: FeatureStats,
}

fn render_stats_json(coverage: &Coverage) -> Result<String> {
    let report = JsonStats {
        totals: calculate_totals(coverage),
        features: coverage
            .features
            .iter()
            .map(|feature| JsonFeatureStats {
                key: feature.key.clone(),
                title: feature.title.clone(),
                group: feature.group.clone(),
                stats: calculate_feature_stats(feature),
            })
            .collect(),
    };
    facet_json::to_string_pretty(&report)
        .map_err(|e| eyre::eyre!("Failed to serialize statistics: {e}"))
}

fn render_report_text(coverage: &Coverage, verbose: bool) -> String {
    let totals = calculate_totals(coverage);
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!("{} Coverage Report\n", "##".bold()));
    output.push('\n');
    output.push_str(&format!(
        "Coverage: {} ({}/{} requirements)\n",
        colored_percent(totals.coverage_percent),
        totals.covered,
        totals.requirements
    ));
    output.push('\n');

    for feature in coverage.features.iter() {
        let stats = calculate_feature_stats(feature);
        output.push_str(&format!(
            "{} {} {}\n",
            "->".blue().bold(),
            feature_name(feature).cyan().bold(),
            colored_percent(stats.coverage_percent)
        ));
        if verbose && !feature.description.is_empty() {
            output.push_str(&format!("   {}\n", feature.description.dimmed()));
        }

        for row in requirement_rows(feature) {
            let path = row.path.join(" / ");
            if row.is_covered() {
                output.push_str(&format!("   {} {}\n", "+".green(), path));
                if verbose {
                    for spec in row.specs {
                        output.push_str(&format!(
                            "       {} {}\n",
                            spec.file_path.dimmed(),
                            spec.title_path.join(" > ")
                        ));
                    }
                }
            } else {
                output.push_str(&format!("   {} {}\n", "-".yellow(), path.dimmed()));
            }
        }
        output.push('\n');
    }

    if !coverage.diagnostics.is_empty() {
        output.push_str(&format!(
            "{} Warnings ({}):\n",
            "!".red().bold(),
            coverage.diagnostics.len()
        ));
        for diagnostic in &coverage.diagnostics {
            output.push_str(&format!("  {} {}\n", "-".red(), diagnostic));
        }
        output.push('\n');
    }

    output
}

fn render_report_markdown(coverage: &Coverage, verbose: bool) -> String {
    let totals = calculate_totals(coverage);
    let mut output = String::new();

    output.push_str("# Coverage Report\n\n");
    output.push_str(&format!(
        "**Coverage:** {}% ({}/{} requirements)\n\n",
        totals.coverage_percent, totals.covered, totals.requirements
    ));

    for feature in coverage.features.iter() {
        let stats = calculate_feature_stats(feature);
        output.push_str(&format!(
            "## {} ({}%)\n\n",
            feature_name(feature),
            stats.coverage_percent
        ));
        if !feature.description.is_empty() {
            output.push_str(&format!("{}\n\n", feature.description));
        }

        render_category_rollups(feature, &mut output);

        let columns = table_columns(feature);
        output.push_str(&format!("| {} | {} | {} |\n", columns[0], columns[1], columns[2]));
        output.push_str("|---|---|---|\n");
        for row in requirement_rows(feature) {
            let status = if row.is_covered() { "yes" } else { "no" };
            let specs = if verbose {
                row.specs
                    .iter()
                    .map(|spec| format!("`{}`", spec.id))
                    .collect::<Vec<_>>()
                    .join("<br>")
            } else {
                row.specs.len().to_string()
            };
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                row.path.join(" / "),
                status,
                specs
            ));
        }
        output.push('\n');
    }

    if !coverage.diagnostics.is_empty() {
        output.push_str("## Warnings\n\n");
        for diagnostic in &coverage.diagnostics {
            output.push_str(&format!("- {diagnostic}\n"));
        }
        output.push('\n');
    }

    output
}

/// Column titles, taking the feature's own headers where it declares them.
fn table_columns(feature: &GlobalFeature) -> [String; 3] {
    let mut columns = ["Requirement", "Covered", "Specs"].map(String::from);
    for (column, header) in columns.iter_mut().zip(&feature.headers) {
        *column = header.clone();
    }
    columns
}

fn render_category_rollups(feature: &GlobalFeature, output: &mut String) {
    let categories: Vec<_> = vertical_headers(feature)
        .into_iter()
        .flatten()
        .filter(|cell| cell.requirement.is_none())
        .collect();
    if categories.is_empty() {
        return;
    }

    for cell in categories {
        output.push_str(&format!(
            "{}- {}: {}/{} ({}%)\n",
            "  ".repeat(cell.row),
            cell.name,
            cell.covered,
            cell.total,
            coverage_percent(cell.covered, cell.total)
        ));
    }
    output.push('\n');
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonReport {
    totals: Totals,
    features: Vec<JsonFeature>,
    warnings: Vec<String>,
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonFeature {
    key: String,
    title: String,
    group: String,
    description: String,
    stats: FeatureStats,
    requirements: Vec<JsonRequirement>,
    files: Vec<JsonFile>,
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonRequirement {
    id: String,
    path: Vec<String>,
    covered: bool,
    specs: Vec<JsonSpec>,
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonSpec {
    id: String,
    title: String,
    file_path: String,
    title_path: Vec<String>,
}

#[derive(Facet)]
#[facet(rename_all = "camelCase")]
struct JsonFile {
    file: String,
    covered: usize,
}

fn render_report_json(coverage: &Coverage) -> Result<String> {
    let features = coverage
        .features
        .iter()
        .map(|feature| JsonFeature {
            key: feature.key.clone(),
            title: feature.title.clone(),
            group: feature.group.clone(),
            description: feature.description.clone(),
            stats: calculate_feature_stats(feature),
            requirements: requirement_rows(feature)
                .into_iter()
                .map(|row| JsonRequirement {
                    covered: row.is_covered(),
                    specs: row
                        .specs
                        .iter()
                        .map(|spec| JsonSpec {
                            id: spec.id.clone(),
                            title: spec.title.clone(),
                            file_path: spec.file_path.clone(),
                            title_path: spec.title_path.clone(),
                        })
                        .collect(),
                    id: row.id,
                    path: row.path,
                })
                .collect(),
            files: feature
                .files
                .iter()
                .map(|(file, evidence)| JsonFile {
                    file: file.clone(),
                    covered: evidence.values().filter(|specs| !specs.is_empty()).count(),
                })
                .collect(),
        })
        .collect();

    let report = JsonReport {
        totals: calculate_totals(coverage),
        features,
        warnings: coverage.diagnostics.iter().map(ToString::to_string).collect(),
    };
    facet_json::to_string_pretty(&report).map_err(|e| eyre::eyre!("Failed to serialize report: {e}"))
}

/// LCOV tracefile: one record per feature, one function and one line per
/// requirement, hit once per covering spec.
fn render_lcov(coverage: &Coverage) -> String {
    let mut output = String::new();

    for feature in coverage.features.iter() {
        let rows = requirement_rows(feature);
        output.push_str(&format!("TN:{}\n", lcov_name(&feature.key)));
        output.push_str(&format!("SF:{}\n", feature_name(feature)));

        for (index, row) in rows.iter().enumerate() {
            output.push_str(&format!("FN:{},{}\n", index + 1, lcov_name(&row.path.join("/"))));
        }
        for row in &rows {
            output.push_str(&format!(
                "FNDA:{},{}\n",
                row.specs.len(),
                lcov_name(&row.path.join("/"))
            ));
        }
        let hit = rows.iter().filter(|row| row.is_covered()).count();
        output.push_str(&format!("FNF:{}\nFNH:{}\n", rows.len(), hit));

        for (index, row) in rows.iter().enumerate() {
            output.push_str(&format!("DA:{},{}\n", index + 1, row.specs.len()));
        }
        output.push_str(&format!("LF:{}\nLH:{}\n", rows.len(), hit));
        output.push_str("end_of_record\n");
    }

    output
}

// Commas separate LCOV fields.
fn lcov_name(name: &str) -> String {
    name.replace(',', ";")
}
