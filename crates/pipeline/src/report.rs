//! Report rendering.
//!
//! Rendering is a pure function of the accumulated results and the run
//! parameters; writing the document is left to a [`crate::ReportSink`].

use std::fmt::Write as _;
use std::path::Path;

use crate::template::{Template, DATE_FROM, DATE_TO, NUM_MEMBERS, START_INDEX};
use crate::{AnalysisResult, DateRange, ModelName, PromptError};

/// Run parameters that appear in the report.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub initial_model: &'a ModelName,
    pub refiner_model: &'a ModelName,
    pub source_database: &'a Path,
    pub analysis_database: &'a Path,
    pub date_range: DateRange,
    pub start_index: u32,
    /// Members selected for the run but skipped.
    pub skipped: usize,
}

/// A rendered report ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    /// File name derived from the configured template.
    pub filename: String,
    /// Markdown document.
    pub body: String,
}

/// Derives the report filename. Deterministic in its inputs.
pub fn report_filename(
    template: &Template,
    num_members: usize,
    date_range: DateRange,
    start_index: u32,
) -> Result<String, PromptError> {
    let num_members = num_members.to_string();
    let date_from = date_range.start().format("%Y-%m-%d").to_string();
    let date_to = date_range.end().format("%Y-%m-%d").to_string();
    let start_index = start_index.to_string();
    template.render(&[
        (NUM_MEMBERS, &num_members),
        (DATE_FROM, &date_from),
        (DATE_TO, &date_to),
        (START_INDEX, &start_index),
    ])
}

/// Renders one section per result, sorted by member name (ties broken by
/// member id), framed by a header and footer describing the run.
pub fn render_report(
    results: &[AnalysisResult],
    context: &ReportContext<'_>,
    filename_template: &Template,
) -> Result<RenderedReport, PromptError> {
    let filename = report_filename(
        filename_template,
        results.len(),
        context.date_range,
        context.start_index,
    )?;

    let mut sorted: Vec<&AnalysisResult> = results.iter().collect();
    sorted.sort_by(|a, b| {
        a.member
            .name
            .cmp(&b.member.name)
            .then(a.member.id.cmp(&b.member.id))
    });

    // Writing into a String cannot fail.
    let mut body = String::new();
    let _ = writeln!(body, "# Speech Analysis Report\n");
    let _ = writeln!(
        body,
        "Models: initial `{}`, refiner `{}`. Speech data from `{}` ({} to {}).",
        context.initial_model,
        context.refiner_model,
        context.source_database.display(),
        context.date_range.start(),
        context.date_range.end(),
    );

    for result in sorted {
        let _ = writeln!(body, "\n---\n");
        let _ = writeln!(body, "## {}\n", result.member.name);
        let _ = writeln!(body, "**Party**: {}\n", result.member.party_label());
        let _ = writeln!(body, "### Initial Analysis ({})\n", context.initial_model);
        let _ = writeln!(body, "{}\n", result.initial_analysis.trim_end());
        let _ = writeln!(body, "### Refined Analysis ({})\n", context.refiner_model);
        let _ = writeln!(body, "{}", result.refined_analysis.trim_end());
    }

    let _ = writeln!(body, "\n---\n");
    let _ = writeln!(
        body,
        "*{} member(s) analysed, {} skipped. Results saved in `{}`.*",
        results.len(),
        context.skipped,
        context.analysis_database.display(),
    );

    Ok(RenderedReport { filename, body })
}
