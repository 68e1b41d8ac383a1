//! The run loop: select members, analyse each in turn, then write the report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use pipeline::{
    render_report, AnalysisResult, CorpusSource, DateRange, InferenceClient, Member,
    MemberSelection, PipelineConfig, PipelineError, ReportContext, ReportSink, ResultSink, RunId,
    SkipReason, TelemetrySink,
};
use tracing::{error, info, instrument, warn};

use crate::analyzer::{AnalyzerSettings, TwoStageAnalyzer};

/// Per-invocation parameters.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub run_id: RunId,
    pub selection: MemberSelection,
    pub date_range: DateRange,
}

/// A member that did not complete, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMember {
    pub member: Member,
    pub reason: SkipReason,
}

/// What a run achieved.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Members returned by the source for this run.
    pub selected: usize,
    /// Members whose analysis was persisted, in processing order.
    pub completed: Vec<AnalysisResult>,
    pub skipped: Vec<SkippedMember>,
    /// Where the report was written, if one was written.
    pub report: Option<PathBuf>,
}

impl RunSummary {
    /// Skip counts grouped by [`SkipReason::label`].
    pub fn skip_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.reason.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Composes the ports into a full run.
pub struct RunOrchestrator {
    config: Arc<PipelineConfig>,
    source: Arc<dyn CorpusSource>,
    reports: Arc<dyn ReportSink>,
    analyzer: TwoStageAnalyzer,
}

impl RunOrchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Arc<dyn CorpusSource>,
        inference: Arc<dyn InferenceClient>,
        results: Arc<dyn ResultSink>,
        telemetry: Arc<dyn TelemetrySink>,
        reports: Arc<dyn ReportSink>,
    ) -> Self {
        let analyzer = TwoStageAnalyzer::new(
            inference,
            results,
            telemetry,
            AnalyzerSettings::from_config(&config),
        );
        Self {
            config,
            source,
            reports,
            analyzer,
        }
    }

    /// Executes one run.
    ///
    /// Members are processed strictly one at a time in source order. A
    /// member's failure is recorded in the summary and the loop moves on; only
    /// an unreadable source ends the run early.
    #[instrument(skip_all, fields(run_id = %options.run_id))]
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary, PipelineError> {
        let members = self.source.select_members(options.selection).await?;
        info!(
            selected = members.len(),
            start_index = options.selection.start_index,
            limit = options.selection.limit,
            "Members selected"
        );

        let mut summary = RunSummary {
            run_id: options.run_id,
            selected: members.len(),
            completed: Vec::new(),
            skipped: Vec::new(),
            report: None,
        };

        let pause = self.config.limits.pause_between_members;
        for (index, corpus) in members.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            info!(
                position = index + 1,
                of = members.len(),
                member_id = %corpus.member.id,
                member = %corpus.member.name,
                "Analysing member"
            );
            match self.analyzer.analyze(options.run_id, corpus).await {
                Ok(result) => summary.completed.push(result),
                Err(reason) => {
                    warn!(
                        member_id = %corpus.member.id,
                        member = %corpus.member.name,
                        reason = %reason,
                        "Member skipped"
                    );
                    summary.skipped.push(SkippedMember {
                        member: corpus.member.clone(),
                        reason,
                    });
                }
            }
        }

        if summary.completed.is_empty() {
            warn!("No member completed; report not written");
        } else {
            summary.report = self.write_report(&summary, &options).await;
        }

        info!(
            selected = summary.selected,
            completed = summary.completed.len(),
            skipped = summary.skipped.len(),
            skip_counts = ?summary.skip_counts(),
            report = ?summary.report,
            "Run finished"
        );
        Ok(summary)
    }

    async fn write_report(&self, summary: &RunSummary, options: &RunOptions) -> Option<PathBuf> {
        let context = ReportContext {
            initial_model: &self.config.inference.initial.model,
            refiner_model: &self.config.inference.refiner.model,
            source_database: &self.config.database.source_database,
            analysis_database: &self.config.database.analysis_database,
            date_range: options.date_range,
            start_index: options.selection.start_index,
            skipped: summary.skipped.len(),
        };
        let rendered = match render_report(
            &summary.completed,
            &context,
            &self.config.output.report_filename,
        ) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "Report could not be rendered");
                return None;
            }
        };
        match self.reports.write(&rendered).await {
            Ok(path) => {
                info!(path = %path.display(), "Report written");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "Report could not be written");
                None
            }
        }
    }
}
