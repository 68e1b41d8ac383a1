//! Port traits implemented by infrastructure crates.
//!
//! The orchestration layer only ever sees these traits. Each one is a separate
//! capability so that a failure in one destination (e.g. the telemetry file)
//! can never be confused with, or abort, another (e.g. the result store).
//!
//! All traits are dyn-compatible via `async_trait` and are held as
//! `Arc<dyn Trait>` by the orchestrator.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    AnalysisResult, GeneratedText, GenerationRequest, InferenceFailure, MemberCorpus,
    MemberSelection, PersistenceError, RenderedReport, ReportError, SourceUnavailable,
    TelemetryError, TelemetryRecord,
};

/// Read access to the populated source store.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Returns at most `selection.limit` members, ordered by ascending
    /// identifier after skipping `selection.start_index` members, each with
    /// their speeches joined in a stable order.
    ///
    /// An empty store (or a window past its end) yields an empty vector, not
    /// an error.
    async fn select_members(
        &self,
        selection: MemberSelection,
    ) -> Result<Vec<MemberCorpus>, SourceUnavailable>;
}

/// A text-generation service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Issues exactly one request. Implementations never retry.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedText, InferenceFailure>;
}

/// Critical-path persistence of analysis results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Inserts or fully replaces the row for `result.member.id`.
    ///
    /// Either the complete new row becomes visible or the previous row
    /// remains.
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), PersistenceError>;
}

/// Best-effort, append-only stage telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Appends one record. Never rewrites earlier records.
    async fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError>;
}

/// Destination for the final run report.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Writes the document and returns where it was written.
    async fn write(&self, report: &RenderedReport) -> Result<PathBuf, ReportError>;
}
