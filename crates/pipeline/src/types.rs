//! Shared value types for the speech analysis domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. a report window never ends before it
//! starts, a telemetry record never finishes before it starts) and participate
//! in domain computations.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{InferenceFailure, MemberId, ModelName, RunId};

// ---------------------------------------------------------------------------
// Members and corpora
// ---------------------------------------------------------------------------

/// A tracked speaker, as supplied by the source store. Read-only to the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Stable source-store key.
    pub id: MemberId,
    /// Display name.
    pub name: String,
    /// Party label; `None` when the source has no affiliation recorded.
    pub party: Option<String>,
}

impl Member {
    /// Party label for display, with a placeholder when absent.
    pub fn party_label(&self) -> &str {
        match self.party.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => "Unknown",
        }
    }
}

/// One selected member together with the concatenation of their speeches.
///
/// Recomputed on every run from the source store; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCorpus {
    /// The speaker.
    pub member: Member,
    /// Speech rows joined with [`SPEECH_SEPARATOR`] in source row order.
    pub speech_text: String,
}

/// Separator placed between consecutive speech rows of one member.
pub const SPEECH_SEPARATOR: &str = "\n\n---\n\n";

/// Which member window the corpus reader should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSelection {
    /// Maximum number of members to return.
    pub limit: u32,
    /// Number of members (in identifier order) to skip first.
    pub start_index: u32,
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// The two analysis stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// Broad first pass over the speech corpus.
    Initial,
    /// Narrow second pass over the initial analysis.
    Refined,
}

impl AnalysisStage {
    /// Lowercase name used in telemetry and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Refined => "refined",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-shot generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Model that should answer.
    pub model: ModelName,
    /// Upper bound on the whole request, connection included.
    pub timeout: Duration,
}

/// Non-blank text returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText(String);

impl GeneratedText {
    /// Wraps generated text, returning `None` if it is blank.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let t = text.into();
        if t.trim().is_empty() {
            None
        } else {
            Some(Self(t))
        }
    }

    /// Returns the text as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the text.
    pub fn into_string(self) -> String {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Both generated texts for one member, as persisted by the result store.
///
/// Keyed by `member.id`; a later run replaces the earlier row entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The analysed speaker.
    pub member: Member,
    /// Output of the initial stage.
    pub initial_analysis: String,
    /// Output of the refinement stage.
    pub refined_analysis: String,
    /// When the refinement stage finished.
    pub analyzed_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Outcome of one stage for telemetry purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage produced text.
    Succeeded,
    /// The stage was not attempted (e.g. empty corpus).
    Skipped,
    /// The prompt could not be rendered.
    PromptFailed,
    /// The request failed.
    Failed(InferenceFailure),
    /// The stage produced text but the member's result could not be saved.
    PersistFailed,
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => f.write_str("ok"),
            Self::Skipped => f.write_str("skipped"),
            Self::PromptFailed => f.write_str("failed:prompt"),
            Self::Failed(failure) => write!(f, "failed:{}", failure.kind()),
            Self::PersistFailed => f.write_str("failed:persistence"),
        }
    }
}

/// Timing and size observation for one stage of one member in one run.
///
/// Append-only: a record is never updated once written.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Run that produced the record.
    pub run_id: RunId,
    /// The speaker.
    pub member: Member,
    /// Character count of the joined corpus before cleaning.
    pub speech_chars: usize,
    /// Stage observed.
    pub stage: AnalysisStage,
    /// How the stage ended.
    pub outcome: StageOutcome,
    /// Wall-clock start.
    pub started_at: Timestamp,
    /// Wall-clock end; never earlier than `started_at`.
    pub finished_at: Timestamp,
}

impl TelemetryRecord {
    /// Time between start and finish.
    pub fn duration(&self) -> Duration {
        (self.finished_at.as_datetime() - self.started_at.as_datetime())
            .to_std()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Report window
// ---------------------------------------------------------------------------

/// The inclusive date window named in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Creates a window, returning `None` if `from` is after `to`.
    #[must_use]
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        if from <= to {
            Some(Self { from, to })
        } else {
            None
        }
    }

    /// Creates the window of `days` days ending on `to`, returning `None` if
    /// the start would fall before the earliest representable date.
    #[must_use]
    pub fn ending_on(to: NaiveDate, days: u32) -> Option<Self> {
        let from = to.checked_sub_days(chrono::Days::new(u64::from(days)))?;
        Some(Self { from, to })
    }

    /// First day of the window.
    pub fn start(self) -> NaiveDate {
        self.from
    }

    /// Last day of the window.
    pub fn end(self) -> NaiveDate {
        self.to
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns this timestamp advanced by `elapsed`.
    ///
    /// Used to derive end times from a monotonic clock so that an end time
    /// can never precede its start even if the wall clock steps backwards.
    pub fn plus(self, elapsed: Duration) -> Self {
        let delta = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        Self(self.0.checked_add_signed(delta).unwrap_or(self.0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
