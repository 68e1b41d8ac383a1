//! Error taxonomy and retry-policy types for the speech analysis pipeline.
//!
//! Errors fall into two groups:
//!
//! - **Fatal**: [`PipelineError`] (wrapping [`ConfigError`] and
//!   [`SourceUnavailable`]) stops the run before or instead of any member
//!   processing.
//! - **Local**: [`InferenceFailure`], [`PromptError`] and [`PersistenceError`]
//!   affect a single member. They are folded into a [`SkipReason`] at the
//!   member boundary and the run moves on. [`TelemetryError`] and
//!   [`ReportError`] are best-effort side channels and only ever surface as
//!   log events.
//!
//! [`RetryPolicy`] is a cross-cutting concern: an error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AnalysisStage;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`InferenceFailure::retry_policy`] to let the analyzer decide
/// whether to re-issue a request when retries are enabled.
///
/// - `Retryable` errors: endpoint unreachable, request timed out.
/// - `NonRetryable` errors: malformed or non-success responses, empty output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The configuration could not be loaded or failed validation.
///
/// Every variant names the offending key as `Section.key` so the operator can
/// fix the file without guessing. A run never starts with a configuration
/// that produced one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The configuration text is not valid TOML or has the wrong shape.
    #[error("Configuration could not be parsed: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },

    /// A required key is absent.
    #[error("Missing required configuration key '{key}'")]
    MissingKey {
        /// `Section.key` of the missing entry.
        key: String,
    },

    /// A key is present but its value is out of range or malformed.
    #[error("Invalid value for configuration key '{key}': {reason}")]
    InvalidValue {
        /// `Section.key` of the offending entry.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A template does not contain a placeholder it must contain.
    #[error("Template '{key}' is missing required placeholder '{{{placeholder}}}'")]
    MissingPlaceholder {
        /// `Section.key` of the template.
        key: String,
        /// Name of the absent placeholder.
        placeholder: String,
    },

    /// A template refers to a placeholder that is never bound, or is
    /// syntactically broken.
    #[error("Template '{key}' is malformed: {source}")]
    MalformedTemplate {
        /// `Section.key` of the template.
        key: String,
        /// Underlying template error.
        source: PromptError,
    },
}

// ---------------------------------------------------------------------------
// Source store
// ---------------------------------------------------------------------------

/// The source store could not be opened or does not expose the expected
/// relation and columns.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Source store unavailable: {message}")]
pub struct SourceUnavailable {
    /// Description of the failure (driver message included).
    pub message: String,
}

impl SourceUnavailable {
    /// Creates a [`SourceUnavailable`] from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// A text-generation request did not produce usable text.
///
/// Failures are never coerced into empty strings: callers can always tell
/// "the model returned nothing" ([`InferenceFailure::EmptyResponse`]) apart
/// from "the model was unreachable" ([`InferenceFailure::Connection`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceFailure {
    /// The endpoint could not be reached.
    #[error("Inference endpoint unreachable: {message}")]
    Connection {
        /// Transport diagnostic.
        message: String,
    },

    /// No response arrived within the configured timeout.
    #[error("Inference request timed out after {}s", .after.as_secs())]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The endpoint answered, but with a non-success status or a body that
    /// could not be decoded.
    #[error("Inference protocol failure{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Protocol {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Error field of the response, or a decoding diagnostic.
        message: String,
    },

    /// The endpoint answered successfully but the generated text was absent
    /// or blank.
    #[error("Inference response contained no generated text")]
    EmptyResponse,
}

impl InferenceFailure {
    /// Short lowercase label used in telemetry outcomes and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Protocol { .. } => "protocol",
            Self::EmptyResponse => "empty",
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => RetryPolicy::Retryable { after: None },
            Self::Protocol { .. } | Self::EmptyResponse => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

/// A template could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// The template names a placeholder for which no value was supplied.
    #[error("placeholder '{{{name}}}' has no binding")]
    UnboundPlaceholder {
        /// Placeholder name as written in the template.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Side channels and persistence
// ---------------------------------------------------------------------------

/// Writing an analysis result to the result store failed.
///
/// Aborts processing for the affected member only; rows already committed for
/// other members are untouched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Result store write failed: {message}")]
pub struct PersistenceError {
    /// Driver diagnostic.
    pub message: String,
}

impl PersistenceError {
    /// Creates a [`PersistenceError`] from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Appending a telemetry record failed. Never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Telemetry append failed: {message}")]
pub struct TelemetryError {
    /// I/O diagnostic.
    pub message: String,
}

impl TelemetryError {
    /// Creates a [`TelemetryError`] from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The rendered report could not be written.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Report write to '{location}' failed: {message}")]
pub struct ReportError {
    /// Where the report was to be written.
    pub location: String,
    /// I/O diagnostic.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Member-level outcome
// ---------------------------------------------------------------------------

/// Why a member was skipped for the current run.
///
/// Produced at the member boundary by the analyzer so the run loop can
/// aggregate skips instead of unwinding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    /// The member's corpus was empty after markup removal.
    #[error("no speech text left to analyse")]
    EmptyCorpus,

    /// A stage prompt could not be rendered.
    #[error("{stage} prompt could not be rendered: {error}")]
    Prompt {
        /// Stage whose prompt failed.
        stage: AnalysisStage,
        /// Rendering error.
        error: PromptError,
    },

    /// A stage's inference request failed.
    #[error("{stage} stage failed: {failure}")]
    Inference {
        /// Stage whose request failed.
        stage: AnalysisStage,
        /// Classified failure.
        failure: InferenceFailure,
    },

    /// Both stages succeeded but the result could not be stored.
    #[error("{0}")]
    Persistence(PersistenceError),
}

impl SkipReason {
    /// Short label used to group skips in the run summary.
    pub fn label(&self) -> String {
        match self {
            Self::EmptyCorpus => "empty_corpus".to_string(),
            Self::Prompt { stage, .. } => format!("{stage}:prompt"),
            Self::Inference { stage, failure } => format!("{stage}:{}", failure.kind()),
            Self::Persistence(_) => "persistence".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that stop the run.
///
/// These are distinct from per-member failures in that no further members can
/// be processed once one of them occurs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration is invalid; produced before any work starts.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The source store cannot be read.
    #[error(transparent)]
    SourceUnavailable(#[from] SourceUnavailable),

    /// The result store cannot be opened, so nothing could be persisted.
    #[error("Result store unavailable: {0}")]
    ResultStoreUnavailable(PersistenceError),
}
