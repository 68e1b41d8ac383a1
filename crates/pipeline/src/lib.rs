//! Core domain for the speech analysis pipeline.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, error type, and port trait used throughout the workspace.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`MemberId`, `RunId`, `ModelName`) |
//! | [`types`] | Shared value types (`Member`, `AnalysisResult`, `TelemetryRecord`, etc.) |
//! | [`errors`] | Error taxonomy, `SkipReason`, and `RetryPolicy` |
//! | [`config`] | Configuration model and validation |
//! | [`template`] | Placeholder templates for prompts and filenames |
//! | [`corpus`] | Speech corpus joining and cleaning |
//! | [`report`] | Pure report rendering |
//! | [`ports`] | Traits implemented by infrastructure crates |

pub mod config;
pub mod corpus;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod report;
pub mod template;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    AnalysisLimits, DatabaseConfig, InferenceConfig, LoggingConfig, OutputConfig,
    PipelineConfig, PromptTemplates, StageModel,
};
pub use errors::{
    ConfigError, InferenceFailure, PersistenceError, PipelineError, PromptError, ReportError,
    RetryPolicy, SkipReason, SourceUnavailable, TelemetryError,
};
pub use identifiers::{MemberId, ModelName, RunId};
pub use ports::{CorpusSource, InferenceClient, ReportSink, ResultSink, TelemetrySink};
pub use report::{render_report, report_filename, RenderedReport, ReportContext};
pub use template::{Template, TemplateKind};
pub use types::{
    AnalysisResult, AnalysisStage, DateRange, GeneratedText, GenerationRequest, Member,
    MemberCorpus, MemberSelection, StageOutcome, TelemetryRecord, Timestamp, SPEECH_SEPARATOR,
};
