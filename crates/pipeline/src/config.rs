//! Run configuration model.
//!
//! The configuration is a sectioned TOML document:
//!
//! ```toml
//! [Database]
//! source_database = "members.db"
//! analysis_database = "analysis_results.db"
//!
//! [Ollama]
//! api_url = "http://localhost:11434/api/generate"
//! model_name = "gemma3"
//! request_timeout_seconds = 180
//! refiner_model_name = "gemma3"
//! refiner_request_timeout_seconds = 180
//!
//! [Output]
//! report_filename_template = "analysis_{num_members}_members_{date_from}_to_{date_to}.md"
//!
//! [AnalysisLimits]
//! number_of_members = 10
//!
//! [Prompts.InitialAnalysis]
//! template = """..."""
//!
//! [Prompts.RefinementAnalysis]
//! template = """..."""
//!
//! [Logging]
//! log_file = "analysis_log.csv"
//! ```
//!
//! Loading is two-phase. The document is first deserialised into a raw model
//! whose fields are all optional, then validated into an immutable
//! [`PipelineConfig`]. Validation reports the first offending key as
//! `Section.key`; a partially valid document never yields a config.
//!
//! Reading the file is the binary's job. This module only parses text.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::template::{Template, TemplateKind};
use crate::{ConfigError, ModelName};

const DEFAULT_REPORT_DIRECTORY: &str = ".";
const DEFAULT_DATE_WINDOW_DAYS: i64 = 365;
const DEFAULT_MAX_SPEECH_CHARS: i64 = 15_000;
const DEFAULT_PAUSE_BETWEEN_MEMBERS_MS: i64 = 1_000;
const DEFAULT_MAX_RETRIES: i64 = 0;
const DEFAULT_RETRY_BACKOFF_SECONDS: i64 = 5;

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Immutable, fully validated run configuration.
///
/// Passed explicitly from the composition root to every component that needs
/// a tunable; nothing looks configuration up ambiently.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub inference: InferenceConfig,
    pub output: OutputConfig,
    pub limits: AnalysisLimits,
    pub prompts: PromptTemplates,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite file holding `(member_id, name, party, speech_text)` rows.
    pub source_database: PathBuf,
    /// SQLite file the result store writes to; created if absent.
    pub analysis_database: PathBuf,
}

/// Model and timeout for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageModel {
    pub model: ModelName,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Full URL of the generate endpoint.
    pub api_url: String,
    pub initial: StageModel,
    pub refiner: StageModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub report_filename: Template,
    pub report_directory: PathBuf,
    /// Length of the default report window, counted back from `date_to`.
    pub date_window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisLimits {
    pub number_of_members: u32,
    /// Cleaned corpora are truncated to this many characters.
    pub max_speech_chars: usize,
    pub pause_between_members: Duration,
    /// Extra attempts for retryable inference failures; `0` disables retry.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt.
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub initial: Template,
    pub refinement: Template,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Telemetry CSV file.
    pub log_file: PathBuf,
}

impl PipelineConfig {
    /// Parses and validates a TOML configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.message().to_string(),
        })?;
        raw.validate()
    }

    /// Returns a copy with a different member limit (command-line override).
    #[must_use]
    pub fn with_number_of_members(mut self, number_of_members: u32) -> Self {
        self.limits.number_of_members = number_of_members;
        self
    }
}

// ---------------------------------------------------------------------------
// Raw model
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(rename = "Database", default)]
    database: RawDatabase,
    #[serde(rename = "Ollama", default)]
    ollama: RawOllama,
    #[serde(rename = "Output", default)]
    output: RawOutput,
    #[serde(rename = "AnalysisLimits", default)]
    limits: RawLimits,
    #[serde(rename = "Prompts", default)]
    prompts: RawPrompts,
    #[serde(rename = "Logging", default)]
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDatabase {
    source_database: Option<String>,
    analysis_database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOllama {
    api_url: Option<String>,
    model_name: Option<String>,
    request_timeout_seconds: Option<i64>,
    refiner_model_name: Option<String>,
    refiner_request_timeout_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutput {
    report_filename_template: Option<String>,
    report_directory: Option<String>,
    date_window_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLimits {
    number_of_members: Option<i64>,
    max_speech_chars: Option<i64>,
    pause_between_members_ms: Option<i64>,
    max_retries: Option<i64>,
    retry_backoff_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrompts {
    #[serde(rename = "InitialAnalysis", default)]
    initial: RawPrompt,
    #[serde(rename = "RefinementAnalysis", default)]
    refinement: RawPrompt,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrompt {
    template: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLogging {
    log_file: Option<String>,
}

impl RawConfig {
    fn validate(self) -> Result<PipelineConfig, ConfigError> {
        let database = DatabaseConfig {
            source_database: text(self.database.source_database, "Database.source_database")?
                .into(),
            analysis_database: text(
                self.database.analysis_database,
                "Database.analysis_database",
            )?
            .into(),
        };

        let api_url = text(self.ollama.api_url, "Ollama.api_url")?;
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(invalid("Ollama.api_url", "must be an http:// or https:// URL"));
        }
        let inference = InferenceConfig {
            api_url,
            initial: StageModel {
                model: model(self.ollama.model_name, "Ollama.model_name")?,
                timeout: Duration::from_secs(u64::from(positive(
                    self.ollama.request_timeout_seconds,
                    "Ollama.request_timeout_seconds",
                )?)),
            },
            refiner: StageModel {
                model: model(self.ollama.refiner_model_name, "Ollama.refiner_model_name")?,
                timeout: Duration::from_secs(u64::from(positive(
                    self.ollama.refiner_request_timeout_seconds,
                    "Ollama.refiner_request_timeout_seconds",
                )?)),
            },
        };

        let output = OutputConfig {
            report_filename: Template::parse(
                TemplateKind::ReportFilename,
                text(
                    self.output.report_filename_template,
                    "Output.report_filename_template",
                )?,
            )?,
            report_directory: self
                .output
                .report_directory
                .unwrap_or_else(|| DEFAULT_REPORT_DIRECTORY.to_string())
                .into(),
            date_window_days: non_negative(
                Some(self.output.date_window_days.unwrap_or(DEFAULT_DATE_WINDOW_DAYS)),
                "Output.date_window_days",
            )?,
        };

        let limits = AnalysisLimits {
            number_of_members: non_negative(
                self.limits.number_of_members,
                "AnalysisLimits.number_of_members",
            )?,
            max_speech_chars: positive(
                Some(self.limits.max_speech_chars.unwrap_or(DEFAULT_MAX_SPEECH_CHARS)),
                "AnalysisLimits.max_speech_chars",
            )? as usize,
            pause_between_members: Duration::from_millis(u64::from(non_negative(
                Some(
                    self.limits
                        .pause_between_members_ms
                        .unwrap_or(DEFAULT_PAUSE_BETWEEN_MEMBERS_MS),
                ),
                "AnalysisLimits.pause_between_members_ms",
            )?)),
            max_retries: non_negative(
                Some(self.limits.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)),
                "AnalysisLimits.max_retries",
            )?,
            retry_backoff: Duration::from_secs(u64::from(non_negative(
                Some(
                    self.limits
                        .retry_backoff_seconds
                        .unwrap_or(DEFAULT_RETRY_BACKOFF_SECONDS),
                ),
                "AnalysisLimits.retry_backoff_seconds",
            )?)),
        };

        let prompts = PromptTemplates {
            initial: Template::parse(
                TemplateKind::InitialAnalysis,
                text(
                    self.prompts.initial.template,
                    TemplateKind::InitialAnalysis.config_key(),
                )?,
            )?,
            refinement: Template::parse(
                TemplateKind::RefinementAnalysis,
                text(
                    self.prompts.refinement.template,
                    TemplateKind::RefinementAnalysis.config_key(),
                )?,
            )?,
        };

        let logging = LoggingConfig {
            log_file: text(self.logging.log_file, "Logging.log_file")?.into(),
        };

        Ok(PipelineConfig {
            database,
            inference,
            output,
            limits,
            prompts,
            logging,
        })
    }
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn text(value: Option<String>, key: &str) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::MissingKey {
            key: key.to_string(),
        }),
        Some(v) if v.trim().is_empty() => Err(invalid(key, "must not be empty")),
        Some(v) => Ok(v),
    }
}

fn model(value: Option<String>, key: &str) -> Result<ModelName, ConfigError> {
    let name = text(value, key)?;
    ModelName::new(name).ok_or_else(|| invalid(key, "must not be empty"))
}

fn non_negative(value: Option<i64>, key: &str) -> Result<u32, ConfigError> {
    let v = value.ok_or_else(|| ConfigError::MissingKey {
        key: key.to_string(),
    })?;
    u32::try_from(v).map_err(|_| invalid(key, format!("must be between 0 and {}, got {v}", u32::MAX)))
}

fn positive(value: Option<i64>, key: &str) -> Result<u32, ConfigError> {
    match non_negative(value, key)? {
        0 => Err(invalid(key, "must be greater than 0")),
        v => Ok(v),
    }
}
