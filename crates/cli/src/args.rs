//! Command-line arguments.

use std::num::NonZeroU32;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

/// Two-stage profiling of legislators from their transcribed speeches.
#[derive(Debug, Parser)]
#[command(name = "speech-profiler", version, about)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "SPEECH_PROFILER_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of members (in identifier order) to skip before selecting.
    #[arg(long, default_value_t = 0)]
    pub start_index: u32,

    /// Number of members to analyse. Overrides `AnalysisLimits.number_of_members`.
    #[arg(long)]
    pub count: Option<NonZeroU32>,

    /// First day of the report window (YYYY-MM-DD). Defaults to
    /// `date_to` minus `Output.date_window_days`.
    #[arg(long)]
    pub date_from: Option<NaiveDate>,

    /// Last day of the report window (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub date_to: Option<NaiveDate>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long)]
    pub json_logs: bool,
}
