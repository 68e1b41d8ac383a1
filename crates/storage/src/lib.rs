//! Storage infrastructure adapters.
//!
//! Implements the storage-facing ports of [`pipeline`]:
//!
//! | Type | Port | Backing |
//! |------|------|---------|
//! | [`SqliteCorpusSource`] | [`pipeline::CorpusSource`] | SQLite `speeches` relation, opened read-only |
//! | [`SqliteResultStore`] | [`pipeline::ResultSink`] | SQLite `member_analysis` table, created on demand |
//! | [`CsvTelemetryLog`] | [`pipeline::TelemetrySink`] | Append-only CSV file |
//! | [`MarkdownReportWriter`] | [`pipeline::ReportSink`] | One file per run in the report directory |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** SQL, file handles, and encoding details live here and
//! are mapped onto the domain error types at the trait boundary.

mod report;
mod results;
mod source;
mod telemetry;

pub use report::MarkdownReportWriter;
pub use results::SqliteResultStore;
pub use source::SqliteCorpusSource;
pub use telemetry::{CsvTelemetryLog, TELEMETRY_HEADER};
