//! Append-only CSV telemetry log.
//!
//! One row per stage per member per run. Rows are never rewritten; the header
//! is written only when the file is empty, so successive runs share one file.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{TelemetryError, TelemetryRecord, TelemetrySink};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

pub const TELEMETRY_HEADER: &str =
    "run_id,member_id,name,party,speech_chars,stage,outcome,started_at,finished_at,duration_ms";

/// Telemetry sink writing CSV rows to a file.
pub struct CsvTelemetryLog {
    path: PathBuf,
    // Serialises the empty-file check with the write that follows it.
    write_lock: Mutex<()>,
}

impl CsvTelemetryLog {
    /// The file is opened lazily on each append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TelemetrySink for CsvTelemetryLog {
    #[instrument(skip_all, fields(member_id = %record.member.id, stage = %record.stage))]
    async fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        let is_empty = file
            .metadata()
            .await
            .map_err(|e| io_error(&self.path, &e))?
            .len()
            == 0;

        let mut chunk = String::new();
        if is_empty {
            chunk.push_str(TELEMETRY_HEADER);
            chunk.push('\n');
        }
        chunk.push_str(&format_row(record));
        chunk.push('\n');

        file.write_all(chunk.as_bytes())
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        file.flush().await.map_err(|e| io_error(&self.path, &e))?;
        debug!(outcome = %record.outcome, "Telemetry row appended");
        Ok(())
    }
}

fn format_row(record: &TelemetryRecord) -> String {
    let fields = [
        record.run_id.to_string(),
        record.member.id.to_string(),
        record.member.name.clone(),
        record.member.party.clone().unwrap_or_default(),
        record.speech_chars.to_string(),
        record.stage.to_string(),
        record.outcome.to_string(),
        record.started_at.to_string(),
        record.finished_at.to_string(),
        record.duration().as_millis().to_string(),
    ];
    fields
        .iter()
        .map(|f| quote(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn quote(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> TelemetryError {
    TelemetryError::new(format!("{}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use pipeline::{
        AnalysisStage, InferenceFailure, Member, MemberId, RunId, StageOutcome, Timestamp,
    };

    use super::*;

    fn record(name: &str, stage: AnalysisStage, outcome: StageOutcome) -> TelemetryRecord {
        let started_at = Timestamp::from_utc(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        TelemetryRecord {
            run_id: RunId::new_random(),
            member: Member {
                id: MemberId::new(42),
                name: name.to_string(),
                party: Some("Labour".to_string()),
            },
            speech_chars: 1234,
            stage,
            outcome,
            started_at,
            finished_at: started_at.plus(Duration::from_millis(1500)),
        }
    }

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn new_file_gets_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_log.csv");
        let log = CsvTelemetryLog::new(&path);
        let rec = record("A. Member", AnalysisStage::Initial, StageOutcome::Succeeded);

        log.append(&rec).await.unwrap();
        log.append(&record("A. Member", AnalysisStage::Refined, StageOutcome::Succeeded))
            .await
            .unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TELEMETRY_HEADER);
        assert_eq!(
            lines[1],
            format!(
                "{},42,A. Member,Labour,1234,initial,ok,2025-03-01T12:00:00+00:00,2025-03-01T12:00:01.500+00:00,1500",
                rec.run_id
            )
        );
        assert!(lines[2].contains(",refined,ok,"));
    }

    #[tokio::test]
    async fn existing_file_is_appended_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_log.csv");

        CsvTelemetryLog::new(&path)
            .append(&record("A", AnalysisStage::Initial, StageOutcome::Succeeded))
            .await
            .unwrap();
        CsvTelemetryLog::new(&path)
            .append(&record("A", AnalysisStage::Initial, StageOutcome::Succeeded))
            .await
            .unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| *l == TELEMETRY_HEADER).count(), 1);
        assert_ne!(lines[1], lines[2], "each run keeps its own row");
    }

    #[tokio::test]
    async fn failure_outcomes_and_awkward_names_are_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_log.csv");
        let log = CsvTelemetryLog::new(&path);

        log.append(&record(
            "Smith, John \"Jack\"",
            AnalysisStage::Initial,
            StageOutcome::Failed(InferenceFailure::Timeout {
                after: Duration::from_secs(30),
            }),
        ))
        .await
        .unwrap();

        let row = &lines(&path)[1];
        assert!(row.contains(",\"Smith, John \"\"Jack\"\"\",Labour,"), "{row}");
        assert!(row.contains(",initial,failed:timeout,"), "{row}");
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvTelemetryLog::new(dir.path().join("nope").join("log.csv"));

        let err = log
            .append(&record("A", AnalysisStage::Initial, StageOutcome::Skipped))
            .await
            .unwrap_err();

        assert!(err.message.contains("log.csv"));
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!(quote("Labour"), "Labour");
        assert_eq!(quote("a\nb"), "\"a\nb\"");
    }
}
