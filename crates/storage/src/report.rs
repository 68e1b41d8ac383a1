//! Report file writer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{RenderedReport, ReportError, ReportSink};
use tracing::instrument;

/// Writes each rendered report to `<directory>/<filename>`, replacing any
/// earlier file of the same name.
pub struct MarkdownReportWriter {
    directory: PathBuf,
}

impl MarkdownReportWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl ReportSink for MarkdownReportWriter {
    #[instrument(skip_all, fields(filename = %report.filename))]
    async fn write(&self, report: &RenderedReport) -> Result<PathBuf, ReportError> {
        let path = self.directory.join(&report.filename);
        let fail = |e: std::io::Error| ReportError {
            location: path.display().to_string(),
            message: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(fail)?;
        tokio::fs::write(&path, report.body.as_bytes())
            .await
            .map_err(fail)?;
        Ok(path)
    }
}
