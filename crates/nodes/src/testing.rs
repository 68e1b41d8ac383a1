//! In-memory port implementations shared by the orchestration tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline::{
    AnalysisResult, CorpusSource, GeneratedText, GenerationRequest, InferenceClient,
    InferenceFailure, Member, MemberCorpus, MemberId, MemberSelection, PersistenceError,
    PipelineConfig, RenderedReport, ReportError, ReportSink, ResultSink, SourceUnavailable,
    TelemetryError, TelemetryRecord, TelemetrySink,
};

pub const CONFIG: &str = r#"
[Database]
source_database = "members.db"
analysis_database = "analysis.db"

[Ollama]
api_url = "http://localhost:11434/api/generate"
model_name = "initial-model"
request_timeout_seconds = 30
refiner_model_name = "refiner-model"
refiner_request_timeout_seconds = 60

[Output]
report_filename_template = "analysis_{num_members}_{date_from}_to_{date_to}.md"

[AnalysisLimits]
number_of_members = 10
pause_between_members_ms = 0
retry_backoff_seconds = 0

[Prompts.InitialAnalysis]
template = "INITIAL for {member_name}: {speeches_text}"

[Prompts.RefinementAnalysis]
template = "REFINE for {member_name}: {initial_analysis_text}"

[Logging]
log_file = "analysis_log.csv"
"#;

pub fn config() -> PipelineConfig {
    PipelineConfig::from_toml_str(CONFIG).unwrap()
}

pub fn corpus(id: i64, name: &str, speech: &str) -> MemberCorpus {
    MemberCorpus {
        member: Member {
            id: MemberId::new(id),
            name: name.to_string(),
            party: Some("Independent".to_string()),
        },
        speech_text: speech.to_string(),
    }
}

// ---------------------------------------------------------------------------

type Responder =
    Box<dyn Fn(&GenerationRequest, usize) -> Result<String, InferenceFailure> + Send + Sync>;

/// Inference client answering through a closure that sees each request and
/// its zero-based call index.
pub struct ScriptedInference {
    responder: Responder,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedInference {
    pub fn new(
        responder: impl Fn(&GenerationRequest, usize) -> Result<String, InferenceFailure>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, InferenceFailure> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let text = (self.responder)(request, index)?;
        GeneratedText::new(text).ok_or(InferenceFailure::EmptyResponse)
    }
}

// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryResults {
    pub rows: Mutex<BTreeMap<MemberId, AnalysisResult>>,
    pub fail_for: Option<MemberId>,
}

impl MemoryResults {
    pub fn failing_for(id: i64) -> Self {
        Self {
            fail_for: Some(MemberId::new(id)),
            ..Self::default()
        }
    }

    pub fn get(&self, id: i64) -> Option<AnalysisResult> {
        self.rows.lock().unwrap().get(&MemberId::new(id)).cloned()
    }
}

#[async_trait]
impl ResultSink for MemoryResults {
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        if self.fail_for == Some(result.member.id) {
            return Err(PersistenceError::new("disk full"));
        }
        self.rows
            .lock()
            .unwrap()
            .insert(result.member.id, result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTelemetry {
    pub records: Mutex<Vec<TelemetryRecord>>,
    pub broken: bool,
}

impl MemoryTelemetry {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        if self.broken {
            return Err(TelemetryError::new("read-only file system"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------

pub struct MemoryCorpus {
    pub members: Vec<MemberCorpus>,
    pub unavailable: bool,
}

impl MemoryCorpus {
    pub fn new(members: Vec<MemberCorpus>) -> Self {
        Self {
            members,
            unavailable: false,
        }
    }
}

#[async_trait]
impl CorpusSource for MemoryCorpus {
    async fn select_members(
        &self,
        selection: MemberSelection,
    ) -> Result<Vec<MemberCorpus>, SourceUnavailable> {
        if self.unavailable {
            return Err(SourceUnavailable::new("no such table: speeches"));
        }
        let mut members = self.members.clone();
        members.sort_by_key(|c| c.member.id);
        Ok(members
            .into_iter()
            .skip(selection.start_index as usize)
            .take(selection.limit as usize)
            .collect())
    }
}

// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryReports {
    pub written: Mutex<Vec<RenderedReport>>,
    pub broken: bool,
}

#[async_trait]
impl ReportSink for MemoryReports {
    async fn write(&self, report: &RenderedReport) -> Result<PathBuf, ReportError> {
        if self.broken {
            return Err(ReportError {
                location: report.filename.clone(),
                message: "permission denied".into(),
            });
        }
        self.written.lock().unwrap().push(report.clone());
        Ok(PathBuf::from(&report.filename))
    }
}
