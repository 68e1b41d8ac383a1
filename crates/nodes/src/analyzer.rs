//! Per-member two-stage analysis.
//!
//! Each member moves through an explicit state machine:
//!
//! ```text
//! Pending ──initial──▶ InitialDone ──refine──▶ RefinedDone ──upsert──▶ Persisted
//!    │                      │                       │
//!    └──────────────────────┴───────────────────────┴──────▶ Failed(SkipReason)
//! ```
//!
//! All intermediate text lives in the state value of the member being
//! processed, so a refinement prompt can only ever embed that member's own
//! initial analysis from the same run.
//!
//! Telemetry is appended after each stage, including failed ones. The
//! refinement record waits for the upsert so that a member whose result could
//! not be saved is logged as `failed:persistence` rather than `ok`. Telemetry
//! failures are logged and otherwise ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeline::corpus::clean_corpus;
use pipeline::template::{INITIAL_ANALYSIS_TEXT, MEMBER_NAME, SPEECHES_TEXT};
use pipeline::{
    AnalysisResult, AnalysisStage, GeneratedText, GenerationRequest, InferenceClient,
    InferenceFailure, Member, MemberCorpus, PipelineConfig, PromptError, ResultSink, RetryPolicy,
    RunId, SkipReason, StageModel, StageOutcome, TelemetryRecord, TelemetrySink, Template,
    Timestamp,
};
use tracing::{debug, info, instrument, warn};

/// Tunables the analyzer needs, extracted from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub initial_prompt: Template,
    pub refinement_prompt: Template,
    pub initial: StageModel,
    pub refiner: StageModel,
    pub max_speech_chars: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl AnalyzerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            initial_prompt: config.prompts.initial.clone(),
            refinement_prompt: config.prompts.refinement.clone(),
            initial: config.inference.initial.clone(),
            refiner: config.inference.refiner.clone(),
            max_speech_chars: config.limits.max_speech_chars,
            max_retries: config.limits.max_retries,
            retry_backoff: config.limits.retry_backoff,
        }
    }
}

/// Where a member currently is in the analysis.
#[derive(Debug)]
enum MemberState {
    Pending,
    InitialDone {
        initial: GeneratedText,
    },
    RefinedDone {
        initial: GeneratedText,
        refined: StageSuccess,
    },
    Persisted(AnalysisResult),
    Failed(SkipReason),
}

/// Output and timing of a stage whose request succeeded.
#[derive(Debug)]
struct StageSuccess {
    text: GeneratedText,
    started_at: Timestamp,
    elapsed: Duration,
}

/// Facts about the member that every telemetry record repeats.
struct MemberContext<'a> {
    run_id: RunId,
    member: &'a Member,
    speech_chars: usize,
}

/// Drives one member from corpus to persisted result.
pub struct TwoStageAnalyzer {
    inference: Arc<dyn InferenceClient>,
    results: Arc<dyn ResultSink>,
    telemetry: Arc<dyn TelemetrySink>,
    settings: AnalyzerSettings,
}

impl TwoStageAnalyzer {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        results: Arc<dyn ResultSink>,
        telemetry: Arc<dyn TelemetrySink>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            inference,
            results,
            telemetry,
            settings,
        }
    }

    /// Analyses one member. Every failure is local: it is returned as a
    /// [`SkipReason`] and nothing is persisted for the member.
    #[instrument(
        skip_all,
        fields(run_id = %run_id, member_id = %corpus.member.id, member = %corpus.member.name)
    )]
    pub async fn analyze(
        &self,
        run_id: RunId,
        corpus: &MemberCorpus,
    ) -> Result<AnalysisResult, SkipReason> {
        let ctx = MemberContext {
            run_id,
            member: &corpus.member,
            speech_chars: corpus.speech_text.chars().count(),
        };

        let mut state = MemberState::Pending;
        loop {
            state = match state {
                MemberState::Pending => self.run_initial(&ctx, &corpus.speech_text).await,
                MemberState::InitialDone { initial } => self.run_refinement(&ctx, initial).await,
                MemberState::RefinedDone { initial, refined } => {
                    self.persist(&ctx, initial, refined).await
                }
                MemberState::Persisted(result) => return Ok(result),
                MemberState::Failed(reason) => return Err(reason),
            };
        }
    }

    async fn run_initial(&self, ctx: &MemberContext<'_>, speech_text: &str) -> MemberState {
        let Some(cleaned) = clean_corpus(speech_text, self.settings.max_speech_chars) else {
            let now = Timestamp::now();
            self.record(ctx, AnalysisStage::Initial, StageOutcome::Skipped, now, Duration::ZERO)
                .await;
            return MemberState::Failed(SkipReason::EmptyCorpus);
        };
        debug!(cleaned_chars = cleaned.chars().count(), "Corpus prepared");

        let prompt = self.settings.initial_prompt.render(&[
            (MEMBER_NAME, &ctx.member.name),
            (SPEECHES_TEXT, &cleaned),
        ]);
        match self
            .run_stage(ctx, AnalysisStage::Initial, &self.settings.initial, prompt)
            .await
        {
            Ok(done) => {
                self.record(
                    ctx,
                    AnalysisStage::Initial,
                    StageOutcome::Succeeded,
                    done.started_at,
                    done.elapsed,
                )
                .await;
                MemberState::InitialDone { initial: done.text }
            }
            Err(reason) => MemberState::Failed(reason),
        }
    }

    async fn run_refinement(&self, ctx: &MemberContext<'_>, initial: GeneratedText) -> MemberState {
        let prompt = self.settings.refinement_prompt.render(&[
            (MEMBER_NAME, &ctx.member.name),
            (INITIAL_ANALYSIS_TEXT, initial.as_str()),
        ]);
        match self
            .run_stage(ctx, AnalysisStage::Refined, &self.settings.refiner, prompt)
            .await
        {
            Ok(refined) => MemberState::RefinedDone { initial, refined },
            Err(reason) => MemberState::Failed(reason),
        }
    }

    async fn persist(
        &self,
        ctx: &MemberContext<'_>,
        initial: GeneratedText,
        refined: StageSuccess,
    ) -> MemberState {
        let StageSuccess {
            text,
            started_at,
            elapsed,
        } = refined;
        let result = AnalysisResult {
            member: ctx.member.clone(),
            initial_analysis: initial.into_string(),
            refined_analysis: text.into_string(),
            analyzed_at: started_at.plus(elapsed),
        };
        let (outcome, state) = match self.results.upsert(&result).await {
            Ok(()) => {
                info!("Analysis persisted");
                (StageOutcome::Succeeded, MemberState::Persisted(result))
            }
            Err(e) => {
                warn!(error = %e, "Analysis could not be persisted");
                (
                    StageOutcome::PersistFailed,
                    MemberState::Failed(SkipReason::Persistence(e)),
                )
            }
        };
        self.record(ctx, AnalysisStage::Refined, outcome, started_at, elapsed)
            .await;
        state
    }

    /// Runs one stage's request. Failures are recorded here; a success is
    /// recorded by the caller once the member's next step is known.
    async fn run_stage(
        &self,
        ctx: &MemberContext<'_>,
        stage: AnalysisStage,
        model: &StageModel,
        prompt: Result<String, PromptError>,
    ) -> Result<StageSuccess, SkipReason> {
        let started_at = Timestamp::now();
        let clock = Instant::now();

        let prompt = match prompt {
            Ok(p) => p,
            Err(error) => {
                warn!(%stage, error = %error, "Prompt could not be rendered");
                self.record(ctx, stage, StageOutcome::PromptFailed, started_at, clock.elapsed())
                    .await;
                return Err(SkipReason::Prompt { stage, error });
            }
        };

        let request = GenerationRequest {
            prompt,
            model: model.model.clone(),
            timeout: model.timeout,
        };
        info!(%stage, model = %request.model, prompt_chars = request.prompt.chars().count(), "Stage started");

        let outcome = self.generate_with_retry(stage, &request).await;
        let elapsed = clock.elapsed();

        match outcome {
            Ok(text) => {
                info!(%stage, elapsed_ms = elapsed.as_millis() as u64, "Stage completed");
                Ok(StageSuccess {
                    text,
                    started_at,
                    elapsed,
                })
            }
            Err(failure) => {
                warn!(
                    %stage,
                    kind = failure.kind(),
                    error = %failure,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage failed"
                );
                self.record(
                    ctx,
                    stage,
                    StageOutcome::Failed(failure.clone()),
                    started_at,
                    elapsed,
                )
                .await;
                Err(SkipReason::Inference { stage, failure })
            }
        }
    }

    async fn generate_with_retry(
        &self,
        stage: AnalysisStage,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, InferenceFailure> {
        let mut attempt: u32 = 0;
        loop {
            let failure = match self.inference.generate(request).await {
                Ok(text) => return Ok(text),
                Err(failure) => failure,
            };

            let after = match failure.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < self.settings.max_retries => after,
                _ => return Err(failure),
            };
            let delay = after.unwrap_or_else(|| {
                self.settings
                    .retry_backoff
                    .saturating_mul(1u32 << attempt.min(16))
            });
            attempt += 1;
            warn!(
                %stage,
                attempt,
                max_retries = self.settings.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retrying inference request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn record(
        &self,
        ctx: &MemberContext<'_>,
        stage: AnalysisStage,
        outcome: StageOutcome,
        started_at: Timestamp,
        elapsed: Duration,
    ) {
        let record = TelemetryRecord {
            run_id: ctx.run_id,
            member: ctx.member.clone(),
            speech_chars: ctx.speech_chars,
            stage,
            outcome,
            started_at,
            finished_at: started_at.plus(elapsed),
        };
        if let Err(e) = self.telemetry.append(&record).await {
            warn!(%stage, error = %e, "Telemetry record dropped");
        }
    }
}
