//! Ollama `/api/generate` client.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{GeneratedText, GenerationRequest, InferenceClient, InferenceFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Longest slice of an error body carried into a failure message.
const BODY_EXCERPT_CHARS: usize = 200;

/// Non-streaming generation client for a single Ollama endpoint.
///
/// The endpoint URL is fixed per client; the model and timeout come from each
/// [`GenerationRequest`], so one client serves both analysis stages.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    /// Builds a client for the full generation endpoint URL, e.g.
    /// `http://localhost:11434/api/generate`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    #[instrument(skip_all, fields(model = %request.model, timeout_s = request.timeout.as_secs()))]
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, InferenceFailure> {
        let body = GenerateBody {
            model: request.model.as_str(),
            prompt: &request.prompt,
            stream: false,
        };

        let response = self
            .http
            .post(&self.api_url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, request.timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(e, request.timeout))?;
        debug!(status = status.as_u16(), bytes = bytes.len(), "Generation response received");

        if !status.is_success() {
            let message = serde_json::from_slice::<GenerateReply>(&bytes)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| excerpt(&String::from_utf8_lossy(&bytes)));
            warn!(status = status.as_u16(), message = %message, "Generation endpoint returned an error");
            return Err(InferenceFailure::Protocol {
                status: Some(status.as_u16()),
                message,
            });
        }

        let reply: GenerateReply =
            serde_json::from_slice(&bytes).map_err(|e| InferenceFailure::Protocol {
                status: Some(status.as_u16()),
                message: format!("undecodable response body: {e}"),
            })?;

        if let Some(message) = reply.error {
            return Err(InferenceFailure::Protocol {
                status: Some(status.as_u16()),
                message,
            });
        }

        reply
            .response
            .and_then(GeneratedText::new)
            .ok_or(InferenceFailure::EmptyResponse)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> InferenceFailure {
    if error.is_timeout() {
        InferenceFailure::Timeout { after: timeout }
    } else if error.is_connect() || error.is_request() {
        InferenceFailure::Connection {
            message: describe(&error),
        }
    } else {
        InferenceFailure::Protocol {
            status: error.status().map(|s| s.as_u16()),
            message: describe(&error),
        }
    }
}

/// The error's message followed by its source chain.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        cut.push('…');
        cut
    }
}
