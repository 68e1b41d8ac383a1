//! Text-generation infrastructure adapter.
//!
//! Implements the [`pipeline::InferenceClient`] trait against an Ollama
//! server's `/api/generate` endpoint.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing,
//! and failure classification live here. The [`pipeline`] crate sees only
//! [`pipeline::InferenceClient`] and [`pipeline::InferenceFailure`].

mod ollama;

pub use ollama::OllamaClient;
