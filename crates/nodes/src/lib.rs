//! Speech analysis orchestration.
//!
//! This crate sequences the ports defined in [`pipeline`]: it selects members
//! from the corpus source, runs the two inference stages for each member,
//! persists results, appends telemetry, and finally renders and writes the
//! run report.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nothing here touches a database, file, or socket
//! directly; every side effect goes through a trait object supplied by the
//! binary. Domain rules (validation, prompt rendering, report layout) live in
//! [`pipeline`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`analyzer`] | Per-member state machine: initial stage, refinement, persistence |
//! | [`orchestrator`] | The sequential run loop, skip aggregation, and report hand-off |

pub mod analyzer;
pub mod orchestrator;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalyzerSettings, TwoStageAnalyzer};
pub use orchestrator::{RunOptions, RunOrchestrator, RunSummary, SkippedMember};
