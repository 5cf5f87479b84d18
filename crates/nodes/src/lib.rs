//! Cadence pipeline nodes.
//!
//! This crate provides the Content Analyzer and Variation Composer (both
//! wrapping the language model behind a bounded corrective retry), the Pipeline
//! Planner that simulates upcoming posts, the Publisher that is the only path
//! to advancing the rotation, and the `RotationExecutor` that sequences one
//! command through them.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between business logic in the
//! [`pipeline`] crate and the port traits (language model, posting platform,
//! document source, state store). Domain rules live in [`pipeline`].

use std::time::Duration;

use pipeline::{CompletionRequest, LanguageModel, LlmError};

pub mod analyzer;
pub mod composer;
pub mod executor;
pub mod planner;
pub mod publisher;
pub mod retry;
pub mod style;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalyzerSettings, ContentAnalyzer};
pub use composer::{ComposerSettings, HashtagPolicy, ThemeRule, VariationComposer};
pub use executor::{
    BacklogStatus, ExecutorSettings, LoadedDocument, RotationExecutor, StatusReport, StepReport,
};
pub use planner::{PipelinePlanner, PlanFailure, PlanOutcome};
pub use publisher::{PublishMode, PublishOutcome, Publisher};

/// Calls the model, turning an elapsed `timeout` into [`LlmError::Timeout`].
pub(crate) async fn complete_within(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, model.complete(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(model = model.model(), ?timeout, "language model call timed out");
            Err(LlmError::Timeout { after: timeout })
        }
    }
}
