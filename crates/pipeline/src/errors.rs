//! Error and retry-policy types for the Cadence domain.
//!
//! Each component owns one error enum. [`CadenceError`] wraps them all and tags
//! each with the [`Stage`] it came from, so a run that fails anywhere can report
//! where it failed and which article/variation it was working on.
//!
//! [`RetryPolicy`] is a cross-cutting concern: error types that describe a
//! failure of an external collaborator can produce one, letting the operator
//! surface say whether re-running the whole command is worthwhile. Nothing in
//! the core acts on a [`RetryPolicy`] by itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ArticleIndex, VariationIndex};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The whole command may be re-run.
    Retryable {
        /// Minimum back-off before the next attempt, when the platform told us.
        after: Option<Duration>,
    },
    /// Re-running will fail the same way until something is fixed by hand.
    NonRetryable,
}

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Parse,
    Analyze,
    Compose,
    Rotate,
    Publish,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Analyze => "analyze",
            Stage::Compose => "compose",
            Stage::Rotate => "rotate",
            Stage::Publish => "publish",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Document source
// ---------------------------------------------------------------------------

/// Why a source document could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    NotFound,
    PermissionDenied,
    Other(String),
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFailure::NotFound => f.write_str("not found"),
            SourceFailure::PermissionDenied => f.write_str("permission denied"),
            SourceFailure::Other(message) => f.write_str(message),
        }
    }
}

/// The source document could not be retrieved. Fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("source document '{document}' is unavailable: {failure}")]
pub struct SourceError {
    /// The document identifier that was requested.
    pub document: String,
    /// What went wrong.
    pub failure: SourceFailure,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// The source document is malformed. Raised before any state is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No `Article #<n>` delimiter was found.
    #[error("document contains no articles")]
    NoArticles,

    /// A segment has no title line.
    #[error("article {segment} (heading #{heading}) has no title line")]
    MissingTitle {
        /// Position of the offending segment.
        segment: ArticleIndex,
        /// Number written in the segment's heading.
        heading: u32,
    },
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Failure of the external language-model call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("language model rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("language model rejected the credentials: {message}")]
    AuthDenied { message: String },

    #[error("language model returned an unusable response: {message}")]
    Malformed { message: String },

    #[error("language model unavailable: {message}")]
    Unavailable { message: String },

    #[error("language model call timed out after {after:?}")]
    Timeout { after: Duration },
}

impl LlmError {
    /// Whether re-running the command could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::Unavailable { .. } | LlmError::Timeout { .. } | LlmError::Malformed { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            LlmError::AuthDenied { .. } => RetryPolicy::NonRetryable,
        }
    }
}

/// Insight extraction failed for one article.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// The model kept returning the wrong number of distinct insights.
    #[error(
        "article {article}: expected {expected} distinct insights, model returned {received} after a corrective retry"
    )]
    WrongInsightCount {
        article: ArticleIndex,
        expected: usize,
        received: usize,
    },

    /// The model call itself failed.
    #[error("article {article}: insight extraction failed: {source}")]
    Model {
        article: ArticleIndex,
        #[source]
        source: LlmError,
    },
}

impl AnalysisError {
    /// The article the failure belongs to.
    pub fn article(&self) -> ArticleIndex {
        match self {
            AnalysisError::WrongInsightCount { article, .. } | AnalysisError::Model { article, .. } => {
                *article
            }
        }
    }
}

/// Composition failed for one variation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompositionError {
    /// The insight set has no entry for this variation.
    #[error("article {article} has {available} insights; variation {variation} has none to build on")]
    MissingInsight {
        article: ArticleIndex,
        variation: VariationIndex,
        available: usize,
    },

    /// Link and hashtags alone already use the whole length budget.
    #[error("article {article} variation {variation}: link and hashtags leave no room for text")]
    NoBudget {
        article: ArticleIndex,
        variation: VariationIndex,
    },

    /// Still too long after the shortening retry. Never truncated.
    #[error(
        "article {article} variation {variation}: {length} characters exceeds the {limit} limit after a shortening retry"
    )]
    OverLimit {
        article: ArticleIndex,
        variation: VariationIndex,
        length: usize,
        limit: usize,
    },

    /// Still quotes the article title after the corrective retry.
    #[error("article {article} variation {variation}: post restates the article title after a corrective retry")]
    TitleQuoted {
        article: ArticleIndex,
        variation: VariationIndex,
    },

    /// The model returned nothing usable.
    #[error("article {article} variation {variation}: model returned an empty post")]
    Empty {
        article: ArticleIndex,
        variation: VariationIndex,
    },

    /// The model call itself failed.
    #[error("article {article} variation {variation}: composition failed: {source}")]
    Model {
        article: ArticleIndex,
        variation: VariationIndex,
        #[source]
        source: LlmError,
    },
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Rotation state-machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RotationError {
    /// Every (article, variation) pair has been used.
    ///
    /// Recoverable by supplying a document with more articles or by a reset.
    #[error("backlog exhausted: next article would be {next_article}, document has {article_count}")]
    BacklogExhausted {
        next_article: ArticleIndex,
        article_count: usize,
    },
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Failure of the external posting call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PostingError {
    #[error("posting platform rejected the credentials: {message}")]
    AuthDenied { message: String },

    #[error("posting platform rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("posting platform rejected the content: {message}")]
    ContentRejected { message: String },

    #[error("posting platform unavailable: {message}")]
    Unavailable { message: String },

    #[error("posting call timed out after {after:?}")]
    Timeout { after: Duration },
}

/// A publish attempt failed. Rotation state is untouched whenever this is returned.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PublishError {
    /// The post failed final validation; nothing was sent.
    #[error("article {article} variation {variation}: post failed validation: {reason}")]
    Invalid {
        article: ArticleIndex,
        variation: VariationIndex,
        reason: String,
    },

    /// The posting platform did not confirm the post.
    #[error("article {article} variation {variation}: {source}")]
    Platform {
        article: ArticleIndex,
        variation: VariationIndex,
        #[source]
        source: PostingError,
    },
}

impl PublishError {
    /// Whether re-running the commit could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            PublishError::Invalid { .. } => RetryPolicy::NonRetryable,
            PublishError::Platform { source, .. } => match source {
                PostingError::RateLimited { retry_after } => RetryPolicy::Retryable {
                    after: *retry_after,
                },
                PostingError::Unavailable { .. } | PostingError::Timeout { .. } => {
                    RetryPolicy::Retryable { after: None }
                }
                PostingError::AuthDenied { .. } | PostingError::ContentRejected { .. } => {
                    RetryPolicy::NonRetryable
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Persisted rotation state could not be read or written.
#[derive(Debug, Error)]
pub enum StateError {
    /// The state file exists but fails schema validation.
    ///
    /// Never silently replaced by a fresh state: that would re-post content that
    /// was already published.
    #[error("state at '{location}' is corrupted: {reason}")]
    Corrupted { location: String, reason: String },

    #[error("state at '{location}' could not be accessed: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Any error a Cadence run can end with.
#[derive(Debug, Error)]
pub enum CadenceError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl CadenceError {
    /// The stage the error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            CadenceError::Source(_) => Stage::Fetch,
            CadenceError::Parse(_) => Stage::Parse,
            CadenceError::Analysis(_) => Stage::Analyze,
            CadenceError::Composition(_) => Stage::Compose,
            CadenceError::Rotation(_) => Stage::Rotate,
            CadenceError::Publish(_) => Stage::Publish,
            CadenceError::State(_) => Stage::Persist,
        }
    }

    /// Whether re-running the command could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            CadenceError::Analysis(AnalysisError::Model { source, .. })
            | CadenceError::Composition(CompositionError::Model { source, .. }) => {
                source.retry_policy()
            }
            CadenceError::Publish(error) => error.retry_policy(),
            CadenceError::Source(SourceError {
                failure: SourceFailure::Other(_),
                ..
            }) => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}
