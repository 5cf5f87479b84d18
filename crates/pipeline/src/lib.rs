//! Core domain for Cadence.
//!
//! Cadence turns newsletter articles into a rotating sequence of social posts.
//! This crate holds every domain concept the rotation needs: parsed articles,
//! cached insights, the persisted rotation pointer, schedule types, and the
//! error taxonomy. Infrastructure crates implement the traits defined in
//! [`ports`]; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ArticleIndex`, `VariationIndex`, `ArticleFingerprint`, etc.) |
//! | [`types`] | Shared value types (`Article`, `Insight`, `Post`, `LengthRule`, etc.) |
//! | [`errors`] | Per-component errors, `CadenceError`, and retry policy |
//! | [`parser`] | Newsletter document parser and structure report |
//! | [`cache`] | Content-keyed insight cache |
//! | [`rotation`] | Rotation pointer and persisted rotation state |
//! | [`schedule`] | Posting cadence and schedule artifact types |
//! | [`ports`] | Traits for the language model, posting platform, document source, and state store |

pub mod cache;
pub mod errors;
pub mod identifiers;
pub mod parser;
pub mod ports;
pub mod rotation;
pub mod schedule;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use cache::{CacheEntry, InsightCache, CACHE_SCHEMA_VERSION};
pub use errors::{
    AnalysisError, CadenceError, CompositionError, LlmError, ParseError, PostingError,
    PublishError, RetryPolicy, RotationError, SourceError, SourceFailure, Stage, StateError,
};
pub use identifiers::{
    ArticleFingerprint, ArticleIndex, DocumentId, PostId, RunId, VariationIndex,
};
pub use parser::{inspect, parse_document, DocumentReport, ParseWarning};
pub use ports::{CompletionRequest, DocumentSource, LanguageModel, PostingClient, StateStore};
pub use rotation::{
    Cursor, HistoryEntry, ResetMode, RotationBounds, RotationState, Slot, STATE_SCHEMA_VERSION,
};
pub use schedule::{PostingCadence, Schedule, ScheduleEntry};
pub use types::{Article, ArticleInsights, Insight, LengthRule, Post, PostReceipt, Timestamp};
