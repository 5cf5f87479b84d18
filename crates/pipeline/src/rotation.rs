//! Rotation state machine.
//!
//! The pointer walks `(article, variation)` pairs in order:
//! `(1,0), (1,1), .., (1,V-1), (2,0), ..`. Once the article index passes the
//! number of articles in the current document the pointer is *exhausted*.
//! Exhaustion is evaluated against the document of the current run, so a
//! document with more articles makes an exhausted pointer live again.
//!
//! [`Cursor`] is the pure, copyable pointer; the planner advances private
//! copies of it. [`RotationState`] is the persisted singleton and is only
//! advanced through [`RotationState::record_publication`], after a confirmed
//! publish.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::{
    ArticleIndex, InsightCache, PostId, RotationError, Timestamp, VariationIndex,
};

/// Version of the persisted state layout written by this release.
pub const STATE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Bounds and slots
// ---------------------------------------------------------------------------

/// Shape of the backlog for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationBounds {
    article_count: usize,
    variations: u32,
}

impl RotationBounds {
    /// Creates bounds. Returns `None` if `variations_per_article` is zero.
    pub fn new(article_count: usize, variations_per_article: u32) -> Option<Self> {
        (variations_per_article > 0).then_some(Self {
            article_count,
            variations: variations_per_article,
        })
    }

    /// Creates bounds from a variation count known to be positive.
    pub fn with_variations(article_count: usize, variations_per_article: NonZeroU32) -> Self {
        Self {
            article_count,
            variations: variations_per_article.get(),
        }
    }

    /// Number of articles in the parsed document.
    pub fn article_count(&self) -> usize {
        self.article_count
    }

    /// Variations per article (V).
    pub fn variations_per_article(&self) -> u32 {
        self.variations
    }

    /// Number of distinct `(article, variation)` pairs: k × V.
    pub fn total_slots(&self) -> usize {
        self.article_count * self.variations as usize
    }
}

/// A concrete `(article, variation)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub article: ArticleIndex,
    pub variation: VariationIndex,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.article, self.variation)
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// The rotation pointer, detached from any persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    article: ArticleIndex,
    variation: VariationIndex,
}

impl Cursor {
    /// `(1, 0)`: where every rotation starts.
    pub const START: Self = Self {
        article: ArticleIndex::FIRST,
        variation: VariationIndex::FIRST,
    };

    /// Creates a cursor at an arbitrary pair.
    pub fn new(article: ArticleIndex, variation: VariationIndex) -> Self {
        Self { article, variation }
    }

    /// The raw pair, whether or not it is inside `bounds`.
    pub fn position(self) -> Slot {
        Slot {
            article: self.article,
            variation: self.variation,
        }
    }

    /// Returns `true` once the article index has passed the last article.
    pub fn is_exhausted(self, bounds: RotationBounds) -> bool {
        self.article.offset() >= bounds.article_count
    }

    /// The pair at the pointer. Read-only.
    ///
    /// # Errors
    ///
    /// [`RotationError::BacklogExhausted`] if the pointer is past the last article.
    pub fn peek(self, bounds: RotationBounds) -> Result<Slot, RotationError> {
        if self.is_exhausted(bounds) {
            return Err(RotationError::BacklogExhausted {
                next_article: self.article,
                article_count: bounds.article_count,
            });
        }
        Ok(self.position())
    }

    /// The cursor one step further along.
    ///
    /// # Errors
    ///
    /// [`RotationError::BacklogExhausted`] if the pointer is already exhausted.
    pub fn advance(self, bounds: RotationBounds) -> Result<Self, RotationError> {
        self.peek(bounds)?;
        let next_variation = self.variation.get() + 1;
        if next_variation >= bounds.variations {
            Ok(Self {
                article: self.article.next(),
                variation: VariationIndex::FIRST,
            })
        } else {
            Ok(Self {
                article: self.article,
                variation: VariationIndex::new(next_variation),
            })
        }
    }

    /// Pairs left before exhaustion, counting the current one.
    pub fn remaining(self, bounds: RotationBounds) -> usize {
        if self.is_exhausted(bounds) {
            return 0;
        }
        let consumed = self.article.offset() * bounds.variations as usize + self.variation.offset();
        bounds.total_slots().saturating_sub(consumed)
    }
}

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

/// One confirmed publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub article_index: ArticleIndex,
    pub variation_index: VariationIndex,
    pub posted_at: Timestamp,
    pub post_id: PostId,
    pub text: String,
}

impl HistoryEntry {
    /// The pair this entry published.
    pub fn slot(&self) -> Slot {
        Slot {
            article: self.article_index,
            variation: self.variation_index,
        }
    }
}

/// How far [`RotationState::reset`] rewinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Back to `(1, 0)`; history and counters are kept.
    RewindPointer,
    /// Back to `(1, 0)` and forget every recorded publication.
    ClearHistory,
}

/// The persisted rotation singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationState {
    schema_version: u32,
    current_article_index: ArticleIndex,
    current_variation_index: VariationIndex,
    total_posted: u64,
    last_posted_at: Option<Timestamp>,
    history: Vec<HistoryEntry>,
    cached_insights: InsightCache,
}

impl Default for RotationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationState {
    /// The state of a rotation that has never posted: pointer at `(1, 0)`.
    pub fn new() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            current_article_index: ArticleIndex::FIRST,
            current_variation_index: VariationIndex::FIRST,
            total_posted: 0,
            last_posted_at: None,
            history: Vec::new(),
            cached_insights: InsightCache::new(),
        }
    }

    /// A copy of the pointer. Advancing it does not affect this state.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.current_article_index, self.current_variation_index)
    }

    /// The pair that will be published next. Read-only.
    ///
    /// # Errors
    ///
    /// [`RotationError::BacklogExhausted`] once every pair has been used.
    pub fn peek(&self, bounds: RotationBounds) -> Result<Slot, RotationError> {
        self.cursor().peek(bounds)
    }

    /// Moves the pointer one step. Only called after a confirmed publish.
    ///
    /// # Errors
    ///
    /// [`RotationError::BacklogExhausted`] if the pointer is already exhausted;
    /// the state is unchanged in that case.
    pub fn advance(&mut self, bounds: RotationBounds) -> Result<Cursor, RotationError> {
        let next = self.cursor().advance(bounds)?;
        self.current_article_index = next.article;
        self.current_variation_index = next.variation;
        Ok(next)
    }

    /// Records a confirmed publication of the current pair and advances.
    ///
    /// # Errors
    ///
    /// [`RotationError::BacklogExhausted`] if there is no current pair; nothing
    /// is recorded in that case.
    pub fn record_publication(
        &mut self,
        bounds: RotationBounds,
        post_id: PostId,
        posted_at: Timestamp,
        text: impl Into<String>,
    ) -> Result<HistoryEntry, RotationError> {
        let slot = self.peek(bounds)?;
        self.advance(bounds)?;

        let entry = HistoryEntry {
            article_index: slot.article,
            variation_index: slot.variation,
            posted_at,
            post_id,
            text: text.into(),
        };
        self.history.push(entry.clone());
        self.total_posted += 1;
        self.last_posted_at = Some(posted_at);

        tracing::info!(
            published = %slot,
            next = %self.cursor().position(),
            total_posted = self.total_posted,
            "rotation advanced"
        );
        Ok(entry)
    }

    /// Rewinds the pointer to `(1, 0)`. The insight cache is never touched.
    pub fn reset(&mut self, mode: ResetMode) {
        self.current_article_index = ArticleIndex::FIRST;
        self.current_variation_index = VariationIndex::FIRST;
        if mode == ResetMode::ClearHistory {
            self.history.clear();
            self.total_posted = 0;
            self.last_posted_at = None;
        }
        tracing::info!(?mode, "rotation reset");
    }

    /// Checks invariants that serde alone cannot express.
    ///
    /// Called by state stores after deserialising.
    ///
    /// # Errors
    ///
    /// A human-readable description of the first violated invariant.
    pub fn validate(&self, variations_per_article: u32) -> Result<(), String> {
        if self.schema_version != STATE_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {STATE_SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if self.current_variation_index.get() >= variations_per_article {
            return Err(format!(
                "current variation {} is outside 0..{variations_per_article}",
                self.current_variation_index
            ));
        }
        if (self.history.len() as u64) > self.total_posted {
            return Err(format!(
                "history has {} entries but total_posted is {}",
                self.history.len(),
                self.total_posted
            ));
        }
        if let Some(entry) = self
            .history
            .iter()
            .find(|entry| entry.variation_index.get() >= variations_per_article)
        {
            return Err(format!(
                "history entry {} uses a variation outside 0..{variations_per_article}",
                entry.slot()
            ));
        }
        Ok(())
    }

    /// Number of confirmed publications, including ones cleared from history.
    pub fn total_posted(&self) -> u64 {
        self.total_posted
    }

    /// When the last confirmed publication happened.
    pub fn last_posted_at(&self) -> Option<Timestamp> {
        self.last_posted_at
    }

    /// Confirmed publications, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Cached analyses.
    pub fn insights(&self) -> &InsightCache {
        &self.cached_insights
    }

    /// Cached analyses, for write-through and explicit invalidation.
    pub fn insights_mut(&mut self) -> &mut InsightCache {
        &mut self.cached_insights
    }
}
