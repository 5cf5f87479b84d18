//! Shared value types for the Cadence domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (posts respect a length rule, insight sets
//! have a fixed size) and participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArticleFingerprint, ArticleIndex, PostId, VariationIndex};

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// One parsed unit of source content.
///
/// Created by [`crate::parser::parse_document`]; immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    /// 1-based position in the parsed document.
    pub index: ArticleIndex,

    /// The number written in the document's `Article #<n>` heading.
    ///
    /// Informational only; it may disagree with `index` when the author skipped
    /// or repeated a number.
    pub heading_number: Option<u32>,

    /// Article title. Never empty.
    pub title: String,

    /// Link to the published article, if the document carries one.
    pub url: Option<String>,

    /// Everything after the leading title and URL lines.
    pub body: String,

    fingerprint: ArticleFingerprint,
}

impl Article {
    /// Builds an article and computes its content fingerprint.
    pub fn new(
        index: ArticleIndex,
        heading_number: Option<u32>,
        title: impl Into<String>,
        url: Option<String>,
        body: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let fingerprint = ArticleFingerprint::of(&title, url.as_deref(), &body);
        Self {
            index,
            heading_number,
            title,
            url,
            body,
            fingerprint,
        }
    }

    /// Content identity used as the insight cache key.
    pub fn fingerprint(&self) -> &ArticleFingerprint {
        &self.fingerprint
    }

    /// Number of whitespace-separated words in the body.
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// A single extracted strategic point about an article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Insight(String);

impl Insight {
    /// Creates an insight, returning `None` if the text is blank.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the insight text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case- and whitespace-insensitive form used for duplicate detection.
    pub fn normalized(&self) -> String {
        self.0
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Insight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the analyzer extracts from one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInsights {
    /// Exactly N distinct insights, in the order the model produced them.
    pub insights: Vec<Insight>,

    /// Broad themes, used for hashtag selection. May be empty.
    #[serde(default)]
    pub themes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Length rule
// ---------------------------------------------------------------------------

/// Hard length limit of a post, measured the way the platform measures it.
///
/// Every `http://` or `https://` token counts as `link_weight` characters
/// regardless of its real length; everything else counts one per Unicode
/// scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRule {
    /// Maximum effective length, inclusive.
    pub limit: usize,
    /// Effective length of any link.
    pub link_weight: usize,
}

impl LengthRule {
    /// Creates a rule. Returns `None` if `limit` is zero.
    pub fn new(limit: usize, link_weight: usize) -> Option<Self> {
        (limit > 0).then_some(Self { limit, link_weight })
    }

    /// Effective length of `text`.
    pub fn measure(&self, text: &str) -> usize {
        let mut length = text.chars().count();
        for token in text.split_whitespace() {
            if token.starts_with("https://") || token.starts_with("http://") {
                length = length - token.chars().count() + self.link_weight;
            }
        }
        length
    }

    /// Returns `true` if `text` is within the limit.
    pub fn fits(&self, text: &str) -> bool {
        self.measure(text) <= self.limit
    }
}

impl Default for LengthRule {
    fn default() -> Self {
        Self {
            limit: 280,
            link_weight: 23,
        }
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// A composed post, ready for validation and publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Article the post was composed from.
    pub article: ArticleIndex,
    /// Variation slot the post fills.
    pub variation: VariationIndex,
    /// Final text, including link and hashtags.
    pub text: String,
    /// The insight the post centres on.
    pub insight: Insight,
    /// When the post was composed.
    pub created_at: Timestamp,
}

/// Confirmation returned by the posting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    /// Platform-assigned identifier.
    pub post_id: PostId,
    /// When the platform accepted the post.
    pub posted_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_count_as_fixed_weight() {
        let rule = LengthRule::default();
        let long_link = format!("https://example.com/{}", "a".repeat(200));
        let text = format!("Read this\n\n{long_link}");
        assert_eq!(rule.measure(&text), "Read this\n\n".chars().count() + 23);
        assert!(rule.fits(&text));
    }

    #[test]
    fn multibyte_characters_count_once() {
        let rule = LengthRule::default();
        assert_eq!(rule.measure("🚀 go"), 4);
    }

    #[test]
    fn limit_is_inclusive() {
        let rule = LengthRule::new(5, 23).unwrap();
        assert!(rule.fits("abcde"));
        assert!(!rule.fits("abcdef"));
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(LengthRule::new(0, 23).is_none());
    }

    #[test]
    fn insight_normalisation_ignores_case_and_spacing() {
        let a = Insight::new("Data  quality   Compounds").unwrap();
        let b = Insight::new("data quality compounds").unwrap();
        assert_eq!(a.normalized(), b.normalized());
        assert!(Insight::new("   ").is_none());
    }

    #[test]
    fn article_fingerprint_follows_content() {
        let a = Article::new(ArticleIndex::FIRST, Some(1), "T", None, "body");
        let b = Article::new(ArticleIndex::new(4).unwrap(), Some(9), "T", None, "body");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.word_count(), 1);
    }
}
