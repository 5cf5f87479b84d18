//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example, an
//! [`ArticleIndex`] with a [`VariationIndex`] even though both are small integers
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Rotation coordinates
// ---------------------------------------------------------------------------

/// 1-based position of an article in the parsed document.
///
/// Stable within one parse of one document. Re-parsing an edited document may
/// renumber articles, which is why the insight cache keys on
/// [`ArticleFingerprint`] and never on this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ArticleIndex(u32);

impl ArticleIndex {
    /// The first article of any document.
    pub const FIRST: Self = Self(1);

    /// Creates an index, returning `None` for `0`.
    pub fn new(value: u32) -> Option<Self> {
        (value >= 1).then_some(Self(value))
    }

    /// Returns the underlying 1-based integer.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the 0-based offset into an article slice.
    pub fn offset(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Returns the following index.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl TryFrom<u32> for ArticleIndex {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "article index must be >= 1".to_string())
    }
}

impl From<ArticleIndex> for u32 {
    fn from(index: ArticleIndex) -> Self {
        index.0
    }
}

impl std::fmt::Display for ArticleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 0-based variation number within one article.
///
/// Variation `i` is always built from insight `i` of the article's insight set,
/// which is what keeps the angles of an article's variations disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariationIndex(u32);

impl VariationIndex {
    /// The first variation of any article.
    pub const FIRST: Self = Self(0);

    /// Creates a variation index from a raw integer.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the index as a slice offset.
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VariationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Content identity
// ---------------------------------------------------------------------------

/// Content identity of an article: BLAKE3 over its title, url, and body.
///
/// Two parses of the same article text always yield the same fingerprint,
/// regardless of where the article sits in the document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArticleFingerprint(String);

impl ArticleFingerprint {
    /// Computes the fingerprint of an article's content.
    pub fn of(title: &str, url: Option<&str>, body: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for part in [title, url.unwrap_or(""), body] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for ArticleFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Run identifier
// ---------------------------------------------------------------------------

/// Identifies a single command invocation.
///
/// Generated fresh for every CLI invocation; attached to the root span so all
/// activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies the source document: a file path or an export URL.
    DocumentId
}

string_id! {
    /// Identifier assigned by the social platform to a published post.
    PostId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_index_rejects_zero() {
        assert!(ArticleIndex::new(0).is_none());
        assert_eq!(ArticleIndex::new(3).map(ArticleIndex::offset), Some(2));
    }

    #[test]
    fn article_index_deserialisation_enforces_lower_bound() {
        assert!(serde_json::from_str::<ArticleIndex>("0").is_err());
        let idx: ArticleIndex = serde_json::from_str("4").unwrap();
        assert_eq!(idx.get(), 4);
    }

    #[test]
    fn fingerprint_ignores_position_but_not_content() {
        let a = ArticleFingerprint::of("Title", Some("https://x"), "body");
        let b = ArticleFingerprint::of("Title", Some("https://x"), "body");
        let c = ArticleFingerprint::of("Title", Some("https://x"), "body!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn fingerprint_separates_field_boundaries() {
        let a = ArticleFingerprint::of("ab", None, "c");
        let b = ArticleFingerprint::of("a", None, "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn string_ids_reject_blank_values() {
        assert!(PostId::new("  ").is_none());
        assert_eq!(PostId::new("123").unwrap().as_str(), "123");
    }
}
