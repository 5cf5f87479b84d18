//! Insight cache keyed by article content.
//!
//! Analysing an article is the dominant cost of a run and every article is
//! posted V times, so analyses are kept until explicitly invalidated. Keys are
//! [`ArticleFingerprint`]s plus a schema version: an article that moves within
//! an edited document keeps its entry, an edited article gets a new one, and
//! bumping the schema version makes every older entry a miss. An entry also
//! records how many insights it was asked for, so raising N re-analyses.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{Article, ArticleFingerprint, ArticleIndex, ArticleInsights, Timestamp};

/// Schema version written by this release.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// One cached analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Schema version the analysis was produced under.
    pub schema_version: u32,
    /// N the analysis was requested with. Entries written without it never hit.
    #[serde(default)]
    pub insights_per_article: usize,
    /// Where the article sat when it was analysed. Informational only.
    pub article: ArticleIndex,
    /// Title at analysis time, for `cadence status`.
    pub title: String,
    /// The analysis itself.
    pub analysis: ArticleInsights,
    /// When the analysis was stored.
    pub cached_at: Timestamp,
}

/// Explicit insight cache. Entries never expire on their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsightCache {
    entries: BTreeMap<ArticleFingerprint, CacheEntry>,
}

impl InsightCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached analysis of `article` made under `schema_version`
    /// for exactly `insights_per_article` insights, if any.
    pub fn get(
        &self,
        article: &Article,
        schema_version: u32,
        insights_per_article: usize,
    ) -> Option<&ArticleInsights> {
        self.entries
            .get(article.fingerprint())
            .filter(|entry| {
                entry.schema_version == schema_version
                    && entry.insights_per_article == insights_per_article
                    && entry.analysis.insights.len() >= insights_per_article
            })
            .map(|entry| &entry.analysis)
    }

    /// Stores an analysis, replacing any previous entry for the same content.
    pub fn insert(
        &mut self,
        article: &Article,
        schema_version: u32,
        insights_per_article: usize,
        analysis: ArticleInsights,
    ) {
        self.entries.insert(
            article.fingerprint().clone(),
            CacheEntry {
                schema_version,
                insights_per_article,
                article: article.index,
                title: article.title.clone(),
                analysis,
                cached_at: Timestamp::now(),
            },
        );
    }

    /// Returns the cached analysis or runs `compute` and stores its result.
    ///
    /// `compute` is not invoked on a hit. A failed computation stores nothing.
    pub async fn get_or_compute<F, Fut, E>(
        &mut self,
        article: &Article,
        schema_version: u32,
        insights_per_article: usize,
        compute: F,
    ) -> Result<ArticleInsights, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArticleInsights, E>>,
    {
        if let Some(hit) = self.get(article, schema_version, insights_per_article) {
            tracing::debug!(
                article = %article.index,
                fingerprint = article.fingerprint().short(),
                "insight cache hit"
            );
            return Ok(hit.clone());
        }

        tracing::debug!(
            article = %article.index,
            fingerprint = article.fingerprint().short(),
            "insight cache miss"
        );
        let analysis = compute().await?;
        self.insert(article, schema_version, insights_per_article, analysis.clone());
        Ok(analysis)
    }

    /// Drops the entry for one piece of content. Returns `true` if one existed.
    pub fn invalidate(&mut self, fingerprint: &ArticleFingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Number of entries, including ones from older schema versions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in fingerprint order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArticleFingerprint, &CacheEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Insight;

    fn article(index: u32, body: &str) -> Article {
        Article::new(ArticleIndex::new(index).unwrap(), Some(index), "Title", None, body)
    }

    fn analysis(tag: &str) -> ArticleInsights {
        ArticleInsights {
            insights: vec![Insight::new(tag).unwrap()],
            themes: vec![],
        }
    }

    #[tokio::test]
    async fn second_lookup_does_not_compute() {
        let mut cache = InsightCache::new();
        let calls = AtomicUsize::new(0);
        let a = article(1, "body");

        for _ in 0..2 {
            let result: Result<_, ()> = cache
                .get_or_compute(&a, CACHE_SCHEMA_VERSION, 1, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(analysis("x"))
                })
                .await;
            assert_eq!(result.unwrap(), analysis("x"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_computation_stores_nothing() {
        let mut cache = InsightCache::new();
        let result = cache
            .get_or_compute(&article(1, "body"), CACHE_SCHEMA_VERSION, 1, || async { Err("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());
    }

    #[test]
    fn moved_article_still_hits() {
        let mut cache = InsightCache::new();
        cache.insert(&article(1, "same"), CACHE_SCHEMA_VERSION, 1, analysis("x"));
        assert!(cache.get(&article(4, "same"), CACHE_SCHEMA_VERSION, 1).is_some());
        assert!(cache.get(&article(1, "edited"), CACHE_SCHEMA_VERSION, 1).is_none());
    }

    #[test]
    fn schema_bump_turns_entries_into_misses() {
        let mut cache = InsightCache::new();
        let a = article(1, "body");
        cache.insert(&a, 1, 1, analysis("x"));
        assert!(cache.get(&a, 2, 1).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_insight_count_is_a_miss() {
        let mut cache = InsightCache::new();
        let a = article(1, "body");
        cache.insert(&a, CACHE_SCHEMA_VERSION, 1, analysis("x"));

        assert!(cache.get(&a, CACHE_SCHEMA_VERSION, 1).is_some());
        assert!(cache.get(&a, CACHE_SCHEMA_VERSION, 3).is_none());
        assert!(cache.get(&a, CACHE_SCHEMA_VERSION, 0).is_none());
    }

    #[test]
    fn entries_without_a_recorded_count_are_misses() {
        let mut cache = InsightCache::new();
        let a = article(1, "body");
        cache.insert(&a, CACHE_SCHEMA_VERSION, 1, analysis("x"));

        let mut json = serde_json::to_value(&cache).unwrap();
        json[a.fingerprint().as_str()]
            .as_object_mut()
            .unwrap()
            .remove("insights_per_article");
        let legacy: InsightCache = serde_json::from_value(json).unwrap();

        assert_eq!(legacy.len(), 1);
        assert!(legacy.get(&a, CACHE_SCHEMA_VERSION, 1).is_none());
    }

    #[test]
    fn invalidation_is_explicit() {
        let mut cache = InsightCache::new();
        let a = article(1, "a");
        cache.insert(&a, 1, 1, analysis("x"));
        cache.insert(&article(2, "b"), 1, 1, analysis("y"));

        assert!(cache.invalidate(a.fingerprint()));
        assert!(!cache.invalidate(a.fingerprint()));
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn serialises_as_fingerprint_keyed_map() {
        let mut cache = InsightCache::new();
        let a = article(1, "a");
        cache.insert(&a, 1, 1, analysis("x"));
        let json = serde_json::to_value(&cache).unwrap();
        assert!(json.get(a.fingerprint().as_str()).is_some());
        let back: InsightCache = serde_json::from_value(json).unwrap();
        assert_eq!(back, cache);
    }
}
