//! `RotationExecutor`: one command, one pass through the pipeline.
//!
//! Every run reads the document and the persisted state fresh, does its work on
//! an in-memory copy, and writes the full state back only after a step has been
//! durably decided. A crash between a confirmed publish and the save is the one
//! window in which a post can be repeated; the save happens immediately after
//! the platform confirms.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::Utc;
use pipeline::{
    inspect, parse_document, Article, ArticleFingerprint, ArticleIndex, CadenceError,
    DocumentId, DocumentReport, DocumentSource, HistoryEntry, Post, ResetMode, RotationBounds,
    RotationState, Slot, StateStore, Timestamp,
};
use tracing::instrument;

use crate::{
    ContentAnalyzer, PipelinePlanner, PlanOutcome, PublishMode, PublishOutcome, Publisher,
    VariationComposer,
};

/// Values every run needs besides the components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub document: DocumentId,
    /// V: variations per article.
    pub variations_per_article: NonZeroU32,
    pub cache_schema_version: u32,
}

/// A parsed document together with its structure report.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub articles: Vec<Article>,
    pub report: DocumentReport,
    pub bounds: RotationBounds,
}

/// Result of `preview` and `commit`.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub slot: Slot,
    pub article_title: String,
    pub post: Post,
    pub outcome: PublishOutcome,
    /// Pairs left after this step.
    pub remaining: usize,
}

/// Where the backlog stands relative to the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogStatus {
    pub article_count: usize,
    pub remaining: usize,
    /// `None` once the backlog is exhausted.
    pub next: Option<(Slot, String)>,
}

/// Read-only summary of the persisted state.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub position: Slot,
    pub total_posted: u64,
    pub last_posted_at: Option<Timestamp>,
    pub last_post: Option<HistoryEntry>,
    pub history_len: usize,
    pub cached_analyses: usize,
    /// `None` if the document could not be loaded.
    pub backlog: Option<BacklogStatus>,
    pub document_error: Option<String>,
}

/// Drives preview, plan, commit, status, reset, and cache maintenance.
pub struct RotationExecutor {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn StateStore>,
    analyzer: ContentAnalyzer,
    composer: VariationComposer,
    planner: PipelinePlanner,
    publisher: Publisher,
    settings: ExecutorSettings,
}

impl RotationExecutor {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn StateStore>,
        analyzer: ContentAnalyzer,
        composer: VariationComposer,
        planner: PipelinePlanner,
        publisher: Publisher,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            source,
            store,
            analyzer,
            composer,
            planner,
            publisher,
            settings,
        }
    }

    /// Fetches and parses the document, logging structural warnings.
    ///
    /// # Errors
    ///
    /// [`CadenceError::Source`] or [`CadenceError::Parse`]; no state is read.
    #[instrument(skip_all, fields(document = %self.settings.document))]
    pub async fn load_document(&self) -> Result<LoadedDocument, CadenceError> {
        let text = self.source.fetch(&self.settings.document).await?;
        let articles = parse_document(&text)?;
        let report = inspect(&articles);
        for warning in &report.warnings {
            tracing::warn!(%warning, "document structure");
        }

        let bounds = self.bounds(articles.len());
        tracing::info!(
            articles = articles.len(),
            total_slots = bounds.total_slots(),
            "document loaded"
        );
        Ok(LoadedDocument {
            articles,
            report,
            bounds,
        })
    }

    /// Composes the next post and validates it without sending or advancing.
    pub async fn preview(&self) -> Result<StepReport, CadenceError> {
        self.run_next(PublishMode::DryRun).await
    }

    /// Composes and publishes the next post.
    ///
    /// With [`PublishMode::DryRun`] this behaves like [`Self::preview`].
    /// On failure the pointer and history are untouched; a newly computed
    /// analysis is still persisted.
    pub async fn commit(&self, mode: PublishMode) -> Result<StepReport, CadenceError> {
        self.run_next(mode).await
    }

    #[instrument(skip_all, fields(?mode))]
    async fn run_next(&self, mode: PublishMode) -> Result<StepReport, CadenceError> {
        let document = self.load_document().await?;
        let bounds = document.bounds;
        let mut state = self.store.load().await?;

        let slot = state.peek(bounds)?;
        let article = &document.articles[slot.article.offset()];
        let version = self.settings.cache_schema_version;
        let was_cached = self.analyzer.is_cached(state.insights(), article, version);

        let analysis = self
            .analyzer
            .analyze_cached(state.insights_mut(), article, version)
            .await?;
        let cache_grew = !was_cached;

        let step = async {
            let post = self.composer.compose(article, &analysis, slot.variation).await?;
            let outcome = self
                .publisher
                .publish(&post, &mut state, bounds, mode)
                .await?;
            Ok::<_, CadenceError>((post, outcome))
        }
        .await;

        match step {
            Ok((post, outcome)) => {
                if matches!(outcome, PublishOutcome::Published { .. }) || cache_grew {
                    self.persist(&state).await?;
                }
                Ok(StepReport {
                    slot,
                    article_title: article.title.clone(),
                    post,
                    outcome,
                    remaining: state.cursor().remaining(bounds),
                })
            }
            Err(error) => {
                if cache_grew {
                    self.persist(&state).await?;
                }
                Err(error)
            }
        }
    }

    /// Plans `steps` posts from the current pointer without advancing it.
    ///
    /// Newly computed analyses are persisted; the pointer and history are not.
    #[instrument(skip_all, fields(steps = steps))]
    pub async fn plan(&self, steps: usize) -> Result<PlanOutcome, CadenceError> {
        let document = self.load_document().await?;
        let mut state = self.store.load().await?;
        let cached_before = state.insights().len();

        let start = state.cursor();
        let outcome = self
            .planner
            .plan(
                &document.articles,
                start,
                document.bounds,
                state.insights_mut(),
                steps,
                Utc::now(),
            )
            .await;

        if state.insights().len() != cached_before {
            self.persist(&state).await?;
        }
        Ok(outcome)
    }

    /// Summarises the persisted state. A document that cannot be loaded is
    /// reported, not fatal.
    pub async fn status(&self) -> Result<StatusReport, CadenceError> {
        let state = self.store.load().await?;

        let (backlog, document_error) = match self.load_document().await {
            Ok(document) => {
                let bounds = document.bounds;
                let next = state.peek(bounds).ok().map(|slot| {
                    let title = document.articles[slot.article.offset()].title.clone();
                    (slot, title)
                });
                let backlog = BacklogStatus {
                    article_count: document.articles.len(),
                    remaining: state.cursor().remaining(bounds),
                    next,
                };
                (Some(backlog), None)
            }
            Err(error) => {
                tracing::warn!(%error, "status without document");
                (None, Some(error.to_string()))
            }
        };

        Ok(StatusReport {
            position: state.cursor().position(),
            total_posted: state.total_posted(),
            last_posted_at: state.last_posted_at(),
            last_post: state.history().last().cloned(),
            history_len: state.history().len(),
            cached_analyses: state.insights().len(),
            backlog,
            document_error,
        })
    }

    /// Rewinds the pointer to `(1, 0)`.
    ///
    /// With `force` the stored state is not read at all and a fresh state is
    /// written in its place. This is how an operator recovers from a corrupted
    /// state file; it also drops the insight cache.
    pub async fn reset(&self, mode: ResetMode, force: bool) -> Result<RotationState, CadenceError> {
        let state = if force {
            tracing::warn!(location = %self.store.location(), "replacing stored state without reading it");
            RotationState::new()
        } else {
            let mut state = self.store.load().await?;
            state.reset(mode);
            state
        };
        self.persist(&state).await?;
        Ok(state)
    }

    /// Drops cached analyses: every entry, or only the one for `article` in the
    /// current document. Returns how many entries were removed.
    pub async fn clear_cache(&self, article: Option<ArticleIndex>) -> Result<usize, CadenceError> {
        let mut state = self.store.load().await?;

        let removed = match article {
            None => state.insights_mut().clear(),
            Some(index) => {
                let document = self.load_document().await?;
                match document.articles.get(index.offset()) {
                    Some(article) => {
                        let fingerprint: &ArticleFingerprint = article.fingerprint();
                        usize::from(state.insights_mut().invalidate(fingerprint))
                    }
                    None => {
                        tracing::warn!(
                            %index,
                            articles = document.articles.len(),
                            "no such article in the current document"
                        );
                        0
                    }
                }
            }
        };

        if removed > 0 {
            self.persist(&state).await?;
        }
        tracing::info!(removed, "insight cache cleared");
        Ok(removed)
    }

    fn bounds(&self, article_count: usize) -> RotationBounds {
        RotationBounds::with_variations(article_count, self.settings.variations_per_article)
    }

    async fn persist(&self, state: &RotationState) -> Result<(), CadenceError> {
        self.store.save(state).await.map_err(|error| {
            tracing::error!(%error, location = %self.store.location(), "state not saved");
            CadenceError::from(error)
        })
    }
}

impl std::fmt::Debug for RotationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationExecutor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
