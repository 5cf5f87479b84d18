//! Pipeline Planner: simulates upcoming posts without publishing them.
//!
//! The planner walks a private [`Cursor`] copy. Analyses computed along the way
//! are written through to the insight cache; the live rotation pointer is never
//! reachable from here.

use chrono::{DateTime, Utc};
use pipeline::{
    Article, CadenceError, Cursor, InsightCache, PostingCadence, RotationBounds, Schedule,
    ScheduleEntry,
};
use tracing::instrument;

use crate::{ContentAnalyzer, VariationComposer};

/// The step a plan stopped at, and why.
#[derive(Debug)]
pub struct PlanFailure {
    /// 1-based step that failed.
    pub step: usize,
    pub error: CadenceError,
}

/// Result of planning: every entry that succeeded, plus the failure that
/// stopped the plan early, if any.
#[derive(Debug)]
pub struct PlanOutcome {
    pub schedule: Schedule,
    pub failure: Option<PlanFailure>,
}

impl PlanOutcome {
    /// Returns `true` if every requested step was planned.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Produces forward-looking schedules.
#[derive(Debug, Clone)]
pub struct PipelinePlanner {
    analyzer: ContentAnalyzer,
    composer: VariationComposer,
    cadence: PostingCadence,
    cache_schema_version: u32,
}

impl PipelinePlanner {
    pub fn new(
        analyzer: ContentAnalyzer,
        composer: VariationComposer,
        cadence: PostingCadence,
        cache_schema_version: u32,
    ) -> Self {
        Self {
            analyzer,
            composer,
            cadence,
            cache_schema_version,
        }
    }

    /// Plans `steps` posts starting at `start`.
    ///
    /// Step k (0-based) is scheduled `k` intervals after the first slot
    /// following `now`. On failure at step k the entries for steps before k are
    /// kept and returned together with the error. Reaching the end of the
    /// backlog is such a failure.
    #[instrument(skip_all, fields(steps = steps, start = %start.position()))]
    pub async fn plan(
        &self,
        articles: &[Article],
        start: Cursor,
        bounds: RotationBounds,
        cache: &mut InsightCache,
        steps: usize,
        now: DateTime<Utc>,
    ) -> PlanOutcome {
        let first_slot = self.cadence.first_slot_after(now);
        let mut schedule = Schedule::new();
        let mut cursor = start;

        for offset in 0..steps {
            let step = offset + 1;
            match self
                .plan_step(articles, cursor, bounds, cache, step, self.cadence.slot(first_slot, offset))
                .await
            {
                Ok((entry, next)) => {
                    schedule.entries.push(entry);
                    cursor = next;
                }
                Err(error) => {
                    tracing::warn!(step, stage = %error.stage(), %error, "plan stopped early");
                    return PlanOutcome {
                        schedule,
                        failure: Some(PlanFailure { step, error }),
                    };
                }
            }
        }

        tracing::info!(planned = schedule.len(), "plan complete");
        PlanOutcome {
            schedule,
            failure: None,
        }
    }

    async fn plan_step(
        &self,
        articles: &[Article],
        cursor: Cursor,
        bounds: RotationBounds,
        cache: &mut InsightCache,
        step: usize,
        scheduled_for: chrono::DateTime<chrono::FixedOffset>,
    ) -> Result<(ScheduleEntry, Cursor), CadenceError> {
        let slot = cursor.peek(bounds)?;
        let article = &articles[slot.article.offset()];

        let analysis = self
            .analyzer
            .analyze_cached(cache, article, self.cache_schema_version)
            .await?;
        let post = self.composer.compose(article, &analysis, slot.variation).await?;
        let length = self.composer.length_rule().measure(&post.text);

        let entry = ScheduleEntry {
            step,
            scheduled_for,
            article: slot.article,
            variation: slot.variation,
            article_title: article.title.clone(),
            insight: post.insight,
            draft_text: post.text,
            length,
        };
        Ok((entry, cursor.advance(bounds)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveTime, TimeZone, Weekday};
    use pipeline::{parse_document, LlmError, RotationState, CACHE_SCHEMA_VERSION};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{document, ScriptedModel};
    use crate::{AnalyzerSettings, ComposerSettings};

    fn planner(model: Arc<ScriptedModel>) -> PipelinePlanner {
        PipelinePlanner::new(
            ContentAnalyzer::new(model.clone(), AnalyzerSettings::default()),
            VariationComposer::new(model, ComposerSettings::default()),
            PostingCadence::weekly(Weekday::Mon, NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            CACHE_SCHEMA_VERSION,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
    }

    fn pairs(schedule: &Schedule) -> Vec<(u32, u32)> {
        schedule
            .entries
            .iter()
            .map(|e| (e.article.get(), e.variation.get()))
            .collect()
    }

    #[tokio::test]
    async fn plan_three_on_fresh_backlog_leaves_live_state_alone() {
        let articles = parse_document(&document(5)).unwrap();
        let bounds = RotationBounds::new(articles.len(), 4).unwrap();
        let mut state = RotationState::new();
        let model = Arc::new(ScriptedModel::well_behaved(7));

        let start = state.cursor();
        let outcome = planner(model.clone())
            .plan(&articles, start, bounds, state.insights_mut(), 3, now())
            .await;

        assert!(outcome.is_complete());
        assert_eq!(pairs(&outcome.schedule), vec![(1, 0), (1, 1), (1, 2)]);
        assert_eq!(state.cursor(), Cursor::START);
        assert_eq!(state.insights().len(), 1);
        assert_eq!(model.analysis_requests(), 1);
    }

    #[tokio::test]
    async fn entries_are_one_interval_apart_from_the_next_slot() {
        let articles = parse_document(&document(2)).unwrap();
        let bounds = RotationBounds::new(articles.len(), 4).unwrap();
        let mut cache = InsightCache::new();
        let model = Arc::new(ScriptedModel::well_behaved(7));

        let outcome = planner(model)
            .plan(&articles, Cursor::START, bounds, &mut cache, 2, now())
            .await;
        let dates: Vec<String> = outcome
            .schedule
            .entries
            .iter()
            .map(|e| e.scheduled_for.to_rfc3339())
            .collect();
        assert_eq!(
            dates,
            vec!["2024-01-08T09:00:00+00:00", "2024-01-15T09:00:00+00:00"]
        );
    }

    #[tokio::test]
    async fn replanning_with_warm_cache_is_identical() {
        let articles = parse_document(&document(3)).unwrap();
        let bounds = RotationBounds::new(articles.len(), 4).unwrap();
        let mut cache = InsightCache::new();
        let model = Arc::new(ScriptedModel::well_behaved(7));
        let planner = planner(model.clone());

        let first = planner.plan(&articles, Cursor::START, bounds, &mut cache, 6, now()).await;
        let second = planner.plan(&articles, Cursor::START, bounds, &mut cache, 6, now()).await;

        assert!(first.is_complete() && second.is_complete());
        assert_eq!(first.schedule.entries, second.schedule.entries);
        assert_eq!(
            serde_json::to_string(&first.schedule.entries).unwrap(),
            serde_json::to_string(&second.schedule.entries).unwrap()
        );
        assert_eq!(model.analysis_requests(), 2);
    }

    #[tokio::test]
    async fn failure_keeps_entries_before_the_failing_step() {
        let articles = parse_document(&document(3)).unwrap();
        let bounds = RotationBounds::new(articles.len(), 2).unwrap();
        let mut cache = InsightCache::new();
        let model = Arc::new(ScriptedModel::with_responder(|request| {
            if request.prompt.contains("Body of article 2") {
                Err(LlmError::Unavailable {
                    message: "overloaded".into(),
                })
            } else if request.system == crate::analyzer::ANALYZER_SYSTEM {
                Ok(crate::testing::insight_json("a", 7))
            } else {
                Ok("Short post".into())
            }
        }));

        let outcome = planner(model)
            .plan(&articles, Cursor::START, bounds, &mut cache, 5, now())
            .await;

        assert_eq!(pairs(&outcome.schedule), vec![(1, 0), (1, 1)]);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.step, 3);
        assert_eq!(failure.error.stage(), pipeline::Stage::Analyze);
    }

    #[tokio::test]
    async fn exhaustion_mid_plan_is_reported_as_the_failing_step() {
        let articles = parse_document(&document(1)).unwrap();
        let bounds = RotationBounds::new(articles.len(), 2).unwrap();
        let mut cache = InsightCache::new();

        let outcome = planner(Arc::new(ScriptedModel::well_behaved(7)))
            .plan(&articles, Cursor::START, bounds, &mut cache, 4, now())
            .await;

        assert_eq!(outcome.schedule.len(), 2);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.step, 3);
        assert!(matches!(failure.error, CadenceError::Rotation(_)));
    }
}
