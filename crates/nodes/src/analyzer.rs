//! Content Analyzer: extracts exactly N distinct insights from one article.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    AnalysisError, Article, ArticleInsights, CompletionRequest, Insight, InsightCache,
    LanguageModel,
};
use serde::Deserialize;
use tracing::instrument;

use crate::retry::{with_corrective_retry, Attempt, Failure};

/// Standing instruction for every analysis request.
pub const ANALYZER_SYSTEM: &str = "You analyse newsletter articles about AI, data strategy, and \
business technology. You extract high-level strategic insights that would each stand alone as a \
social post. Every insight must take a different angle from the others. Ignore the article title \
and work from the body only. Reply with JSON only.";

/// Tuning for [`ContentAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    /// N: how many distinct insights every article must yield.
    pub insights_per_article: usize,
    /// Body text beyond this many characters is not sent to the model.
    pub max_body_chars: usize,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            insights_per_article: 7,
            max_body_chars: 3000,
            max_tokens: 1500,
            temperature: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Turns an article into its insight set via the language model.
#[derive(Clone)]
pub struct ContentAnalyzer {
    model: Arc<dyn LanguageModel>,
    settings: AnalyzerSettings,
}

impl ContentAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, settings: AnalyzerSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Returns `true` if `cache` already holds a usable analysis of `article`.
    pub fn is_cached(&self, cache: &InsightCache, article: &Article, schema_version: u32) -> bool {
        cache
            .get(article, schema_version, self.settings.insights_per_article)
            .is_some()
    }

    /// Returns the cached analysis of `article`, analysing it on a miss.
    ///
    /// Only entries made for the configured N count as hits. The model is not
    /// called on a hit. A failed analysis leaves the cache unchanged.
    pub async fn analyze_cached(
        &self,
        cache: &mut InsightCache,
        article: &Article,
        schema_version: u32,
    ) -> Result<ArticleInsights, AnalysisError> {
        cache
            .get_or_compute(
                article,
                schema_version,
                self.settings.insights_per_article,
                || self.analyze(article),
            )
            .await
    }

    /// Extracts exactly `insights_per_article` distinct insights from `article`.
    ///
    /// A reply with too few distinct insights gets one corrective retry.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::WrongInsightCount`] if the corrective reply is still short.
    /// - [`AnalysisError::Model`] if the model call fails or times out.
    #[instrument(skip_all, fields(article = %article.index, model = self.model.model()))]
    pub async fn analyze(&self, article: &Article) -> Result<ArticleInsights, AnalysisError> {
        let expected = self.settings.insights_per_article;

        with_corrective_retry("analyze", |attempt| {
            let request = self.request(article, &attempt);
            async move {
                let reply = crate::complete_within(self.model.as_ref(), &request, self.settings.timeout)
                    .await
                    .map_err(|source| {
                        Failure::Fatal(AnalysisError::Model {
                            article: article.index,
                            source,
                        })
                    })?;

                let mut analysis = parse_reply(&reply);
                let received = analysis.insights.len();
                if received < expected {
                    return Err(Failure::Correctable {
                        error: AnalysisError::WrongInsightCount {
                            article: article.index,
                            expected,
                            received,
                        },
                        feedback: format!(
                            "your reply contained {received} distinct insights but exactly {expected} are required"
                        ),
                    });
                }
                if received > expected {
                    tracing::debug!(received, expected, "dropping surplus insights");
                    analysis.insights.truncate(expected);
                }

                tracing::info!(
                    insights = analysis.insights.len(),
                    themes = analysis.themes.len(),
                    corrective = attempt.is_corrective(),
                    "article analysed"
                );
                Ok(analysis)
            }
        })
        .await
    }

    fn request(&self, article: &Article, attempt: &Attempt) -> CompletionRequest {
        let expected = self.settings.insights_per_article;
        let body: String = article.body.chars().take(self.settings.max_body_chars).collect();

        let mut prompt = format!(
            "Extract exactly {expected} distinct key insights from the article below.\n\
             Each insight is one or two sentences, focuses on why it matters, and takes an \
             angle none of the others take.\n\n\
             Reply with a JSON object of the form \
             {{\"key_insights\": [\"...\"], \"themes\": [\"...\"]}} where themes are two to \
             five broad topics of the article.\n\n\
             Article body:\n{body}"
        );
        if let Attempt::Corrective { feedback } = attempt {
            prompt.push_str(&format!(
                "\n\nYour previous reply was rejected: {feedback}. Reply again with exactly \
                 {expected} distinct insights as JSON."
            ));
        }

        let request = CompletionRequest::new(ANALYZER_SYSTEM, prompt, self.settings.max_tokens);
        match self.settings.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

impl std::fmt::Debug for ContentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAnalyzer")
            .field("model", &self.model.model())
            .field("settings", &self.settings)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default, alias = "insights")]
    key_insights: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
}

/// Reads the model reply as JSON, falling back to bulleted text.
///
/// Blank and duplicate insights (ignoring case and spacing) are dropped;
/// order is preserved.
fn parse_reply(reply: &str) -> ArticleInsights {
    let raw = parse_json(reply).unwrap_or_else(|| parse_bullets(reply));

    let mut seen = HashSet::new();
    let insights = raw
        .key_insights
        .into_iter()
        .filter_map(Insight::new)
        .filter(|insight| seen.insert(insight.normalized()))
        .collect();
    let themes = raw
        .themes
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    ArticleInsights { insights, themes }
}

fn parse_json(reply: &str) -> Option<RawAnalysis> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

fn parse_bullets(reply: &str) -> RawAnalysis {
    enum Section {
        None,
        Insights,
        Themes,
        Other,
    }

    let mut section = Section::None;
    let mut raw = RawAnalysis {
        key_insights: Vec::new(),
        themes: Vec::new(),
    };

    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(item) = bullet_text(line) {
            match section {
                Section::Insights | Section::None => raw.key_insights.push(item.to_string()),
                Section::Themes => raw.themes.push(item.to_string()),
                Section::Other => {}
            }
            continue;
        }

        let lower = line.to_lowercase();
        section = if lower.contains("insight") {
            Section::Insights
        } else if lower.contains("theme") {
            Section::Themes
        } else {
            Section::Other
        };
    }
    raw
}

/// Returns the text of a `-`, `*`, `•`, `1.` or `1)` list item.
fn bullet_text(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(&['-', '*', '•'][..]) {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(&['.', ')'][..]) {
            return Some(rest.trim());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pipeline::{ArticleIndex, LlmError, CACHE_SCHEMA_VERSION};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{insight_json, ScriptedModel};

    fn article() -> Article {
        Article::new(
            ArticleIndex::FIRST,
            Some(1),
            "Strategy Before Models",
            Some("https://example.com/a".into()),
            "Teams that start from the business problem ship faster.",
        )
    }

    fn analyzer(model: Arc<ScriptedModel>, n: usize) -> ContentAnalyzer {
        ContentAnalyzer::new(
            model,
            AnalyzerSettings {
                insights_per_article: n,
                ..AnalyzerSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn well_formed_reply_is_accepted_first_time() {
        let model = Arc::new(ScriptedModel::with_replies([Ok(insight_json("a", 3))]));
        let result = analyzer(model.clone(), 3).analyze(&article()).await.unwrap();

        assert_eq!(result.insights.len(), 3);
        assert_eq!(result.insights[0].as_str(), "a insight 1");
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn short_reply_triggers_one_corrective_retry() {
        let model = Arc::new(ScriptedModel::with_replies([
            Ok(insight_json("a", 2)),
            Ok(insight_json("a", 3)),
        ]));
        let result = analyzer(model.clone(), 3).analyze(&article()).await.unwrap();

        assert_eq!(result.insights.len(), 3);
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].prompt.contains("previous reply was rejected"));
        assert!(requests[1].prompt.contains("previous reply was rejected"));
    }

    #[tokio::test]
    async fn persistent_short_reply_fails_after_exactly_two_calls() {
        let model = Arc::new(ScriptedModel::with_replies([
            Ok(insight_json("a", 1)),
            Ok(insight_json("a", 2)),
            Ok(insight_json("a", 7)),
        ]));
        let error = analyzer(model.clone(), 7).analyze(&article()).await.unwrap_err();

        assert_eq!(
            error,
            AnalysisError::WrongInsightCount {
                article: ArticleIndex::FIRST,
                expected: 7,
                received: 2,
            }
        );
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn duplicates_do_not_count_towards_n() {
        let reply = r#"{"key_insights": ["Same point", "same   POINT", "Other point"], "themes": []}"#;
        let model = Arc::new(ScriptedModel::with_replies([
            Ok(reply.to_string()),
            Ok(reply.to_string()),
        ]));
        let error = analyzer(model, 3).analyze(&article()).await.unwrap_err();
        assert!(matches!(error, AnalysisError::WrongInsightCount { received: 2, .. }));
    }

    #[tokio::test]
    async fn surplus_insights_are_truncated_in_order() {
        let model = Arc::new(ScriptedModel::with_replies([Ok(insight_json("a", 9))]));
        let result = analyzer(model, 7).analyze(&article()).await.unwrap();
        assert_eq!(result.insights.len(), 7);
        assert_eq!(result.insights[6].as_str(), "a insight 7");
    }

    #[tokio::test]
    async fn model_failure_is_not_retried() {
        let model = Arc::new(ScriptedModel::with_replies([Err(LlmError::RateLimited {
            retry_after: None,
        })]));
        let error = analyzer(model.clone(), 3).analyze(&article()).await.unwrap_err();
        assert!(matches!(error, AnalysisError::Model { .. }));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(
            ScriptedModel::with_replies([Ok(insight_json("a", 3))]).with_delay(Duration::from_millis(200)),
        );
        let analyzer = ContentAnalyzer::new(
            model,
            AnalyzerSettings {
                insights_per_article: 3,
                timeout: Duration::from_millis(10),
                ..AnalyzerSettings::default()
            },
        );
        let error = analyzer.analyze(&article()).await.unwrap_err();
        assert!(matches!(
            error,
            AnalysisError::Model {
                source: LlmError::Timeout { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cached_analysis_calls_the_model_once() {
        let model = Arc::new(ScriptedModel::with_replies([Ok(insight_json("a", 3))]));
        let analyzer = analyzer(model.clone(), 3);
        let mut cache = InsightCache::new();

        let first = analyzer
            .analyze_cached(&mut cache, &article(), CACHE_SCHEMA_VERSION)
            .await
            .unwrap();
        let second = analyzer
            .analyze_cached(&mut cache, &article(), CACHE_SCHEMA_VERSION)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn raising_n_reanalyses_a_cached_article() {
        let model = Arc::new(ScriptedModel::with_replies([
            Ok(insight_json("a", 3)),
            Ok(insight_json("b", 5)),
        ]));
        let mut cache = InsightCache::new();

        let small = analyzer(model.clone(), 3)
            .analyze_cached(&mut cache, &article(), CACHE_SCHEMA_VERSION)
            .await
            .unwrap();
        let wider = analyzer(model.clone(), 5);
        assert!(!wider.is_cached(&cache, &article(), CACHE_SCHEMA_VERSION));
        let raised = wider
            .analyze_cached(&mut cache, &article(), CACHE_SCHEMA_VERSION)
            .await
            .unwrap();

        assert_eq!(small.insights.len(), 3);
        assert_eq!(raised.insights.len(), 5);
        assert_eq!(model.requests().len(), 2);
        assert!(wider.is_cached(&cache, &article(), CACHE_SCHEMA_VERSION));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fenced_json_is_understood() {
        let reply = "```json\n{\"key_insights\": [\"one\", \"two\"], \"themes\": [\"Data\"]}\n```";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.insights.len(), 2);
        assert_eq!(parsed.themes, vec!["Data".to_string()]);
    }

    #[test]
    fn bullet_lists_are_a_fallback() {
        let reply = "Key insights:\n- First idea\n2. Second idea\n3) Third idea\n\nThemes:\n* Leadership\n";
        let parsed = parse_reply(reply);
        assert_eq!(
            parsed
                .insights
                .iter()
                .map(Insight::as_str)
                .collect::<Vec<_>>(),
            vec!["First idea", "Second idea", "Third idea"]
        );
        assert_eq!(parsed.themes, vec!["Leadership".to_string()]);
    }
}
