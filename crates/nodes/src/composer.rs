//! Variation Composer: one post per (article, insight) pair.
//!
//! Variation `i` is always built from insight `i`, so the V variations of an
//! article use V different insights. The model writes only the post body; the
//! article link and hashtags are appended here and counted against the limit
//! before the body budget is handed to the model.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    Article, ArticleInsights, CompletionRequest, CompositionError, Insight, LanguageModel,
    LengthRule, Post, Timestamp, VariationIndex,
};
use tracing::instrument;

use crate::retry::{with_corrective_retry, Attempt, Failure};
use crate::style;

/// Standing instruction for every composition request.
pub const COMPOSER_SYSTEM: &str = "You write concise, professional social posts about AI, data \
strategy, and business technology. Each post centres one strategic insight and stands on its own. \
Use active voice, no contractions, at most one emoji, and no hashtags or links. Never mention the \
article or its title. Reply with the post text only.";

/// Angle suggested to the model for each variation, by variation index.
const FOCUS_ANGLES: [&str; 4] = [
    "strategic value",
    "systematic approach",
    "practical application",
    "expert perspective",
];

/// Titles with fewer words than this are too generic to count as quoted.
const MIN_QUOTABLE_TITLE_WORDS: usize = 2;

// ---------------------------------------------------------------------------
// Hashtags
// ---------------------------------------------------------------------------

/// Adds `tag` when any keyword appears as a whole word in the article themes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRule {
    pub keywords: Vec<String>,
    pub tag: String,
}

impl ThemeRule {
    pub fn new(keywords: &[&str], tag: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            tag: tag.to_string(),
        }
    }
}

/// How hashtags are chosen for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagPolicy {
    /// Always present, in this order.
    pub fixed: Vec<String>,
    /// Checked in order; the first match contributes one tag.
    pub rules: Vec<ThemeRule>,
    /// Used when no rule matches.
    pub fallback: Option<String>,
    pub max_hashtags: usize,
}

impl Default for HashtagPolicy {
    fn default() -> Self {
        Self {
            fixed: vec!["#AI".to_string()],
            rules: vec![
                ThemeRule::new(&["machine learning", "ml"], "#MachineLearning"),
                ThemeRule::new(&["leadership", "management"], "#Leadership"),
                ThemeRule::new(&["generative", "gpt", "genai"], "#GenerativeAI"),
                ThemeRule::new(&["analytics"], "#DataAnalytics"),
                ThemeRule::new(&["transformation", "transform"], "#DigitalTransformation"),
                ThemeRule::new(&["data", "strategy"], "#DataStrategy"),
            ],
            fallback: Some("#DataStrategy".to_string()),
            max_hashtags: 2,
        }
    }
}

impl HashtagPolicy {
    /// Fixed tags plus at most one theme-matched tag, capped at `max_hashtags`.
    pub fn select(&self, themes: &[String]) -> Vec<String> {
        let haystack = format!(
            " {} ",
            themes
                .iter()
                .flat_map(|t| t.split(|c: char| !c.is_alphanumeric()))
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" ")
        );

        let themed = self
            .rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|k| haystack.contains(&format!(" {} ", k.to_lowercase())))
            })
            .map(|rule| rule.tag.clone())
            .or_else(|| self.fallback.clone());

        let mut tags = self.fixed.clone();
        if let Some(tag) = themed {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                tags.push(tag);
            }
        }
        tags.truncate(self.max_hashtags);
        tags
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Tuning for [`VariationComposer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub length: LengthRule,
    pub hashtags: HashtagPolicy,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            length: LengthRule::default(),
            hashtags: HashtagPolicy::default(),
            max_tokens: 400,
            temperature: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Writes one post for one variation of one article.
#[derive(Clone)]
pub struct VariationComposer {
    model: Arc<dyn LanguageModel>,
    settings: ComposerSettings,
}

impl VariationComposer {
    pub fn new(model: Arc<dyn LanguageModel>, settings: ComposerSettings) -> Self {
        Self { model, settings }
    }

    pub fn length_rule(&self) -> LengthRule {
        self.settings.length
    }

    /// Composes variation `variation` of `article` from insight `variation`.
    ///
    /// The returned post always fits the length rule and never contains the
    /// article title. Over-long or title-quoting replies get one corrective
    /// retry; they are never truncated.
    ///
    /// # Errors
    ///
    /// - [`CompositionError::MissingInsight`] if there is no insight for this variation.
    /// - [`CompositionError::NoBudget`] if link and hashtags leave no room for text.
    /// - [`CompositionError::OverLimit`], [`CompositionError::TitleQuoted`],
    ///   [`CompositionError::Empty`] if the corrective reply still fails the check.
    /// - [`CompositionError::Model`] if the model call fails or times out.
    #[instrument(skip_all, fields(article = %article.index, variation = %variation))]
    pub async fn compose(
        &self,
        article: &Article,
        analysis: &ArticleInsights,
        variation: VariationIndex,
    ) -> Result<Post, CompositionError> {
        let insight = analysis.insights.get(variation.offset()).ok_or(
            CompositionError::MissingInsight {
                article: article.index,
                variation,
                available: analysis.insights.len(),
            },
        )?;

        let hashtags = self.settings.hashtags.select(&analysis.themes);
        let rule = self.settings.length;
        let overhead = rule.measure(&assemble("", article.url.as_deref(), &hashtags));
        let budget = rule
            .limit
            .checked_sub(overhead)
            .filter(|b| *b > 0)
            .ok_or(CompositionError::NoBudget {
                article: article.index,
                variation,
            })?;

        with_corrective_retry("compose", |attempt| {
            let request = self.request(insight, variation, budget, &attempt);
            let hashtags = &hashtags;
            async move {
                let reply = crate::complete_within(self.model.as_ref(), &request, self.settings.timeout)
                    .await
                    .map_err(|source| {
                        Failure::Fatal(CompositionError::Model {
                            article: article.index,
                            variation,
                            source,
                        })
                    })?;

                let styled = style::apply(&reply);
                for warning in &styled.warnings {
                    tracing::debug!(%warning, "style checklist");
                }
                let body = styled.text;

                if body.is_empty() {
                    return Err(Failure::Correctable {
                        error: CompositionError::Empty {
                            article: article.index,
                            variation,
                        },
                        feedback: "the reply was empty".to_string(),
                    });
                }
                if quotes_title(&body, &article.title) {
                    return Err(Failure::Correctable {
                        error: CompositionError::TitleQuoted {
                            article: article.index,
                            variation,
                        },
                        feedback: "the post repeated the article title; express the insight in new words"
                            .to_string(),
                    });
                }

                let text = assemble(&body, article.url.as_deref(), hashtags);
                let length = rule.measure(&text);
                if length > rule.limit {
                    let body_length = rule.measure(&body);
                    return Err(Failure::Correctable {
                        error: CompositionError::OverLimit {
                            article: article.index,
                            variation,
                            length,
                            limit: rule.limit,
                        },
                        feedback: format!(
                            "the post was {body_length} characters but must be at most {budget}; shorten it"
                        ),
                    });
                }

                tracing::info!(length, budget, corrective = attempt.is_corrective(), "post composed");
                Ok(Post {
                    article: article.index,
                    variation,
                    text,
                    insight: insight.clone(),
                    created_at: Timestamp::now(),
                })
            }
        })
        .await
    }

    fn request(
        &self,
        insight: &Insight,
        variation: VariationIndex,
        budget: usize,
        attempt: &Attempt,
    ) -> CompletionRequest {
        let angle = FOCUS_ANGLES
            .get(variation.offset())
            .copied()
            .unwrap_or("general");

        let mut prompt = format!(
            "Write one post that highlights this insight:\n{insight}\n\n\
             Angle: {angle}.\n\
             Maximum length: {budget} characters, strictly enforced.\n\
             Start with a strong hook and cut every filler word."
        );
        if let Attempt::Corrective { feedback } = attempt {
            prompt.push_str(&format!(
                "\n\nYour previous draft was rejected: {feedback}. Write a new draft of at most \
                 {budget} characters."
            ));
        }

        let request = CompletionRequest::new(COMPOSER_SYSTEM, prompt, self.settings.max_tokens);
        match self.settings.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

impl std::fmt::Debug for VariationComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariationComposer")
            .field("model", &self.model.model())
            .field("settings", &self.settings)
            .finish()
    }
}

/// `body`, then the link, then the hashtags, separated by blank lines.
pub fn assemble(body: &str, url: Option<&str>, hashtags: &[String]) -> String {
    let mut parts = vec![body.to_string()];
    if let Some(url) = url {
        parts.push(url.to_string());
    }
    if !hashtags.is_empty() {
        parts.push(hashtags.join(" "));
    }
    parts.join("\n\n")
}

fn quotes_title(body: &str, title: &str) -> bool {
    let normalise = |s: &str| {
        s.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let title = normalise(title);
    if title.split(' ').count() < MIN_QUOTABLE_TITLE_WORDS {
        return false;
    }
    normalise(body).contains(&title)
}
