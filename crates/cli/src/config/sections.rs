//! Configuration sections and their defaults.

use std::path::PathBuf;

use nodes::HashtagPolicy;
use serde::{Deserialize, Serialize};

/// Google Docs plain-text export; `{id}` is the document identifier.
pub const DEFAULT_EXPORT_URL: &str = "https://docs.google.com/document/d/{id}/export?format=txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `document.id` is a path on disk.
    #[default]
    File,
    /// `document.id` is substituted into `document.url_template`.
    Http,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub kind: SourceKind,
    pub id: String,
    /// Relative file paths resolve against this directory.
    pub base_dir: Option<PathBuf>,
    pub url_template: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::File,
            id: "newsletter.txt".to_string(),
            base_dir: None,
            url_template: DEFAULT_EXPORT_URL.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for DocumentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentConfig")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("base_dir", &self.base_dir)
            .field("url_template", &self.url_template)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RotationConfig {
    /// V: posts written from each article.
    pub variations_per_article: u32,
    /// N: insights extracted from each article. Must be at least V.
    pub insights_per_article: usize,
    /// Bump to invalidate every cached analysis.
    pub cache_schema_version: u32,
    /// Article text beyond this many characters is not sent for analysis.
    pub max_body_chars: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            variations_per_article: 4,
            insights_per_article: 7,
            cache_schema_version: pipeline::CACHE_SCHEMA_VERSION,
            max_body_chars: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThemeHashtag {
    pub keywords: Vec<String>,
    pub tag: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub char_limit: usize,
    /// Length every link counts as, whatever its real length.
    pub url_weight: usize,
    pub fixed_hashtags: Vec<String>,
    /// Checked in order against the analysed themes; the first match wins.
    pub theme_hashtags: Vec<ThemeHashtag>,
    pub fallback_hashtag: Option<String>,
    pub max_hashtags: usize,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        let hashtags = HashtagPolicy::default();
        Self {
            char_limit: 280,
            url_weight: 23,
            fixed_hashtags: hashtags.fixed,
            theme_hashtags: hashtags
                .rules
                .into_iter()
                .map(|rule| ThemeHashtag {
                    keywords: rule.keywords,
                    tag: rule.tag,
                })
                .collect(),
            fallback_hashtag: hashtags.fallback,
            max_hashtags: hashtags.max_hashtags,
            max_tokens: 400,
            temperature: Some(0.7),
            timeout_secs: 60,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Also read from `ANTHROPIC_API_KEY`.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Token budget for one analysis reply.
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            max_tokens: 1500,
            temperature: Some(0.3),
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Also read from `X_BEARER_TOKEN`.
    pub bearer_token: String,
    pub base_url: String,
    /// When false, `commit` validates the post but does not send it.
    pub enable_posting: bool,
    pub timeout_secs: u64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            base_url: social::DEFAULT_BASE_URL.to_string(),
            enable_posting: false,
            timeout_secs: 30,
        }
    }
}

impl SocialConfig {
    pub fn is_configured(&self) -> bool {
        !self.bearer_token.trim().is_empty()
    }
}

impl std::fmt::Debug for SocialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialConfig")
            .field("bearer_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("enable_posting", &self.enable_posting)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// English weekday name, e.g. `thursday` or `thu`.
    pub weekday: String,
    /// `HH:MM`, 24-hour.
    pub time: String,
    /// `+HH:MM`, `-HH:MM`, or `Z`.
    pub utc_offset: String,
    pub interval_days: u32,
    /// Weeks planned when `plan` is run without `--weeks`.
    pub default_weeks: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday: "thursday".to_string(),
            time: "11:30".to_string(),
            utc_offset: "-05:00".to_string(),
            interval_days: 7,
            default_weeks: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_file: PathBuf,
    pub schedule_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("cadence-state.json"),
            schedule_dir: PathBuf::from("schedules"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// gRPC endpoint of an OTLP collector. Spans are only exported when set.
    pub otlp_endpoint: Option<String>,
    pub log_format: LogFormat,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_format: LogFormat::Pretty,
            service_name: "cadence".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composer_defaults_mirror_the_hashtag_policy() {
        let config = ComposerConfig::default();
        let policy = HashtagPolicy::default();

        assert_eq!(config.fixed_hashtags, policy.fixed);
        assert_eq!(config.theme_hashtags.len(), policy.rules.len());
        assert_eq!(config.fallback_hashtag, policy.fallback);
        assert_eq!(config.char_limit, 280);
        assert_eq!(config.url_weight, 23);
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let llm = LlmConfig {
            api_key: "sk-ant-secret".to_string(),
            ..LlmConfig::default()
        };
        let social = SocialConfig {
            bearer_token: "x-secret".to_string(),
            ..SocialConfig::default()
        };

        assert!(!format!("{llm:?}").contains("secret"));
        assert!(!format!("{social:?}").contains("secret"));
        assert!(llm.is_configured());
        assert!(!SocialConfig::default().is_configured());
    }
}
