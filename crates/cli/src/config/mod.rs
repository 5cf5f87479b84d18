//! Layered configuration loading.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`CADENCE_*` prefix, `__` as separator)
//! 2. Raw secrets `ANTHROPIC_API_KEY` and `X_BEARER_TOKEN`
//! 3. The file passed with `--config`
//! 4. Project-level `cadence.toml`
//! 5. User-level `~/.config/cadence/config.toml`
//! 6. Built-in defaults
//!
//! Figment maps `CADENCE_SOCIAL__ENABLE_POSTING` to `social.enable_posting`,
//! `CADENCE_SCHEDULE__WEEKDAY` to `schedule.weekday`, and so on.

mod error;
mod sections;

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Weekday};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use nodes::{AnalyzerSettings, ComposerSettings, HashtagPolicy, ThemeRule};
use pipeline::{DocumentId, LengthRule, PostingCadence};
use serde::{Deserialize, Serialize};

pub use error::ConfigError;
pub use sections::{
    ComposerConfig, DocumentConfig, LlmConfig, LogFormat, PathsConfig, RotationConfig,
    ScheduleConfig, SocialConfig, SourceKind, TelemetryConfig,
};

pub const PROJECT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub social: SocialConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl CadenceConfig {
    /// Loads and validates configuration from every source.
    ///
    /// Does not read `.env`; see [`Self::load_with_dotenv`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    path: path.to_path_buf(),
                });
            }
        }
        let config: Self = Self::figment(explicit).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.env` from the current directory, then [`Self::load`].
    pub fn load_with_dotenv(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load(explicit)
    }

    /// Builds the provider chain without extracting it.
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
        if project_path.exists() {
            figment = figment.merge(Toml::file(project_path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(
                Env::raw()
                    .only(&["ANTHROPIC_API_KEY"])
                    .map(|_| "llm.api_key".into()),
            )
            .merge(
                Env::raw()
                    .only(&["X_BEARER_TOKEN"])
                    .map(|_| "social.bearer_token".into()),
            )
            .merge(Env::prefixed("CADENCE_").split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cadence").join("config.toml"))
    }

    /// Checks every value that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let variations = self.variations_per_article()?;
        if self.rotation.insights_per_article < variations.get() as usize {
            return Err(ConfigError::invalid(
                "rotation.insights_per_article",
                format!(
                    "{} insights cannot give {} variations a distinct angle each",
                    self.rotation.insights_per_article, variations
                ),
            ));
        }
        if self.rotation.max_body_chars == 0 {
            return Err(ConfigError::invalid("rotation.max_body_chars", "must be positive"));
        }
        self.length_rule()?;
        self.cadence()?;
        self.document_id()?;
        if self.schedule.default_weeks == 0 {
            return Err(ConfigError::invalid("schedule.default_weeks", "must be positive"));
        }
        for (field, secs) in [
            ("document.timeout_secs", self.document.timeout_secs),
            ("composer.timeout_secs", self.composer.timeout_secs),
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("social.timeout_secs", self.social.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        Ok(())
    }

    pub fn variations_per_article(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.rotation.variations_per_article)
            .ok_or_else(|| ConfigError::invalid("rotation.variations_per_article", "must be positive"))
    }

    pub fn document_id(&self) -> Result<DocumentId, ConfigError> {
        DocumentId::new(self.document.id.trim())
            .ok_or_else(|| ConfigError::invalid("document.id", "must not be empty"))
    }

    pub fn length_rule(&self) -> Result<LengthRule, ConfigError> {
        if self.composer.url_weight >= self.composer.char_limit {
            return Err(ConfigError::invalid(
                "composer.url_weight",
                format!("must be below the character limit {}", self.composer.char_limit),
            ));
        }
        LengthRule::new(self.composer.char_limit, self.composer.url_weight)
            .ok_or_else(|| ConfigError::invalid("composer.char_limit", "must be positive"))
    }

    pub fn cadence(&self) -> Result<PostingCadence, ConfigError> {
        let weekday: Weekday = self.schedule.weekday.trim().parse().map_err(|_| {
            ConfigError::invalid(
                "schedule.weekday",
                format!("'{}' is not a weekday name", self.schedule.weekday),
            )
        })?;
        let time = NaiveTime::parse_from_str(self.schedule.time.trim(), "%H:%M").map_err(|e| {
            ConfigError::invalid("schedule.time", format!("'{}': {e}", self.schedule.time))
        })?;
        let offset = parse_utc_offset(&self.schedule.utc_offset).ok_or_else(|| {
            ConfigError::invalid(
                "schedule.utc_offset",
                format!("'{}' is not of the form +HH:MM", self.schedule.utc_offset),
            )
        })?;
        PostingCadence::new(weekday, time, offset, self.schedule.interval_days)
            .ok_or_else(|| ConfigError::invalid("schedule.interval_days", "must be positive"))
    }

    /// Fails unless an API key is available. Only commands that call the
    /// model need one.
    pub fn require_llm(&self) -> Result<(), ConfigError> {
        if self.llm.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::NotConfigured {
                section: "llm".to_string(),
                hint: "set ANTHROPIC_API_KEY or llm.api_key".to_string(),
            })
        }
    }

    /// Fails unless a bearer token is available while posting is enabled.
    pub fn require_social(&self) -> Result<(), ConfigError> {
        if !self.social.enable_posting || self.social.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::NotConfigured {
                section: "social".to_string(),
                hint: "set X_BEARER_TOKEN or social.bearer_token, or disable social.enable_posting"
                    .to_string(),
            })
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            insights_per_article: self.rotation.insights_per_article,
            max_body_chars: self.rotation.max_body_chars,
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }

    pub fn composer_settings(&self) -> Result<ComposerSettings, ConfigError> {
        let composer = &self.composer;
        Ok(ComposerSettings {
            length: self.length_rule()?,
            hashtags: HashtagPolicy {
                fixed: composer.fixed_hashtags.clone(),
                rules: composer
                    .theme_hashtags
                    .iter()
                    .map(|theme| ThemeRule {
                        keywords: theme.keywords.clone(),
                        tag: theme.tag.clone(),
                    })
                    .collect(),
                fallback: composer.fallback_hashtag.clone(),
                max_hashtags: composer.max_hashtags,
            },
            max_tokens: composer.max_tokens,
            temperature: composer.temperature,
            timeout: Duration::from_secs(composer.timeout_secs),
        })
    }
}

/// Parses `Z`, `UTC`, `+HH:MM`, or `-HH:MM`.
fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
