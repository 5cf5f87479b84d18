//! Cadence posting adapter.
//!
//! Implements [`pipeline::PostingClient`] for the X API v2 (`POST /2/tweets`)
//! with a user-context bearer token.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Character
//! limits and rotation bookkeeping are enforced upstream by the Publisher; here
//! the only job is to send the text and translate the platform's answer into a
//! [`pipeline::PostReceipt`] or a [`pipeline::PostingError`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline::{PostId, PostReceipt, PostingClient, PostingError, Timestamp};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

pub const DEFAULT_BASE_URL: &str = "https://api.x.com";

/// Connection settings for [`XClient`].
#[derive(Clone)]
pub struct XSettings {
    pub bearer_token: String,
    /// Scheme and host; `/2/tweets` is appended.
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for XSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XSettings")
            .field("bearer_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// X API v2 client.
pub struct XClient {
    client: Client,
    settings: XSettings,
    endpoint: String,
}

impl XClient {
    /// # Errors
    ///
    /// [`PostingError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(settings: XSettings) -> Result<Self, PostingError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PostingError::Unavailable {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let endpoint = format!("{}/2/tweets", settings.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            settings,
            endpoint,
        })
    }
}

#[derive(Deserialize)]
struct CreateResponse {
    data: Option<CreatedPost>,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: String,
}

/// Problem body returned on failures.
#[derive(Deserialize, Default)]
struct Problem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl Problem {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn message(self, status: StatusCode, raw: &str) -> String {
        match (self.title, self.detail) {
            (_, Some(detail)) => detail,
            (Some(title), None) => title,
            (None, None) if !raw.trim().is_empty() => raw.trim().to_string(),
            (None, None) => format!("HTTP {}", status.as_u16()),
        }
    }
}

/// Seconds until the `x-rate-limit-reset` epoch, if the header is present.
fn reset_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let reset = headers
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    let seconds = (reset - now.timestamp()).max(0);
    Some(Duration::from_secs(seconds.unsigned_abs()))
}

fn classify(status: StatusCode, message: String) -> PostingError {
    match status {
        StatusCode::UNAUTHORIZED => PostingError::AuthDenied { message },
        // 403 is used both for missing write scope and for duplicate content.
        StatusCode::FORBIDDEN if message.to_lowercase().contains("duplicate") => {
            PostingError::ContentRejected { message }
        }
        StatusCode::FORBIDDEN => PostingError::AuthDenied { message },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PostingError::ContentRejected { message }
        }
        _ => PostingError::Unavailable {
            message: format!("HTTP {}: {message}", status.as_u16()),
        },
    }
}

#[async_trait]
impl PostingClient for XClient {
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    async fn post(&self, text: &str) -> Result<PostReceipt, PostingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.bearer_token)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PostingError::Timeout {
                        after: self.settings.timeout,
                    }
                } else {
                    PostingError::Unavailable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = reset_delay(response.headers(), Utc::now());
            tracing::warn!(?retry_after, "posting rate limited");
            return Err(PostingError::RateLimited { retry_after });
        }
        let body = response.text().await.map_err(|e| PostingError::Unavailable {
            message: format!("failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            let message = Problem::parse(&body).message(status, &body);
            let error = classify(status, message);
            tracing::warn!(status = status.as_u16(), error = %error, "post rejected");
            return Err(error);
        }

        let created: CreateResponse =
            serde_json::from_str(&body).map_err(|e| PostingError::Unavailable {
                message: format!("unexpected response body: {e}"),
            })?;
        let post_id = created
            .data
            .and_then(|data| PostId::new(data.id))
            .ok_or_else(|| PostingError::Unavailable {
                message: "response did not contain a post id".to_string(),
            })?;

        tracing::info!(post_id = %post_id, "post published");
        Ok(PostReceipt {
            post_id,
            posted_at: Timestamp::now(),
        })
    }
}
