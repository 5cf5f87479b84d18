use std::time::Duration;

use async_trait::async_trait;
use pipeline::{DocumentId, DocumentSource, SourceError, SourceFailure};
use reqwest::{Client, StatusCode};
use tracing::instrument;

/// Placeholder replaced by the document identifier.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Clone)]
pub struct HttpSourceSettings {
    /// URL with an `{id}` placeholder. Without one the identifier is ignored
    /// and the URL is fetched as-is.
    pub url_template: String,
    /// Optional bearer token for private exports.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpSourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSourceSettings")
            .field("url_template", &self.url_template)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Downloads the newsletter as plain text over HTTP(S).
pub struct HttpDocumentSource {
    client: Client,
    settings: HttpSourceSettings,
}

impl HttpDocumentSource {
    /// # Errors
    ///
    /// A [`SourceError`] naming the template if the HTTP client cannot be built.
    pub fn new(settings: HttpSourceSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SourceError {
                document: settings.url_template.clone(),
                failure: SourceFailure::Other(format!("failed to build HTTP client: {e}")),
            })?;
        Ok(Self { client, settings })
    }

    fn url_for(&self, document: &DocumentId) -> String {
        self.settings
            .url_template
            .replace(ID_PLACEHOLDER, document.as_str())
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    #[instrument(skip(self), fields(document = %document))]
    async fn fetch(&self, document: &DocumentId) -> Result<String, SourceError> {
        let url = self.url_for(document);
        let unavailable = |failure| SourceError {
            document: document.to_string(),
            failure,
        };

        let mut request = self.client.get(&url);
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| unavailable(SourceFailure::Other(e.to_string())))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(unavailable(SourceFailure::NotFound))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(unavailable(SourceFailure::PermissionDenied))
            }
            s if !s.is_success() => {
                return Err(unavailable(SourceFailure::Other(format!(
                    "HTTP {}",
                    s.as_u16()
                ))))
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|e| unavailable(SourceFailure::Other(e.to_string())))?;
        tracing::debug!(bytes = text.len(), "document downloaded");
        Ok(crate::strip_bom(text))
    }
}
