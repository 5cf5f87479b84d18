//! Publisher: the only component that advances the rotation pointer.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    HistoryEntry, LengthRule, Post, PostReceipt, PostingClient, PostingError, PublishError,
    RotationBounds, RotationState,
};
use tracing::instrument;

/// Whether a publish reaches the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Post, then advance the rotation on confirmed success.
    Live,
    /// Validate only. No external call, no state change.
    DryRun,
}

/// What a successful publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published {
        receipt: PostReceipt,
        entry: HistoryEntry,
    },
    /// The post passed validation and would have been sent.
    DryRun { post: Post },
}

/// Validates posts, sends them, and records confirmed publications.
#[derive(Clone)]
pub struct Publisher {
    client: Arc<dyn PostingClient>,
    length: LengthRule,
    timeout: Duration,
}

impl Publisher {
    pub fn new(client: Arc<dyn PostingClient>, length: LengthRule, timeout: Duration) -> Self {
        Self {
            client,
            length,
            timeout,
        }
    }

    /// Publishes `post` as the next pair of `state`.
    ///
    /// On any error `state` is exactly as it was before the call. In
    /// [`PublishMode::DryRun`] `state` is never modified.
    ///
    /// # Errors
    ///
    /// - [`PublishError::Invalid`] if the post is empty, too long, or not the
    ///   pair the rotation expects next; nothing is sent.
    /// - [`PublishError::Platform`] if the platform did not confirm the post.
    #[instrument(skip_all, fields(article = %post.article, variation = %post.variation, ?mode))]
    pub async fn publish(
        &self,
        post: &Post,
        state: &mut RotationState,
        bounds: RotationBounds,
        mode: PublishMode,
    ) -> Result<PublishOutcome, PublishError> {
        self.validate(post, state, bounds)?;

        if mode == PublishMode::DryRun {
            tracing::info!("dry run; post not sent");
            return Ok(PublishOutcome::DryRun { post: post.clone() });
        }

        let receipt = match tokio::time::timeout(self.timeout, self.client.post(&post.text)).await {
            Ok(result) => result,
            Err(_) => Err(PostingError::Timeout {
                after: self.timeout,
            }),
        }
        .map_err(|source| {
            tracing::error!(error = %source, "post not confirmed; rotation unchanged");
            PublishError::Platform {
                article: post.article,
                variation: post.variation,
                source,
            }
        })?;

        let entry = state
            .record_publication(bounds, receipt.post_id.clone(), receipt.posted_at, &post.text)
            .map_err(|error| self.invalid(post, error.to_string()))?;

        tracing::info!(post_id = %receipt.post_id, "post published");
        Ok(PublishOutcome::Published { receipt, entry })
    }

    fn validate(
        &self,
        post: &Post,
        state: &RotationState,
        bounds: RotationBounds,
    ) -> Result<(), PublishError> {
        if post.text.trim().is_empty() {
            return Err(self.invalid(post, "post text is empty".to_string()));
        }

        let length = self.length.measure(&post.text);
        if length > self.length.limit {
            return Err(self.invalid(
                post,
                format!("{length} characters exceeds the {} limit", self.length.limit),
            ));
        }

        let expected = state
            .peek(bounds)
            .map_err(|error| self.invalid(post, error.to_string()))?;
        if (expected.article, expected.variation) != (post.article, post.variation) {
            return Err(self.invalid(
                post,
                format!("rotation expects {expected} next"),
            ));
        }
        Ok(())
    }

    fn invalid(&self, post: &Post, reason: String) -> PublishError {
        PublishError::Invalid {
            article: post.article,
            variation: post.variation,
            reason,
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("length", &self.length)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
