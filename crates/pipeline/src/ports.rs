//! Port traits implemented by the infrastructure crates.
//!
//! The domain never performs I/O itself. Every external collaborator is
//! reached through one of these traits, held as `Arc<dyn Trait>` by the
//! orchestration layer, and replaced by scripted doubles in tests.

use async_trait::async_trait;

use crate::{
    DocumentId, LlmError, PostReceipt, PostingError, RotationState, SourceError, StateError,
};

/// One request to a language model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Standing instruction for the model.
    pub system: String,
    /// The task itself.
    pub prompt: String,
    /// Upper bound on the length of the reply, in model tokens.
    pub max_tokens: u32,
    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text completion. Treated as a black box with a request/response contract.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Returns the model's reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Publication to the social platform.
#[async_trait]
pub trait PostingClient: Send + Sync {
    /// Publishes `text` and returns the platform's confirmation.
    ///
    /// A returned receipt is the only evidence of success the core accepts.
    async fn post(&self, text: &str) -> Result<PostReceipt, PostingError>;
}

/// Retrieval of the raw newsletter text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, document: &DocumentId) -> Result<String, SourceError>;
}

/// Durable storage of the rotation singleton.
///
/// `save` must replace the stored state atomically: after an interruption the
/// store holds either the previous state or the new one, never a mix.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Human-readable location, used in error messages.
    fn location(&self) -> String;

    /// Loads the stored state, or a fresh one if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// [`StateError::Corrupted`] if something is stored but fails validation.
    /// Implementations never fall back to a fresh state in that case.
    async fn load(&self) -> Result<RotationState, StateError>;

    async fn save(&self, state: &RotationState) -> Result<(), StateError>;
}
