//! Scripted test doubles for the port traits.
//!
//! Every double records what it was asked so tests can assert on retries and
//! on the absence of external calls.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    CompletionRequest, DocumentId, DocumentSource, LanguageModel, LlmError, PostId, PostReceipt,
    PostingClient, PostingError, RotationState, SourceError, SourceFailure, StateError,
    StateStore, Timestamp,
};

use crate::analyzer::ANALYZER_SYSTEM;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Language model that replays a script or answers through a closure.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn with_replies(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_responder(
        responder: impl Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A model that analyses with `n` insights and composes a short post
    /// naming the insight it was given.
    pub fn well_behaved(n: usize) -> Self {
        Self::with_responder(move |request| {
            if request.system == ANALYZER_SYSTEM {
                Ok(insight_json("article", n))
            } else {
                let insight = request
                    .prompt
                    .lines()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                Ok(format!("Post about {insight}"))
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn analysis_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.system == ANALYZER_SYSTEM)
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(responder) = &self.responder {
            return responder(request);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable {
                message: "script exhausted".to_string(),
            }))
    }
}

/// JSON analysis reply with `n` insights named `"{prefix} insight {i}"`.
pub fn insight_json(prefix: &str, n: usize) -> String {
    let insights: Vec<String> = (1..=n).map(|i| format!("{prefix} insight {i}")).collect();
    serde_json::json!({ "key_insights": insights, "themes": ["Data strategy"] }).to_string()
}

/// Posting client that succeeds or fails according to a script.
pub struct ScriptedPoster {
    failure: Mutex<Option<PostingError>>,
    posted: Mutex<Vec<String>>,
}

impl ScriptedPoster {
    pub fn succeeding() -> Self {
        Self {
            failure: Mutex::new(None),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: PostingError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostingClient for ScriptedPoster {
    async fn post(&self, text: &str) -> Result<PostReceipt, PostingError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push(text.to_string());
        Ok(PostReceipt {
            post_id: PostId::new(format!("post-{}", posted.len())).unwrap(),
            posted_at: Timestamp::now(),
        })
    }
}

/// Document source serving one fixed text.
pub struct StaticSource(pub String);

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch(&self, document: &DocumentId) -> Result<String, SourceError> {
        if self.0.is_empty() {
            return Err(SourceError {
                document: document.to_string(),
                failure: SourceFailure::NotFound,
            });
        }
        Ok(self.0.clone())
    }
}

/// State store held in memory. Counts saves.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<RotationState>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn current(&self) -> Option<RotationState> {
        self.state.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<RotationState, StateError> {
        Ok(self.state.lock().unwrap().clone().unwrap_or_default())
    }

    async fn save(&self, state: &RotationState) -> Result<(), StateError> {
        *self.state.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// A document with `n` well-formed articles.
pub fn document(n: usize) -> String {
    (1..=n)
        .map(|i| {
            format!(
                "Article #{i}\nArticle #{i} Title: Topic number {i}\nArticle #{i} URL: https://example.com/{i}\n\nBody of article {i}.\n"
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
