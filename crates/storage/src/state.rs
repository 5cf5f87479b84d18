use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{RotationState, StateError, StateStore};
use tracing::instrument;

/// Rotation state persisted as one JSON document.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
    variations_per_article: u32,
}

impl JsonStateStore {
    /// `variations_per_article` is the V the loaded pointer is validated against.
    pub fn new(path: impl Into<PathBuf>, variations_per_article: u32) -> Self {
        Self {
            path: path.into(),
            variations_per_article,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupted(&self, reason: impl Into<String>) -> StateError {
        StateError::Corrupted {
            location: self.location(),
            reason: reason.into(),
        }
    }

    fn io(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            location: self.location(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<RotationState, StateError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no state file yet, starting a fresh rotation");
                return Ok(RotationState::new());
            }
            Err(e) => return Err(self.io(e)),
        };

        // Saves are atomic, so an empty file was not written by us.
        if content.trim().is_empty() {
            return Err(self.corrupted("file is empty"));
        }

        let state: RotationState =
            serde_json::from_str(&content).map_err(|e| self.corrupted(e.to_string()))?;
        state
            .validate(self.variations_per_article)
            .map_err(|reason| self.corrupted(reason))?;

        tracing::debug!(
            position = %state.cursor().position(),
            total_posted = state.total_posted(),
            "state loaded"
        );
        Ok(state)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn save(&self, state: &RotationState) -> Result<(), StateError> {
        let mut contents = serde_json::to_vec_pretty(state)
            .map_err(|e| self.io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        contents.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || crate::replace_atomically(&path, &contents))
            .await
            .map_err(|e| self.io(std::io::Error::other(e)))?
            .map_err(|e| self.io(e))?;

        tracing::debug!(position = %state.cursor().position(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{
        Article, ArticleIndex, ArticleInsights, Insight, PostId, RotationBounds, Timestamp,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn populated_state() -> RotationState {
        let bounds = RotationBounds::new(2, 4).unwrap();
        let mut state = RotationState::new();
        let posted_at = Timestamp::from_utc(
            chrono::DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        );
        state
            .record_publication(bounds, PostId::new("p-1").unwrap(), posted_at, "first post")
            .unwrap();

        let article = Article::new(ArticleIndex::FIRST, Some(1), "Title", None, "Body text");
        state.insights_mut().insert(
            &article,
            1,
            1,
            ArticleInsights {
                insights: vec![Insight::new("One insight").unwrap()],
                themes: vec!["governance".to_string()],
            },
        );
        state
    }

    #[tokio::test]
    async fn missing_file_loads_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"), 4);

        assert_eq!(store.load().await.unwrap(), RotationState::new());
    }

    #[tokio::test]
    async fn save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested/state.json"), 4);
        let state = populated_state();

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);

        let first = std::fs::read(store.path()).unwrap();
        store.save(&loaded).await.unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), first);
    }

    #[tokio::test]
    async fn save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"), 4);

        store.save(&RotationState::new()).await.unwrap();
        store.save(&populated_state()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn invalid_json_is_corrupted_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"schema_version\": 1, \"current_article_index\": ").unwrap();

        let error = JsonStateStore::new(&path, 4).load().await.unwrap_err();
        assert!(matches!(error, StateError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "  \n").unwrap();

        let error = JsonStateStore::new(&path, 4).load().await.unwrap_err();
        assert!(matches!(error, StateError::Corrupted { reason, .. } if reason.contains("empty")));
    }

    #[tokio::test]
    async fn pointer_outside_configured_variations_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = RotationState::new();
        let bounds = RotationBounds::new(3, 4).unwrap();
        for n in 0..3 {
            state
                .record_publication(bounds, PostId::new(format!("p-{n}")).unwrap(), Timestamp::now(), "t")
                .unwrap();
        }
        JsonStateStore::new(&path, 4).save(&state).await.unwrap();

        // The same file read with V = 2 has variation 3 at the pointer.
        let error = JsonStateStore::new(&path, 2).load().await.unwrap_err();
        assert!(matches!(error, StateError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut value = serde_json::to_value(RotationState::new()).unwrap();
        value["surprise"] = serde_json::json!(true);
        std::fs::write(&path, value.to_string()).unwrap();

        let error = JsonStateStore::new(&path, 4).load().await.unwrap_err();
        assert!(matches!(error, StateError::Corrupted { .. }));
    }
}
