use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use pipeline::{Post, Schedule};
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

pub const SCHEDULE_JSON: &str = "schedule.json";
pub const SCHEDULE_MARKDOWN: &str = "schedule.md";

#[derive(Debug, Error)]
pub enum ScheduleWriteError {
    #[error("failed to serialise schedule: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a schedule was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFiles {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Writes planned schedules into one output directory.
///
/// Schedules are write-only artifacts for human review; nothing reads them back.
#[derive(Debug, Clone)]
pub struct ScheduleWriter {
    dir: PathBuf,
}

impl ScheduleWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes both files, replacing earlier ones.
    ///
    /// `note` is appended to the Markdown file; the planner uses it to record
    /// why a plan stopped early.
    ///
    /// # Errors
    ///
    /// [`ScheduleWriteError`] if serialisation or either write fails.
    #[instrument(skip(self, schedule), fields(dir = %self.dir.display(), entries = schedule.len()))]
    pub async fn write(
        &self,
        schedule: &Schedule,
        note: Option<&str>,
    ) -> Result<ScheduleFiles, ScheduleWriteError> {
        let files = ScheduleFiles {
            json: self.dir.join(SCHEDULE_JSON),
            markdown: self.dir.join(SCHEDULE_MARKDOWN),
        };

        let mut json = serde_json::to_vec_pretty(schedule)?;
        json.push(b'\n');
        write_file(&files.json, json).await?;
        write_file(&files.markdown, render_markdown(schedule, note).into_bytes()).await?;

        tracing::info!(json = %files.json.display(), "schedule written");
        Ok(files)
    }
}

impl ScheduleWriter {
    /// Saves a composed but unpublished post for manual posting.
    ///
    /// Each draft gets its own `draft_<utc time>_a<article>_v<variation>.json`
    /// file; earlier drafts are kept. Returns the path written.
    ///
    /// # Errors
    ///
    /// [`ScheduleWriteError`] if serialisation or the write fails.
    #[instrument(skip(self, post, article_title), fields(dir = %self.dir.display(), article = %post.article, variation = %post.variation))]
    pub async fn write_draft(
        &self,
        post: &Post,
        article_title: &str,
        length: usize,
    ) -> Result<PathBuf, ScheduleWriteError> {
        let path = self.dir.join(draft_file_name(post));
        let record = json!({
            "article": post.article,
            "variation": post.variation,
            "article_title": article_title,
            "insight": post.insight,
            "text": post.text,
            "length": length,
            "created_at": post.created_at,
        });

        let mut contents = serde_json::to_vec_pretty(&record)?;
        contents.push(b'\n');
        write_file(&path, contents).await?;

        tracing::info!(path = %path.display(), "draft written");
        Ok(path)
    }
}

fn draft_file_name(post: &Post) -> String {
    format!(
        "draft_{}_a{}_v{}.json",
        post.created_at.as_datetime().format("%Y%m%d_%H%M%S"),
        post.article,
        post.variation
    )
}

async fn write_file(path: &Path, contents: Vec<u8>) -> Result<(), ScheduleWriteError> {
    let target = path.to_path_buf();
    let io = |source| ScheduleWriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    tokio::task::spawn_blocking(move || crate::replace_atomically(&target, &contents))
        .await
        .map_err(|e| io(std::io::Error::other(e)))?
        .map_err(io)
}

/// Human-readable rendering of a schedule.
pub fn render_markdown(schedule: &Schedule, note: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Posting schedule");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} with {} planned post{}.",
        schedule.generated_at,
        schedule.len(),
        if schedule.len() == 1 { "" } else { "s" }
    );

    for entry in &schedule.entries {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "## {}. {}",
            entry.step,
            entry.scheduled_for.format("%a %Y-%m-%d %H:%M %:z")
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Article {} \"{}\", variation {}",
            entry.article, entry.article_title, entry.variation
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Insight: {}", entry.insight);
        let _ = writeln!(out);
        for line in entry.draft_text.lines() {
            if line.is_empty() {
                let _ = writeln!(out, ">");
            } else {
                let _ = writeln!(out, "> {line}");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Length: {}", entry.length);
    }

    if let Some(note) = note {
        let _ = writeln!(out);
        let _ = writeln!(out, "**Plan stopped early:** {note}");
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};
    use pipeline::{ArticleIndex, Insight, ScheduleEntry, Timestamp, VariationIndex};
    use pretty_assertions::assert_eq;

    use super::*;

    fn schedule() -> Schedule {
        let offset = FixedOffset::east_opt(3600).unwrap();
        Schedule {
            generated_at: Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()),
            entries: vec![ScheduleEntry {
                step: 1,
                scheduled_for: offset.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap(),
                article: ArticleIndex::FIRST,
                variation: VariationIndex::FIRST,
                article_title: "Data contracts".to_string(),
                insight: Insight::new("Contracts make ownership explicit").unwrap(),
                draft_text: "Ownership needs contracts.\n\nhttps://example.com/1".to_string(),
                length: 51,
            }],
        }
    }

    #[test]
    fn markdown_lists_each_entry_with_its_date() {
        let markdown = render_markdown(&schedule(), None);

        assert!(markdown.starts_with("# Posting schedule\n"));
        assert!(markdown.contains("1 planned post."));
        assert!(markdown.contains("## 1. Mon 2024-01-08 09:00 +01:00"));
        assert!(markdown.contains("Article 1 \"Data contracts\", variation 0"));
        assert!(markdown.contains("> Ownership needs contracts.\n>\n> https://example.com/1\n"));
        assert!(!markdown.contains("stopped early"));
    }

    #[test]
    fn markdown_records_why_a_plan_stopped() {
        let markdown = render_markdown(&schedule(), Some("step 2: backlog exhausted"));
        assert!(markdown.ends_with("**Plan stopped early:** step 2: backlog exhausted\n"));
    }

    #[tokio::test]
    async fn writes_both_files_into_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScheduleWriter::new(dir.path().join("out"));

        let files = writer.write(&schedule(), None).await.unwrap();

        assert_eq!(files.json, dir.path().join("out").join("schedule.json"));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&files.json).unwrap()).unwrap();
        assert_eq!(json["entries"][0]["article_title"], "Data contracts");
        assert_eq!(json["entries"][0]["step"], 1);
        assert!(std::fs::read_to_string(&files.markdown)
            .unwrap()
            .contains("Data contracts"));
    }

    fn draft() -> Post {
        Post {
            article: ArticleIndex::new(2).unwrap(),
            variation: VariationIndex::new(1),
            text: "Drift starts in the inputs.\n\nhttps://example.com/drift".to_string(),
            insight: Insight::new("Drift shows up in inputs first").unwrap(),
            created_at: Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 3, 7, 16, 30, 5).unwrap()),
        }
    }

    #[tokio::test]
    async fn draft_is_saved_under_a_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScheduleWriter::new(dir.path());

        let path = writer
            .write_draft(&draft(), "Measuring model drift", 52)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("draft_20240307_163005_a2_v1.json"));
        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["article"], 2);
        assert_eq!(json["variation"], 1);
        assert_eq!(json["article_title"], "Measuring model drift");
        assert_eq!(json["text"], "Drift starts in the inputs.\n\nhttps://example.com/drift");
        assert_eq!(json["length"], 52);
    }

    #[tokio::test]
    async fn drafts_do_not_replace_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScheduleWriter::new(dir.path());

        let files = writer.write(&schedule(), None).await.unwrap();
        writer.write_draft(&draft(), "Measuring model drift", 52).await.unwrap();

        assert!(files.json.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
