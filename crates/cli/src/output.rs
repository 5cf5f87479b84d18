//! Rendering of command results on stdout.

use std::path::Path;

use nodes::{LoadedDocument, PlanOutcome, PublishOutcome, StatusReport, StepReport};
use pipeline::RotationState;
use serde_json::{json, Value};
use storage::ScheduleFiles;

use crate::cli::OutputFormat;

fn emit(format: OutputFormat, value: Value, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}

pub fn step(report: &StepReport, draft: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    let (outcome, receipt) = match &report.outcome {
        PublishOutcome::Published { receipt, .. } => ("published", Some(receipt)),
        PublishOutcome::DryRun { .. } => ("dry_run", None),
    };
    let value = json!({
        "outcome": outcome,
        "slot": report.slot,
        "article_title": report.article_title,
        "post": report.post,
        "receipt": receipt,
        "remaining": report.remaining,
        "draft_file": draft.map(|path| path.display().to_string()),
    });
    emit(format, value, || {
        let mut out = format!(
            "Article {} \"{}\", variation {}\n\n{}\n\n",
            report.slot.article, report.article_title, report.slot.variation, report.post.text
        );
        match receipt {
            Some(receipt) => out.push_str(&format!(
                "Published as {} at {}.\n",
                receipt.post_id, receipt.posted_at
            )),
            None => out.push_str("Not published (dry run).\n"),
        }
        if let Some(path) = draft {
            out.push_str(&format!("Draft saved to {}.\n", path.display()));
        }
        out.push_str(&format!("{} post(s) left in the backlog.\n", report.remaining));
        out
    })
}

pub fn plan(outcome: &PlanOutcome, files: &ScheduleFiles, format: OutputFormat) -> anyhow::Result<()> {
    let failure = outcome.failure.as_ref().map(|failure| {
        json!({
            "step": failure.step,
            "stage": failure.error.stage(),
            "error": failure.error.to_string(),
        })
    });
    let value = json!({
        "schedule": outcome.schedule,
        "failure": failure,
        "files": {
            "json": files.json.display().to_string(),
            "markdown": files.markdown.display().to_string(),
        },
    });
    emit(format, value, || {
        let mut out = String::new();
        for entry in &outcome.schedule.entries {
            out.push_str(&format!(
                "{}. {}  article {} variation {}  ({} chars)\n   {}\n",
                entry.step,
                entry.scheduled_for.format("%a %Y-%m-%d %H:%M %:z"),
                entry.article,
                entry.variation,
                entry.length,
                entry.draft_text.replace('\n', "\n   ")
            ));
        }
        if let Some(failure) = &outcome.failure {
            out.push_str(&format!("Stopped at step {}: {}\n", failure.step, failure.error));
        }
        out.push_str(&format!(
            "Wrote {} and {}.\n",
            files.json.display(),
            files.markdown.display()
        ));
        out
    })
}

pub fn status(report: &StatusReport, format: OutputFormat) -> anyhow::Result<()> {
    let backlog = report.backlog.as_ref().map(|backlog| {
        json!({
            "article_count": backlog.article_count,
            "remaining": backlog.remaining,
            "next": backlog.next.as_ref().map(|(slot, title)| json!({ "slot": slot, "title": title })),
        })
    });
    let value = json!({
        "position": report.position,
        "total_posted": report.total_posted,
        "last_posted_at": report.last_posted_at,
        "last_post": report.last_post,
        "history_len": report.history_len,
        "cached_analyses": report.cached_analyses,
        "backlog": backlog,
        "document_error": report.document_error,
    });
    emit(format, value, || {
        let mut out = format!(
            "Pointer:          article {}, variation {}\nTotal posted:     {}\n",
            report.position.article, report.position.variation, report.total_posted
        );
        match &report.last_post {
            Some(entry) => out.push_str(&format!(
                "Last post:        {} at {} ({})\n",
                entry.post_id,
                entry.posted_at,
                entry.slot()
            )),
            None => out.push_str("Last post:        none\n"),
        }
        out.push_str(&format!(
            "History entries:  {}\nCached analyses:  {}\n",
            report.history_len, report.cached_analyses
        ));
        match (&report.backlog, &report.document_error) {
            (Some(backlog), _) => {
                out.push_str(&format!(
                    "Backlog:          {} post(s) left across {} article(s)\n",
                    backlog.remaining, backlog.article_count
                ));
                match &backlog.next {
                    Some((slot, title)) => {
                        out.push_str(&format!("Next:             {slot} \"{title}\"\n"))
                    }
                    None => out.push_str("Next:             backlog exhausted\n"),
                }
            }
            (None, Some(error)) => out.push_str(&format!("Backlog:          unknown ({error})\n")),
            (None, None) => {}
        }
        out
    })
}

pub fn validation(document: &LoadedDocument, format: OutputFormat) -> anyhow::Result<()> {
    let report = &document.report;
    let articles: Vec<Value> = document
        .articles
        .iter()
        .map(|article| {
            json!({
                "index": article.index,
                "title": article.title,
                "url": article.url,
                "words": article.word_count(),
            })
        })
        .collect();
    let value = json!({
        "report": report,
        "articles": articles,
        "total_slots": document.bounds.total_slots(),
    });
    emit(format, value, || {
        let mut out = String::new();
        for article in &document.articles {
            out.push_str(&format!(
                "{:>3}. {} ({} words){}\n",
                article.index,
                article.title,
                article.word_count(),
                if article.url.is_some() { "" } else { " [no url]" }
            ));
        }
        out.push_str(&format!(
            "\n{} article(s), {} with a URL, {} words, {} post slot(s).\n",
            report.article_count,
            report.articles_with_url,
            report.total_words,
            document.bounds.total_slots()
        ));
        if report.is_clean() {
            out.push_str("No structural problems found.\n");
        } else {
            out.push_str(&format!("{} warning(s):\n", report.warnings.len()));
            for warning in &report.warnings {
                out.push_str(&format!("  - {warning}\n"));
            }
        }
        out
    })
}

pub fn reset(state: &RotationState, format: OutputFormat) -> anyhow::Result<()> {
    let value = json!({
        "position": state.cursor().position(),
        "total_posted": state.total_posted(),
        "history_len": state.history().len(),
        "cached_analyses": state.insights().len(),
    });
    emit(format, value, || {
        format!(
            "Rotation rewound to {}. {} history entr{} and {} cached analys{} kept.\n",
            state.cursor().position(),
            state.history().len(),
            if state.history().len() == 1 { "y" } else { "ies" },
            state.insights().len(),
            if state.insights().len() == 1 { "is" } else { "es" },
        )
    })
}

pub fn cache_cleared(removed: usize, format: OutputFormat) -> anyhow::Result<()> {
    emit(format, json!({ "removed": removed }), || {
        format!("Removed {removed} cached analys{}.\n", if removed == 1 { "is" } else { "es" })
    })
}
