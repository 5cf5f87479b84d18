//! Composition of the executor and dispatch of one subcommand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use llm::{AnthropicProvider, AnthropicSettings};
use nodes::{
    ContentAnalyzer, ExecutorSettings, PipelinePlanner, PublishMode, Publisher, RotationExecutor,
    StepReport, VariationComposer,
};
use pipeline::{
    ArticleIndex, CadenceError, DocumentSource, LanguageModel, PostingClient, ResetMode,
    RetryPolicy, StateError, StateStore,
};
use social::{XClient, XSettings};
use sources::{FileDocumentSource, HttpDocumentSource, HttpSourceSettings};
use storage::{JsonStateStore, ScheduleWriter};

use crate::cli::{CacheCommands, Commands, OutputFormat};
use crate::config::{CadenceConfig, SourceKind};
use crate::output;

/// Wires the infrastructure adapters into a [`RotationExecutor`].
pub fn build_executor(config: &CadenceConfig) -> anyhow::Result<RotationExecutor> {
    let variations = config.variations_per_article()?;

    let source: Arc<dyn DocumentSource> = match config.document.kind {
        SourceKind::File => Arc::new(match &config.document.base_dir {
            Some(dir) => FileDocumentSource::with_base_dir(dir),
            None => FileDocumentSource::new(),
        }),
        SourceKind::Http => Arc::new(HttpDocumentSource::new(HttpSourceSettings {
            url_template: config.document.url_template.clone(),
            token: config.document.token.clone(),
            timeout: Duration::from_secs(config.document.timeout_secs),
        })?),
    };

    let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(
        &config.paths.state_file,
        variations.get(),
    ));

    let model: Arc<dyn LanguageModel> = Arc::new(AnthropicProvider::new(AnthropicSettings {
        api_key: config.llm.api_key.clone(),
        model: config.llm.model.clone(),
        base_url: config.llm.base_url.clone(),
        timeout: Duration::from_secs(config.llm.timeout_secs),
    })?);

    let poster: Arc<dyn PostingClient> = Arc::new(XClient::new(XSettings {
        bearer_token: config.social.bearer_token.clone(),
        base_url: config.social.base_url.clone(),
        timeout: Duration::from_secs(config.social.timeout_secs),
    })?);

    let analyzer = ContentAnalyzer::new(Arc::clone(&model), config.analyzer_settings());
    let composer = VariationComposer::new(model, config.composer_settings()?);
    let planner = PipelinePlanner::new(
        analyzer.clone(),
        composer.clone(),
        config.cadence()?,
        config.rotation.cache_schema_version,
    );
    let publisher = Publisher::new(
        poster,
        config.length_rule()?,
        Duration::from_secs(config.social.timeout_secs),
    );

    Ok(RotationExecutor::new(
        source,
        store,
        analyzer,
        composer,
        planner,
        publisher,
        ExecutorSettings {
            document: config.document_id()?,
            variations_per_article: variations,
            cache_schema_version: config.rotation.cache_schema_version,
        },
    ))
}

pub async fn dispatch(
    command: Commands,
    config: &CadenceConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if command.needs_model() {
        config.require_llm()?;
    }
    let executor = build_executor(config)?;

    match command {
        Commands::Preview => {
            let report = executor.preview().await.map_err(explain)?;
            output::step(&report, None, format)
        }
        Commands::Plan { weeks } => {
            let steps = weeks.unwrap_or(config.schedule.default_weeks) as usize;
            plan(&executor, config, steps, format).await
        }
        Commands::Commit => {
            let mode = if config.social.enable_posting {
                config.require_social()?;
                PublishMode::Live
            } else {
                tracing::warn!("social.enable_posting is false, commit runs as a dry run");
                PublishMode::DryRun
            };
            let report = executor.commit(mode).await.map_err(explain)?;
            let draft = match mode {
                PublishMode::Live => None,
                PublishMode::DryRun => Some(save_draft(&report, config).await?),
            };
            output::step(&report, draft.as_deref(), format)
        }
        Commands::Status => {
            let report = executor.status().await.map_err(explain)?;
            output::status(&report, format)
        }
        Commands::Validate => {
            let document = executor.load_document().await.map_err(explain)?;
            output::validation(&document, format)
        }
        Commands::Reset {
            clear_history,
            force,
        } => {
            let mode = if clear_history {
                ResetMode::ClearHistory
            } else {
                ResetMode::RewindPointer
            };
            let state = executor.reset(mode, force).await.map_err(explain)?;
            output::reset(&state, format)
        }
        Commands::Cache {
            action: CacheCommands::Clear { article },
        } => {
            let article = article.and_then(ArticleIndex::new);
            let removed = executor.clear_cache(article).await.map_err(explain)?;
            output::cache_cleared(removed, format)
        }
    }
}

async fn plan(
    executor: &RotationExecutor,
    config: &CadenceConfig,
    steps: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let outcome = executor.plan(steps).await.map_err(explain)?;

    let note = outcome
        .failure
        .as_ref()
        .map(|failure| format!("step {}: {}", failure.step, failure.error));
    let files = ScheduleWriter::new(&config.paths.schedule_dir)
        .write(&outcome.schedule, note.as_deref())
        .await
        .context("failed to write the schedule")?;
    output::plan(&outcome, &files, format)?;

    match outcome.failure {
        None => Ok(()),
        Some(failure) => Err(explain(failure.error).context(format!(
            "plan stopped at step {} of {steps}; earlier steps were written",
            failure.step
        ))),
    }
}

/// Saves an unpublished commit candidate next to the schedules for manual posting.
async fn save_draft(report: &StepReport, config: &CadenceConfig) -> anyhow::Result<PathBuf> {
    let length = config.length_rule()?.measure(&report.post.text);
    ScheduleWriter::new(&config.paths.schedule_dir)
        .write_draft(&report.post, &report.article_title, length)
        .await
        .context("failed to save the draft post")
}

/// Attaches the failing stage and what the operator can do about it.
fn explain(error: CadenceError) -> anyhow::Error {
    let stage = error.stage();
    let hint = match (&error, error.retry_policy()) {
        (CadenceError::State(StateError::Corrupted { .. }), _) => {
            Some("inspect the state file, or run `cadence reset --force` to start over".to_string())
        }
        (_, RetryPolicy::Retryable { after: Some(after) }) => {
            Some(format!("safe to retry after {}s", after.as_secs()))
        }
        (_, RetryPolicy::Retryable { after: None }) => Some("safe to retry".to_string()),
        (_, RetryPolicy::NonRetryable) => None,
    };
    let message = match hint {
        Some(hint) => format!("{stage} failed ({hint})"),
        None => format!("{stage} failed"),
    };
    anyhow::Error::new(error).context(message)
}
