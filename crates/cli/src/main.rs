//! Cadence CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: layer defaults, `cadence.toml`, `--config`, and
//!    `CADENCE_*` environment variables, then validate the result.
//! 2. **Wire observability**: configure `tracing-subscriber` with a pretty or
//!    JSON layer and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. All `tracing` spans and structured events emitted by every crate
//!    in the workspace flow through this layer.
//! 3. **Construct infrastructure**: create the document source, state store,
//!    `AnthropicProvider`, and `XClient`, and inject them into
//!    `RotationExecutor`.
//! 4. **Dispatch**: run exactly one subcommand (preview, plan, commit, status,
//!    validate, reset, cache clear) and print its result.

use clap::Parser;
use pipeline::RunId;
use tracing::Instrument;

mod cli;
mod commands;
mod config;
mod output;
mod telemetry;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("cadence error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::CadenceConfig::load_with_dotenv(cli.config.as_deref())?;
    let guard = telemetry::init(&config.telemetry, cli.quiet, cli.verbose)?;

    let run_id = RunId::new_random();
    let span = tracing::info_span!("cadence", %run_id, command = cli.command.name());
    let result = commands::dispatch(cli.command, &config, cli.format)
        .instrument(span)
        .await;
    guard.shutdown();
    result
}
