//! Runs the `cadence` binary against a temporary project for the commands that
//! never reach the network.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

const NEWSLETTER: &str = "\
Weekly notes

Article #1
Article #1 Title: Data contracts in practice
Article #1 URL: https://example.com/contracts

Contracts between producers and consumers make ownership explicit.

Article #2
Article #2 Title: Measuring model drift
Article #2 URL: https://example.com/drift

Drift shows up in the inputs long before it shows up in the metrics.
";

fn cadence(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cadence"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env("CADENCE_LOG", "error")
        .env("CADENCE_DOCUMENT__ID", "newsletter.txt")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("X_BEARER_TOKEN")
        .output()
        .expect("binary runs")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("newsletter.txt"), NEWSLETTER).unwrap();
    dir
}

#[test]
fn validate_reports_document_structure() {
    let dir = project();

    let value = json(&cadence(dir.path(), &["--format", "json", "validate"]));

    assert_eq!(value["report"]["article_count"], 2);
    assert_eq!(value["report"]["articles_with_url"], 2);
    assert_eq!(value["total_slots"], 8);
    assert_eq!(value["articles"][1]["title"], "Measuring model drift");
}

#[test]
fn status_of_a_fresh_project_points_at_the_first_article() {
    let dir = project();

    let value = json(&cadence(dir.path(), &["--format", "json", "status"]));

    assert_eq!(value["total_posted"], 0);
    assert_eq!(value["position"]["article"], 1);
    assert_eq!(value["position"]["variation"], 0);
    assert_eq!(value["backlog"]["remaining"], 8);
    assert_eq!(value["backlog"]["next"]["title"], "Data contracts in practice");
}

#[test]
fn corrupted_state_is_reported_until_forced_reset() {
    let dir = project();
    std::fs::write(dir.path().join("cadence-state.json"), "{ not json").unwrap();

    let failed = cadence(dir.path(), &["status"]);
    assert!(!failed.status.success());
    let stderr = String::from_utf8_lossy(&failed.stderr);
    assert!(stderr.contains("corrupted"), "stderr: {stderr}");
    assert!(stderr.contains("reset --force"), "stderr: {stderr}");

    let plain_reset = cadence(dir.path(), &["reset"]);
    assert!(!plain_reset.status.success());

    json(&cadence(dir.path(), &["--format", "json", "reset", "--force"]));
    let value = json(&cadence(dir.path(), &["--format", "json", "status"]));
    assert_eq!(value["total_posted"], 0);
}

#[test]
fn model_commands_require_an_api_key() {
    let dir = project();

    let output = cadence(dir.path(), &["preview"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ANTHROPIC_API_KEY"));
    assert!(!dir.path().join("cadence-state.json").exists());
}

#[test]
fn missing_document_is_fatal_for_validate() {
    let dir = tempfile::tempdir().unwrap();

    let output = cadence(dir.path(), &["validate"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
