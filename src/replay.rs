//! `mirror replay`: process a saved webhook body without the server.
//!
//! Classifies the body exactly as `POST /webhook` would, then dispatches the
//! job in the foreground and prints what happened to each commit and path.
//! Replaying the same delivery twice is safe; the second run reports every
//! commit as a duplicate.

use anyhow::{Context, Result};
use std::path::Path;

use repo_mirror_core::event::classify;

use crate::app::App;
use crate::config::Config;
use crate::dispatch::JobOutcome;
use crate::ingest::CommitStatus;
use crate::pipeline::FileOutcome;

pub async fn run_replay(config: &Config, event: &str, file: &Path) -> Result<()> {
    let body = std::fs::read(file)
        .with_context(|| format!("Failed to read webhook body: {}", file.display()))?;

    let Some(job) = classify(event, &body)? else {
        println!("event '{}' is not processed, nothing to do", event);
        return Ok(());
    };

    let app = App::from_config(config).await?;
    let outcome = app.dispatcher.dispatch(&job).await;
    print_outcome(&outcome);

    if let JobOutcome::Failed(e) = outcome {
        anyhow::bail!("job failed: {}", e);
    }
    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Push(report) => {
            for commit in &report.commits {
                let status = match &commit.status {
                    CommitStatus::Ingested => "ingested".to_string(),
                    CommitStatus::Duplicate => "duplicate".to_string(),
                    CommitStatus::Failed(e) => format!("failed: {}", e),
                };
                println!("commit {} {}", commit.sha, status);
                for file in &commit.files {
                    println!("  {:<10} {}", describe(&file.outcome), file.path);
                }
            }
            println!(
                "{} ingested, {} duplicate, {} failed, {} file failures",
                report.ingested(),
                report.duplicates(),
                report.failed(),
                report.failed_files()
            );
        }
        JobOutcome::Repository(outcome) => println!("repository: {:?}", outcome),
        JobOutcome::Failed(e) => println!("rejected: {}", e),
    }
}

fn describe(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Indexed => "indexed".to_string(),
        FileOutcome::Stored => "stored".to_string(),
        FileOutcome::Removed => "removed".to_string(),
        FileOutcome::Skipped(reason) => format!("skipped ({})", reason),
        FileOutcome::Failed { stage, .. } => format!("failed at {}", stage),
    }
}
