mod arglists;
mod compiler;
mod config;
mod core;
mod exit_codes;
mod grader;
mod languages;
mod runner;
mod settings;
mod submission;
mod testcase;
mod testcase_types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::GradingConfig;
use crate::grader::{GradingSession, SubmissionResult};
use crate::settings::Settings;
use crate::submission::Submission;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("grader=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    info!("Starting grader with {:?}", settings);

    let config = GradingConfig::build(
        &settings.testcases_dir,
        &settings.user_config,
        &settings.default_config,
    )?;
    let session = GradingSession::prepare(config, settings.session_options()).await?;
    let generate_results = session.config().generate_results;

    let submissions = list_submissions(&settings.submissions_dir).await?;
    info!("Testcases: {:?}", session.testcase_names());
    info!(
        "Grading {} submissions for {} ({} exit codes in play)",
        submissions.len(),
        session.config().assignment_name,
        session.exit_codes().result_codes().len() + 1
    );

    if generate_results {
        tokio::fs::create_dir_all(&settings.results_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", settings.results_dir))?;
    }

    let mut failed = 0usize;
    for path in submissions {
        let submission = Submission::new(path);
        let result = match session.grade(&submission).await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to grade {}: {:#}", submission.name(), e);
                failed += 1;
                continue;
            }
        };

        println!("{}", serde_json::to_string(&result)?);
        if generate_results {
            if let Err(e) = store_result(&settings.results_dir, &result).await {
                warn!("Failed to store result for {}: {:#}", result.submission, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} submissions could not be graded", failed);
    }
    Ok(())
}

/// Regular files in `dir`, sorted by name
async fn list_submissions(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read submissions from {:?}", dir))?;

    let mut submissions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            submissions.push(entry.path());
        }
    }
    submissions.sort();
    Ok(submissions)
}

async fn store_result(results_dir: &Path, result: &SubmissionResult) -> Result<()> {
    let path = results_dir.join(format!("{}.json", result.submission));
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Stored result in {:?}", path);
    Ok(())
}
