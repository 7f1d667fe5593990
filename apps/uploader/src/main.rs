//! Mocup uploader entry point.

mod cli;
mod config;

use std::collections::HashMap;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mocup_transfer::{UploadFile, ValidationCode, format_file_size, validate_files};
use mocup_upload::{BatchEvent, BatchItem, BatchReport, BatchUploader, FileOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mocup uploader");

    let mut config = config::UploaderConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.base_url {
        config.http.base_url = url;
    }
    if let Some(token) = cli.token {
        config.http.bearer_token = Some(token);
    }
    if cli.sequential {
        config.queue.max_concurrent = 1;
    }

    let files = cli
        .files
        .iter()
        .map(|p| UploadFile::from_path(p).with_context(|| format!("cannot open {}", p.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let batch_config = config.batch();
    let validation = validate_files(&files, &batch_config.validation);
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }
    for issue in &validation.errors {
        tracing::error!(code = %issue.code, "{}", issue.message);
    }
    if validation
        .errors
        .iter()
        .any(|e| e.code == ValidationCode::TooManyFiles)
    {
        bail!("too many files");
    }
    if cli.dry_run {
        if !validation.is_valid {
            bail!("validation failed");
        }
        tracing::info!(files = files.len(), "all files valid");
        return Ok(());
    }

    let apis = mocup_http::upload_apis(&config.http)?;
    let mut uploader = BatchUploader::new(apis, batch_config);
    let mut events = uploader
        .take_events()
        .context("event receiver already taken")?;

    let mut names = HashMap::new();
    for file in files {
        let name = file.name().to_string();
        let id = uploader.add(file, cli.resource_id.as_str());
        names.insert(id, name);
    }

    let mut report = drive(&uploader, &mut events, &names, false).await;
    if cli.retry_failed && (report.failed > 0 || report.expired > 0) {
        tracing::info!(
            failed = report.failed,
            expired = report.expired,
            "retrying failed files"
        );
        report = drive(&uploader, &mut events, &names, true).await;
    }
    while let Ok(event) = events.try_recv() {
        log_event(&event, &names);
    }

    print_summary(&uploader.items(), &report);

    let unfinished = report.total - report.succeeded;
    if unfinished > 0 {
        bail!("{unfinished} of {} files did not upload", report.total);
    }
    Ok(())
}

/// Runs the batch while logging its events; Ctrl-C cancels every file.
async fn drive(
    uploader: &BatchUploader,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<BatchEvent>,
    names: &HashMap<String, String>,
    retry: bool,
) -> BatchReport {
    let run = async {
        if retry {
            uploader.retry_failed().await
        } else {
            uploader.run().await
        }
    };
    tokio::pin!(run);

    let mut interrupted = false;
    loop {
        tokio::select! {
            report = &mut run => return report,
            Some(event) = events.recv() => log_event(&event, names),
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    let canceled = uploader.cancel_all();
                    tracing::warn!(canceled, "interrupted, canceling uploads");
                }
            }
        }
    }
}

fn log_event(event: &BatchEvent, names: &HashMap<String, String>) {
    let name = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    match event {
        BatchEvent::Progress {
            id,
            percent,
            bytes_per_second,
        } => {
            tracing::debug!(file = %name(id), percent, bytes_per_second, "progress");
        }
        BatchEvent::Retrying { id, attempt, error } => {
            tracing::warn!(file = %name(id), attempt, %error, "retrying");
        }
        BatchEvent::Finished { id, outcome } => match outcome {
            FileOutcome::Succeeded { record } => {
                tracing::info!(file = %name(id), record = %record.id, "uploaded");
            }
            other => tracing::warn!(file = %name(id), outcome = ?other, "not uploaded"),
        },
    }
}

fn print_summary(items: &[BatchItem], report: &BatchReport) {
    for item in items {
        let line = match &item.outcome {
            FileOutcome::Succeeded { record } => format!("ok       {}", record.file_url),
            FileOutcome::Failed { code, message } => format!("failed   {code}: {message}"),
            FileOutcome::Rejected { code, message } => format!("rejected {code}: {message}"),
            FileOutcome::Expired { message } => format!("expired  {message}"),
            FileOutcome::Canceled => "canceled".to_string(),
            FileOutcome::Pending | FileOutcome::Running => "pending".to_string(),
        };
        println!("{} ({}): {line}", item.name, format_file_size(item.size));
    }
    println!(
        "{} uploaded, {} failed, {} expired, {} canceled, {} rejected",
        report.succeeded, report.failed, report.expired, report.canceled, report.rejected
    );
}
