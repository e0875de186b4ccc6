//! Retrain command handler

use std::path::Path;

use anyhow::{bail, Context, Result};

use stockpulse_core::{Config, JobOutcome, JobStreamReader, RetrainRequest};

use crate::output::Output;

/// Upload a dataset and follow the retraining job to its end
pub async fn retrain(config: &Config, file: &Path, output: &Output) -> Result<()> {
    let request = RetrainRequest::from_path(file).await?;
    let reader = JobStreamReader::new(config.job_config())?;

    output.message(&format!(
        "Uploading {} ({} bytes) to {}",
        request.file_name,
        request.data.len(),
        reader.config().retrain_url()
    ));

    let mut job = reader
        .start(request)
        .await
        .context("Failed to start retraining")?;

    let abort = job.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    while let Some(event) = job.next_event().await {
        output.print_progress(&event);
    }
    interrupt.abort();

    if job.skipped_frames() > 0 {
        tracing::warn!(skipped = job.skipped_frames(), "Ignored malformed progress frames");
    }

    match job.outcome() {
        JobOutcome::Completed(_) => Ok(()),
        JobOutcome::Failed(failure) => bail!("Retraining failed: {}", failure),
        JobOutcome::Inconclusive => {
            bail!("Retraining stream ended before the job reported a result")
        }
        JobOutcome::InProgress => bail!("Retraining stream stopped unexpectedly"),
    }
}
