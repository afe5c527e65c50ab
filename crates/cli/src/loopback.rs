//! In-process stand-in for a remote worker.
//!
//! Reads jobs from the in-memory bus, writes each job's rendered workflow
//! to the work directory, and replies with a `file://` reference to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use previewer_bus::InMemoryBus;
use previewer_core::{Job, ResultMessage};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Start the worker. It is listening on `job_topic` by the time this returns.
pub async fn spawn(
    bus: Arc<InMemoryBus>,
    job_topic: &str,
    result_topic: String,
    work_dir: PathBuf,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut jobs = bus.jobs(job_topic).await;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = jobs.recv() => match received {
                    Ok(job) => {
                        let result = run(&work_dir, &job).await;
                        bus.deliver(&result_topic, result).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Loopback worker lagged behind the job topic");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("Loopback worker stopped");
    })
}

async fn run(work_dir: &Path, job: &Job) -> ResultMessage {
    match render(work_dir, job).await {
        Ok(path) => {
            tracing::debug!(job_id = %job.id(), path = %path.display(), "Rendered job");
            ResultMessage::ok(job.id(), format!("file://{}", path.display()))
        }
        Err(e) => {
            tracing::warn!(job_id = %job.id(), error = %e, "Loopback render failed");
            ResultMessage::failed(job.id(), e.to_string())
        }
    }
}

async fn render(work_dir: &Path, job: &Job) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(work_dir).await?;
    let bytes = serde_json::to_vec_pretty(job.payload()).map_err(std::io::Error::other)?;
    let path = work_dir.join(format!("{}.json", job.id()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
