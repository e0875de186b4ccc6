//! Retraining job launch and progress stream
//!
//! `JobStreamReader` posts the dataset and hands back a `JobStream` that
//! yields `ProgressEvent`s in arrival order until a terminal event, the end of
//! the body, a transport error, an idle timeout or an abort.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::frame::{LineDecoder, ProgressEvent};
use crate::error::{JobError, JobFailure};

/// Raw response body as a stream of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, io::Error>> + Send>>;

/// Endpoint and timing for retraining jobs
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Forecast service base URL
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Fail the job if no bytes arrive for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: None,
        }
    }
}

impl JobConfig {
    pub fn retrain_url(&self) -> String {
        format!("{}/retrain", self.base_url.trim_end_matches('/'))
    }
}

/// Dataset to upload as the `file` part
#[derive(Debug, Clone)]
pub struct RetrainRequest {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl RetrainRequest {
    pub fn new(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// Read a dataset from disk
    pub async fn from_path(path: &Path) -> Result<Self, JobError> {
        let data = tokio::fs::read(path).await.map_err(|source| JobError::Dataset {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset.csv".to_string());
        Ok(Self { file_name, data })
    }
}

/// Starts retraining jobs against the forecast service
pub struct JobStreamReader {
    client: reqwest::Client,
    config: JobConfig,
}

impl JobStreamReader {
    pub fn new(config: JobConfig) -> Result<Self, JobError> {
        // No overall timeout: the body stays open for the whole job
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Upload the dataset and open the progress stream
    ///
    /// A non-success status is returned as `JobError::Rejected` before any
    /// event is produced.
    pub async fn start(&self, request: RetrainRequest) -> Result<JobStream, JobError> {
        let url = self.config.retrain_url();
        info!(
            "Starting retraining job at {} with '{}' ({} bytes)",
            url,
            request.file_name,
            request.data.len()
        );

        let part = Part::bytes(request.data)
            .file_name(request.file_name)
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Retraining request rejected: HTTP {}", status);
            return Err(JobError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(io::Error::other));
        Ok(JobStream::from_body(Box::pin(body), self.config.idle_timeout))
    }
}

/// Lifecycle of a job stream
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running,
    Completed { result: Value },
    Failed(JobFailure),
}

/// What the caller can conclude about the job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Stream still open
    InProgress,
    Completed(Value),
    Failed(JobFailure),
    /// Body ended without a terminal event
    Inconclusive,
}

/// Cancels a `JobStream` from another task
#[derive(Debug, Clone)]
pub struct AbortHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.cancel.send_replace(true);
    }
}

enum Read {
    Cancelled,
    Chunk(Option<Result<Vec<u8>, io::Error>>),
    Idle(Duration),
}

/// Progress events of one retraining job
pub struct JobStream {
    body: Option<ByteStream>,
    decoder: LineDecoder,
    queued: VecDeque<ProgressEvent>,
    status: JobStatus,
    progress: Vec<String>,
    idle_timeout: Option<Duration>,
    body_ended: bool,
    skipped_frames: usize,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl JobStream {
    /// Wrap an already open body
    pub fn from_body(body: ByteStream, idle_timeout: Option<Duration>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            body: Some(body),
            decoder: LineDecoder::new(),
            queued: VecDeque::new(),
            status: JobStatus::Running,
            progress: Vec::new(),
            idle_timeout,
            body_ended: false,
            skipped_frames: 0,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Messages of every progress event delivered so far
    pub fn progress_messages(&self) -> &[String] {
        &self.progress
    }

    /// Frames dropped because they could not be decoded
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    pub fn outcome(&self) -> JobOutcome {
        match &self.status {
            JobStatus::Completed { result } => JobOutcome::Completed(result.clone()),
            JobStatus::Failed(failure) => JobOutcome::Failed(failure.clone()),
            JobStatus::Running if self.body_ended && self.queued.is_empty() => {
                JobOutcome::Inconclusive
            }
            JobStatus::Running => JobOutcome::InProgress,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: Arc::clone(&self.cancel_tx),
        }
    }

    /// Stop reading; a running job becomes `Failed(Cancelled)`
    pub fn abort(&mut self) {
        self.cancel_tx.send_replace(true);
        self.cancel();
    }

    /// Next event, or `None` once the stream is finished
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.status != JobStatus::Running {
                return None;
            }
            if *self.cancel_rx.borrow() {
                self.cancel();
                return None;
            }
            if let Some(event) = self.queued.pop_front() {
                self.record(&event);
                return Some(event);
            }

            let body = self.body.as_mut()?;
            let idle = self.idle_timeout;
            let read = tokio::select! {
                biased;
                _ = self.cancel_rx.wait_for(|cancelled| *cancelled) => Read::Cancelled,
                chunk = body.next() => Read::Chunk(chunk),
                _ = tokio::time::sleep(idle.unwrap_or_default()), if idle.is_some() => {
                    Read::Idle(idle.unwrap_or_default())
                }
            };

            match read {
                Read::Cancelled => {
                    self.cancel();
                    return None;
                }
                Read::Chunk(Some(Ok(bytes))) => self.ingest(&bytes),
                Read::Chunk(Some(Err(e))) => {
                    warn!("Job stream read failed: {}", e);
                    self.fail(JobFailure::Transport(e.to_string()));
                    return None;
                }
                Read::Chunk(None) => {
                    self.close_body();
                    self.body_ended = true;
                    warn!("Job stream ended without a terminal event");
                    return None;
                }
                Read::Idle(after) => {
                    warn!("Job stream idle for {:?}", after);
                    self.fail(JobFailure::IdleTimeout(after));
                    return None;
                }
            }
        }
    }

    /// Consume into a `Stream` of events
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        stream::unfold(self, |mut job| async move {
            job.next_event().await.map(|event| (event, job))
        })
    }

    fn ingest(&mut self, bytes: &[u8]) {
        for line in self.decoder.push(bytes) {
            match ProgressEvent::parse_line(&line) {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    self.queued.push_back(event);
                    if terminal {
                        // Nothing after a terminal event is read
                        self.close_body();
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.skipped_frames += 1;
                    warn!("Skipping malformed job frame: {}", e);
                }
            }
        }
    }

    fn record(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Progress { message } => {
                debug!("Job progress: {}", message);
                self.progress.push(message.clone());
            }
            ProgressEvent::Complete { result } => {
                info!("Retraining job completed");
                self.status = JobStatus::Completed {
                    result: result.clone(),
                };
            }
            ProgressEvent::Error { message } => {
                warn!("Retraining job failed: {}", message);
                self.status = JobStatus::Failed(JobFailure::Server(message.clone()));
            }
        }
    }

    fn cancel(&mut self) {
        if self.status == JobStatus::Running {
            info!("Retraining job stream aborted");
            self.fail(JobFailure::Cancelled);
        }
    }

    fn fail(&mut self, failure: JobFailure) {
        self.status = JobStatus::Failed(failure);
        self.queued.clear();
        self.close_body();
    }

    fn close_body(&mut self) {
        self.body = None;
        if self.decoder.pending() > 0 {
            debug!("Discarding {} bytes of incomplete job frame", self.decoder.pending());
        }
        self.decoder.clear();
    }
}
