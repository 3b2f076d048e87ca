//! Download batches: each job fetches one URL on some host and streams the
//! body back into a local file.

use std::path::PathBuf;
use std::time::Duration;

use super::result::{BatchResult, Downloaded, FailedDownload};
use super::wave::{close_all, connect_any_each};
use super::{BatchError, BatchScheduler};
use crate::control::Aborted;
use crate::shell::fetch_command;
use crate::storage::PartFile;
use crate::transfer::{drive, TransferError, TransferTask};
use crate::transport::{ExitStatus, Transport};

/// Fetch `url` into `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

impl<T: Transport> BatchScheduler<T> {
    /// Run every job on whichever host is free. A job's file appears at its
    /// destination only if the whole body arrived, nothing was written to
    /// stderr and the fetch exited with status 0.
    pub async fn download(
        &self,
        jobs: Vec<DownloadJob>,
    ) -> Result<BatchResult<Downloaded, FailedDownload>, BatchError> {
        let mut pending = jobs;
        let mut result = BatchResult::default();
        let mut pass = 0u32;
        loop {
            tracing::info!(pass, jobs = pending.len(), "download pass started");
            let failed = self.download_pass(&pending, &mut result.successes).await?;
            pass += 1;
            if !self.next_pass(pass, failed.len()).await? {
                result.failed = failed;
                break;
            }
            pending = failed.into_iter().map(|f| f.job).collect();
        }
        tracing::info!(
            successes = result.successes.len(),
            failed = result.failed.len(),
            "download finished"
        );
        Ok(result)
    }

    async fn download_pass(
        &self,
        jobs: &[DownloadJob],
        successes: &mut Vec<Downloaded>,
    ) -> Result<Vec<FailedDownload>, BatchError> {
        let mut failed = Vec::new();
        // A wave never asks for more sessions than there are hosts.
        let wave_size = self
            .settings
            .wave_size
            .min(self.connector.inventory().total())
            .max(1);
        for (n, wave) in jobs.chunks(wave_size).enumerate() {
            self.abort().check()?;
            tracing::debug!(wave = n, size = wave.len(), "download wave");
            self.download_wave(wave, successes, &mut failed).await?;
        }
        Ok(failed)
    }

    async fn download_wave(
        &self,
        wave: &[DownloadJob],
        successes: &mut Vec<Downloaded>,
        failed: &mut Vec<FailedDownload>,
    ) -> Result<(), BatchError> {
        let mut runnable = Vec::with_capacity(wave.len());
        for job in wave {
            match fetch_command(&job.url) {
                Ok(command) => runnable.push((job.clone(), command)),
                Err(e) => {
                    tracing::warn!(url = %job.url, error = %e, "download rejected");
                    failed.push(FailedDownload {
                        job: job.clone(),
                        host: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let connected = connect_any_each(&self.connector, &runnable).await;
        for ((job, _), e) in connected.failures {
            tracing::warn!(url = %job.url, error = %e, "download connect failed");
            failed.push(FailedDownload {
                job,
                host: None,
                reason: e.to_string(),
            });
        }
        if let Some(fatal) = connected.fatal {
            close_all(connected.sessions).await;
            return Err(fatal.into());
        }
        let sessions = connected.sessions;

        let mut started = Vec::with_capacity(sessions.len());
        let mut tasks = Vec::with_capacity(sessions.len());
        for ((job, command), session) in &sessions {
            let host = session.host().to_string();
            let (part, file) = match PartFile::create(&job.destination).await {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(path = %job.destination.display(), error = %e, "can't create download file");
                    failed.push(FailedDownload {
                        job: job.clone(),
                        host: Some(host),
                        reason: format!("{e:#}"),
                    });
                    continue;
                }
            };
            let cmd = match session.execute(command).await {
                Ok(cmd) => cmd,
                Err(e) => {
                    tracing::warn!(host = %host, url = %job.url, error = %e, "fetch failed to start");
                    drop(file);
                    part.discard().await;
                    failed.push(FailedDownload {
                        job: job.clone(),
                        host: Some(host),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            tracing::debug!(host = %host, url = %job.url, "fetch started");
            let (stdout, stderr, status) = cmd.into_parts();
            tasks.push(
                TransferTask::new(stdout, stderr, file)
                    .with_read_timeout(self.settings.read_timeout)
                    .with_abort(self.abort().clone()),
            );
            started.push((job.clone(), host, part, status));
        }

        let outcomes = drive(tasks, self.settings.chunk_size, self.settings.backend).await;

        let mut aborted = false;
        for ((job, host, part, status), outcome) in started.into_iter().zip(outcomes) {
            let reason = match (outcome.result, outcome.sink) {
                (Ok(bytes), Some(file)) => match exit_failure(status, self.settings.read_timeout).await {
                    Some(reason) => {
                        drop(file);
                        part.discard().await;
                        reason
                    }
                    None => match part.finalize(file).await {
                        Ok(path) => {
                            tracing::info!(host = %host, path = %path.display(), bytes, "download complete");
                            successes.push(Downloaded {
                                job,
                                host,
                                path,
                                bytes,
                            });
                            continue;
                        }
                        Err(e) => format!("{e:#}"),
                    },
                },
                (result, sink) => {
                    drop(sink);
                    part.discard().await;
                    match result {
                        Err(e) => {
                            aborted |= matches!(e, TransferError::Aborted(_));
                            e.to_string()
                        }
                        Ok(_) => "transfer lost its file handle".to_string(),
                    }
                }
            };
            tracing::warn!(host = %host, url = %job.url, reason = %reason, "download failed");
            failed.push(FailedDownload {
                job,
                host: Some(host),
                reason,
            });
        }

        close_all(sessions).await;
        if aborted {
            return Err(Aborted.into());
        }
        Ok(())
    }
}

/// `wget -q` reports some failures (DNS, refused connection) only through
/// its exit status, with nothing on either stream.
async fn exit_failure(status: ExitStatus, limit: Option<Duration>) -> Option<String> {
    match status.wait_for(limit).await {
        Some(0) => None,
        Some(code) => Some(format!("fetch exited with status {code}")),
        None => Some("fetch ended without an exit status".to_string()),
    }
}
