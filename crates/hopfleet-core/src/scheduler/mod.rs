//! Batch scheduler.
//!
//! Work is cut into waves of at most `wave_size` items. Each wave runs to
//! completion before the next starts: connect every session, start every
//! command, collect every result, close every session. Failed items are
//! gathered and, when the retry policy allows, run again in a later pass.
//!
//! A batch only returns `Err` on exhaustion (no relay, no host) or abort;
//! everything else is recorded per item in the `BatchResult`.

mod benchmark;
mod download;
mod result;
mod wave;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{HopfleetConfig, TransferBackend};
use crate::connector::{ConnectError, TunnelConnector};
use crate::control::{AbortToken, Aborted};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transfer::DEFAULT_CHUNK_SIZE;
use crate::transport::{SshTransport, Transport};

pub use download::DownloadJob;
pub use result::{BatchResult, Downloaded, FailedDownload, HostRecord};

/// Default items per wave.
pub const DEFAULT_WAVE_SIZE: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Aborted(#[from] Aborted),
}

/// Knobs of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub wave_size: usize,
    pub chunk_size: usize,
    pub read_timeout: Option<Duration>,
    pub backend: TransferBackend,
    pub retry: RetryPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            wave_size: DEFAULT_WAVE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Some(Duration::from_secs(60)),
            backend: TransferBackend::default(),
            retry: RetryPolicy::none(),
        }
    }
}

impl BatchSettings {
    pub fn from_config(cfg: &HopfleetConfig) -> Self {
        Self {
            wave_size: cfg.wave_size.max(1),
            chunk_size: cfg.chunk_size.max(1),
            read_timeout: cfg.read_timeout(),
            backend: cfg.backend(),
            retry: RetryPolicy::from_config(&cfg.retry_config()),
        }
    }
}

/// Runs benchmark and download batches over a shared connector.
pub struct BatchScheduler<T: Transport> {
    connector: Arc<TunnelConnector<T>>,
    settings: BatchSettings,
}

impl<T: Transport> BatchScheduler<T> {
    pub fn new(connector: Arc<TunnelConnector<T>>, settings: BatchSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn connector(&self) -> &Arc<TunnelConnector<T>> {
        &self.connector
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    fn abort(&self) -> &AbortToken {
        self.connector.abort_token()
    }

    /// Wait out the backoff before retry pass `pass`; false when no such pass runs.
    async fn next_pass(&self, pass: u32, pending: usize) -> Result<bool, Aborted> {
        match self.settings.retry.decide(pass, pending) {
            RetryDecision::NoRetry => Ok(false),
            RetryDecision::RetryAfter(delay) => {
                tracing::info!(pass, pending, delay_ms = delay.as_millis() as u64, "retrying failed items");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.abort().check()?;
                Ok(true)
            }
        }
    }
}

impl BatchScheduler<SshTransport> {
    /// Production scheduler: SSH transport, inventory and settings from `cfg`.
    pub fn from_config(cfg: &HopfleetConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let transport = SshTransport::from_config(cfg)?;
        Ok(Self::new(
            Arc::new(TunnelConnector::from_config(transport, cfg)),
            BatchSettings::from_config(cfg),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    #[test]
    fn settings_follow_config() {
        let cfg = HopfleetConfig {
            wave_size: 5,
            chunk_size: 512,
            read_timeout_secs: 0,
            transfer_backend: Some(TransferBackend::Stepped),
            retry: Some(RetryConfig {
                passes: 2,
                base_delay_secs: 0.5,
                max_delay_secs: 4,
            }),
            ..HopfleetConfig::default()
        };
        let s = BatchSettings::from_config(&cfg);
        assert_eq!(s.wave_size, 5);
        assert_eq!(s.chunk_size, 512);
        assert_eq!(s.read_timeout, None);
        assert_eq!(s.backend, TransferBackend::Stepped);
        assert_eq!(s.retry.passes, 2);
        assert_eq!(s.retry.max_delay, Duration::from_secs(4));
    }

    #[test]
    fn ssh_scheduler_needs_relays() {
        let err = BatchScheduler::<SshTransport>::from_config(&HopfleetConfig::default())
            .err()
            .expect("no relays configured");
        assert!(err.to_string().contains("relays"), "{err}");
    }
}
