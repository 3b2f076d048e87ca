//! Benchmark batches: run a probe on every host and parse what it prints.

use super::result::{BatchResult, HostRecord};
use super::wave::{close_all, connect_hosts};
use super::{BatchError, BatchScheduler};
use crate::probe::{PingProbe, PingStats, Probe};
use crate::transport::{RemoteCommand, Transport};

impl<T: Transport> BatchScheduler<T> {
    /// Run `probe` on each of `hosts` (every available host when `None`).
    ///
    /// Hosts that can't be connected, can't run the command, or print
    /// something the probe can't parse end up in `failed`.
    pub async fn benchmark<P: Probe>(
        &self,
        probe: &P,
        hosts: Option<Vec<String>>,
    ) -> Result<BatchResult<HostRecord<P::Record>, String>, BatchError> {
        let mut pending = hosts.unwrap_or_else(|| self.connector.inventory().snapshot());
        let mut result = BatchResult::default();
        let mut pass = 0u32;
        loop {
            tracing::info!(pass, hosts = pending.len(), "benchmark pass started");
            let failed = self.benchmark_pass(probe, &pending, &mut result.successes).await?;
            pass += 1;
            if !self.next_pass(pass, failed.len()).await? {
                result.failed = failed;
                break;
            }
            pending = failed;
        }
        tracing::info!(
            successes = result.successes.len(),
            failed = result.failed.len(),
            "benchmark finished"
        );
        Ok(result)
    }

    /// Ping `target` from every host, highest average latency first.
    pub async fn benchmark_ping(
        &self,
        target: &str,
        count: u32,
        hosts: Option<Vec<String>>,
    ) -> Result<BatchResult<HostRecord<PingStats>, String>, BatchError> {
        let probe = PingProbe::new(target, count);
        let mut result = self.benchmark(&probe, hosts).await?;
        result.sort_by(|a, b| PingStats::cmp_avg_desc(&a.record, &b.record));
        Ok(result)
    }

    async fn benchmark_pass<P: Probe>(
        &self,
        probe: &P,
        hosts: &[String],
        successes: &mut Vec<HostRecord<P::Record>>,
    ) -> Result<Vec<String>, BatchError> {
        let mut failed = Vec::new();
        for (n, wave) in hosts.chunks(self.settings.wave_size.max(1)).enumerate() {
            self.abort().check()?;
            tracing::debug!(wave = n, size = wave.len(), "benchmark wave");
            self.benchmark_wave(probe, wave, successes, &mut failed).await?;
        }
        Ok(failed)
    }

    async fn benchmark_wave<P: Probe>(
        &self,
        probe: &P,
        wave: &[String],
        successes: &mut Vec<HostRecord<P::Record>>,
        failed: &mut Vec<String>,
    ) -> Result<(), BatchError> {
        let connected = connect_hosts(&self.connector, wave).await;
        for (host, e) in connected.failures {
            tracing::warn!(host = %host, error = %e, "benchmark connect failed");
            failed.push(host);
        }
        if let Some(fatal) = connected.fatal {
            close_all(connected.sessions).await;
            return Err(fatal.into());
        }
        let sessions = connected.sessions;

        let command = probe.command();
        let mut running: Vec<(String, RemoteCommand)> = Vec::with_capacity(sessions.len());
        for (host, session) in &sessions {
            match session.execute(&command).await {
                Ok(cmd) => running.push((host.clone(), cmd)),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "benchmark command failed to start");
                    failed.push(host.clone());
                }
            }
        }

        let mut outcome = Ok(());
        for (host, mut cmd) in running {
            if let Err(aborted) = self.abort().check() {
                outcome = Err(aborted.into());
                break;
            }
            let stdout = match cmd.collect_stdout(self.settings.read_timeout).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "benchmark output unreadable");
                    failed.push(host);
                    continue;
                }
            };
            match probe.parse(&String::from_utf8_lossy(&stdout)) {
                Ok(record) => successes.push(HostRecord { host, record }),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "benchmark result rejected");
                    failed.push(host);
                }
            }
        }

        close_all(sessions).await;
        outcome
    }
}
