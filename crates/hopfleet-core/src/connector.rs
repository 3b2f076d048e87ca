//! Two-hop connection establishment with relay and host failover.
//!
//! `connect` targets one host: relays are tried in random order until one
//! authenticates, then the target is reached through it. A target failure is
//! not retried on another relay. `connect_any` holds one relay and walks the
//! candidate hosts in random order until one accepts.
//!
//! The target host is leased from the inventory before its handshake starts
//! and given back if the handshake fails, so two concurrent attempts can never
//! race for the same host.

use std::sync::Arc;
use std::time::Duration;

use crate::config::HopfleetConfig;
use crate::control::{AbortToken, Aborted};
use crate::inventory::{HostInventory, HostLease, RelayDirectory};
use crate::session::Session;
use crate::transport::{Hop, Transport, TransportError};

/// Connection failures. `is_fatal` separates exhaustion (and abort) from
/// per-host failures that a batch records and moves past.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no relay accepted a connection ({tried} tried)")]
    NoRelayAvailable { tried: usize },
    #[error("no candidate host accepted a connection")]
    NoHostAvailable,
    #[error("host {0} is not available in the inventory")]
    HostUnavailable(String),
    #[error("can't connect to {host}: {source}")]
    ConnectionFailed {
        host: String,
        source: TransportError,
    },
    #[error(transparent)]
    Aborted(#[from] Aborted),
}

impl ConnectError {
    /// True for errors that end the whole batch rather than one host.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectError::NoRelayAvailable { .. }
                | ConnectError::NoHostAvailable
                | ConnectError::Aborted(_)
        )
    }
}

/// Opens sessions on hosts from a shared inventory through a relay directory.
pub struct TunnelConnector<T: Transport> {
    transport: T,
    relays: RelayDirectory,
    inventory: Arc<HostInventory>,
    timeout: Duration,
    abort: AbortToken,
}

impl<T: Transport> TunnelConnector<T> {
    pub fn new(
        transport: T,
        relays: RelayDirectory,
        inventory: Arc<HostInventory>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            relays,
            inventory,
            timeout,
            abort: AbortToken::new(),
        }
    }

    /// Relays, hosts and handshake timeout taken from `cfg`.
    pub fn from_config(transport: T, cfg: &HopfleetConfig) -> Self {
        Self::new(
            transport,
            RelayDirectory::new(cfg.relays.iter().cloned()),
            Arc::new(HostInventory::from_groups(&cfg.hosts, &cfg.host_groups)),
            cfg.connect_timeout(),
        )
    }

    /// Use `abort` instead of the connector's private token.
    pub fn with_abort(mut self, abort: AbortToken) -> Self {
        self.abort = abort;
        self
    }

    pub fn inventory(&self) -> &Arc<HostInventory> {
        &self.inventory
    }

    pub fn abort_token(&self) -> &AbortToken {
        &self.abort
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect to `host` through any working relay.
    pub async fn connect(&self, host: &str) -> Result<Session<T>, ConnectError> {
        self.abort.check()?;
        let lease = self
            .inventory
            .acquire_exact(host)
            .map_err(|_| ConnectError::HostUnavailable(host.to_string()))?;

        let (relay_name, relay) = match self.open_relay().await {
            Ok(r) => r,
            Err(e) => {
                self.give_back(lease);
                return Err(e);
            }
        };

        let attempt = self.transport.connect_target(&relay, host, self.timeout).await;
        match attempt {
            Ok(target) => Ok(self.session(lease, relay_name, relay, target)),
            Err(source) => {
                tracing::warn!(host, relay = %relay_name, error = %source, "failed machine connection");
                close_hop(relay, &relay_name).await;
                self.give_back(lease);
                Err(ConnectError::ConnectionFailed {
                    host: host.to_string(),
                    source,
                })
            }
        }
    }

    /// Connect to one of `candidates` (the whole inventory when `None`), chosen
    /// at random, through a single relay. Hosts that fail are dropped from the
    /// candidate set for this call and returned to the inventory.
    pub async fn connect_any(&self, candidates: Option<&[String]>) -> Result<Session<T>, ConnectError> {
        self.abort.check()?;
        let mut remaining: Vec<String> = match candidates {
            Some(c) => c.to_vec(),
            None => self.inventory.snapshot(),
        };
        if !remaining.iter().any(|h| self.inventory.is_available(h)) {
            return Err(ConnectError::NoHostAvailable);
        }

        let (relay_name, relay) = self.open_relay().await?;
        loop {
            if let Err(aborted) = self.abort.check() {
                close_hop(relay, &relay_name).await;
                return Err(aborted.into());
            }
            let lease = match self.inventory.acquire_host(Some(remaining.as_slice())) {
                Ok(lease) => lease,
                Err(_) => {
                    close_hop(relay, &relay_name).await;
                    return Err(ConnectError::NoHostAvailable);
                }
            };
            remaining.retain(|h| h != lease.host());

            let attempt = self
                .transport
                .connect_target(&relay, lease.host(), self.timeout)
                .await;
            match attempt {
                Ok(target) => return Ok(self.session(lease, relay_name, relay, target)),
                Err(e) => {
                    tracing::warn!(host = lease.host(), relay = %relay_name, error = %e, "failed machine connection");
                    self.give_back(lease);
                }
            }
        }
    }

    /// Authenticate to the first relay (random order) that accepts.
    async fn open_relay(&self) -> Result<(String, T::Relay), ConnectError> {
        let mut trial = self.relays.trial_order();
        let tried = trial.len();
        while let Some(relay) = trial.pop() {
            self.abort.check()?;
            match self.transport.connect_relay(&relay, self.timeout).await {
                Ok(hop) => {
                    tracing::debug!(relay = %relay, "relay connected");
                    return Ok((relay, hop));
                }
                Err(e) => tracing::warn!(relay = %relay, error = %e, "failed relay connection"),
            }
        }
        Err(ConnectError::NoRelayAvailable { tried })
    }

    fn session(
        &self,
        lease: HostLease,
        relay_name: String,
        relay: T::Relay,
        target: T::Target,
    ) -> Session<T> {
        tracing::info!(host = lease.host(), relay = %relay_name, "session opened");
        Session::new(lease, relay_name, relay, target, Arc::clone(&self.inventory))
    }

    fn give_back(&self, lease: HostLease) {
        if let Err(e) = self.inventory.release(lease) {
            tracing::error!(error = %e, "inventory rejected returned host");
        }
    }
}

async fn close_hop<H: Hop>(hop: H, name: &str) {
    if let Err(e) = hop.disconnect().await {
        tracing::debug!(host = name, error = %e, "disconnect failed");
    }
}
