//! A live two-hop connection bound to one leased host.

use std::sync::Arc;

use crate::inventory::{HostInventory, HostLease, InventoryError};
use crate::transport::{Hop, RemoteCommand, Shell, Transport, TransportError};

/// Owns the relay hop, the target hop tunneled through it, and the lease on
/// the target host. `close` consumes the session, so it runs at most once.
///
/// A session dropped without `close` still returns its host; the hops are
/// then torn down by dropping their connections.
pub struct Session<T: Transport> {
    lease: Option<HostLease>,
    relay_name: String,
    relay: Option<T::Relay>,
    target: Option<T::Target>,
    inventory: Arc<HostInventory>,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(
        lease: HostLease,
        relay_name: String,
        relay: T::Relay,
        target: T::Target,
        inventory: Arc<HostInventory>,
    ) -> Self {
        Self {
            lease: Some(lease),
            relay_name,
            relay: Some(relay),
            target: Some(target),
            inventory,
        }
    }

    pub fn host(&self) -> &str {
        self.lease.as_ref().map(HostLease::host).unwrap_or_default()
    }

    pub fn relay(&self) -> &str {
        &self.relay_name
    }

    /// Run `command` on the target host.
    pub async fn execute(&self, command: &str) -> Result<RemoteCommand, TransportError> {
        match &self.target {
            Some(target) => target.exec(command).await,
            None => Err(TransportError::Channel("session already closed".into())),
        }
    }

    /// Disconnect the target, then the relay, then return the host to the inventory.
    pub async fn close(mut self) -> Result<(), InventoryError> {
        let host = self.host().to_string();
        if let Some(target) = self.target.take() {
            if let Err(e) = target.disconnect().await {
                tracing::debug!(host = %host, error = %e, "target disconnect failed");
            }
        }
        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.disconnect().await {
                tracing::debug!(relay = %self.relay_name, error = %e, "relay disconnect failed");
            }
        }
        let released = match self.lease.take() {
            Some(lease) => self.inventory.release(lease),
            None => Ok(()),
        };
        tracing::info!(host = %host, "session closed");
        released
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            tracing::warn!(host = lease.host(), "session dropped without close");
            self.target.take();
            self.relay.take();
            if let Err(e) = self.inventory.release(lease) {
                tracing::error!(error = %e, "inventory rejected returned host");
            }
        }
    }
}
