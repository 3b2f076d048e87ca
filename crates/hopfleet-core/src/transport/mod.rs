//! Hop-level transport.
//!
//! A `Transport` knows how to authenticate to a relay and how to reach a
//! target through an already-open relay. The connector and the scheduler only
//! see these traits; `SshTransport` is the production implementation and the
//! integration tests plug in an in-memory one.

mod command;
mod ssh;

use std::future::Future;
use std::time::Duration;

pub use command::{ExitStatus, RemoteCommand, RemoteStream};
pub(crate) use command::read_all;
pub use ssh::{Credentials, SshHop, SshTransport};

/// Failure of a single hop operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("authentication rejected for {0}")]
    AuthRejected(String),
    #[error("key {path}: {reason}")]
    Key { path: String, reason: String },
    #[error("ssh: {0}")]
    Ssh(String),
    #[error("channel: {0}")]
    Channel(String),
}

/// One authenticated SSH connection (relay or target).
pub trait Hop: Send + Sync + 'static {
    /// Close the connection. Errors are informational; the hop is gone either way.
    fn disconnect(self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A hop that can run commands.
pub trait Shell: Hop {
    /// Start `command`; output streams become readable as the remote side writes.
    fn exec(&self, command: &str)
        -> impl Future<Output = Result<RemoteCommand, TransportError>> + Send;
}

/// Builds relay and target connections.
pub trait Transport: Send + Sync + 'static {
    type Relay: Hop;
    type Target: Shell;

    /// Authenticate to `relay`, bounded by `timeout`.
    fn connect_relay(
        &self,
        relay: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Relay, TransportError>> + Send;

    /// Open a tunnel to `host` through `relay` and authenticate over it, bounded by `timeout`.
    fn connect_target(
        &self,
        relay: &Self::Relay,
        host: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Target, TransportError>> + Send;
}
