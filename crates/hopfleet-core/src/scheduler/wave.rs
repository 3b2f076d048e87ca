//! Per-wave connect and close.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::connector::{ConnectError, TunnelConnector};
use crate::session::Session;
use crate::transport::{Transport, TransportError};

/// Sessions that came up in a wave, plus the first fatal connect error.
pub(super) struct Connected<T: Transport, K> {
    pub sessions: Vec<(K, Session<T>)>,
    pub failures: Vec<(K, ConnectError)>,
    pub fatal: Option<ConnectError>,
}

/// Connect to every host of `hosts` concurrently; results keep input order.
pub(super) async fn connect_hosts<T: Transport>(
    connector: &Arc<TunnelConnector<T>>,
    hosts: &[String],
) -> Connected<T, String> {
    let mut join_set = JoinSet::new();
    for (idx, host) in hosts.iter().cloned().enumerate() {
        let connector = Arc::clone(connector);
        join_set.spawn(async move {
            let res = connector.connect(&host).await;
            (idx, res)
        });
    }
    let results = join_ordered(join_set, hosts.len()).await;
    partition(hosts.iter().cloned().zip(results))
}

/// Open one session per key on any available host concurrently.
pub(super) async fn connect_any_each<T: Transport, K: Clone>(
    connector: &Arc<TunnelConnector<T>>,
    keys: &[K],
) -> Connected<T, K> {
    let mut join_set = JoinSet::new();
    for idx in 0..keys.len() {
        let connector = Arc::clone(connector);
        join_set.spawn(async move {
            let res = connector.connect_any(None).await;
            (idx, res)
        });
    }
    let results = join_ordered(join_set, keys.len()).await;
    partition(keys.iter().cloned().zip(results))
}

async fn join_ordered<T: Transport>(
    mut join_set: JoinSet<(usize, Result<Session<T>, ConnectError>)>,
    total: usize,
) -> Vec<Result<Session<T>, ConnectError>> {
    let mut slots: Vec<Option<Result<Session<T>, ConnectError>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, res)) => slots[idx] = Some(res),
            Err(e) => tracing::error!(error = %e, "connect task panicked"),
        }
    }
    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(ConnectError::ConnectionFailed {
                    host: String::new(),
                    source: TransportError::Ssh("connect task panicked".into()),
                })
            })
        })
        .collect()
}

fn partition<T: Transport, K>(
    results: impl Iterator<Item = (K, Result<Session<T>, ConnectError>)>,
) -> Connected<T, K> {
    let mut connected = Connected {
        sessions: Vec::new(),
        failures: Vec::new(),
        fatal: None,
    };
    for (key, res) in results {
        match res {
            Ok(session) => connected.sessions.push((key, session)),
            Err(e) if e.is_fatal() => {
                if connected.fatal.is_none() {
                    connected.fatal = Some(e);
                }
            }
            Err(e) => connected.failures.push((key, e)),
        }
    }
    connected
}

/// Close every session, logging (not propagating) inventory complaints.
pub(super) async fn close_all<T: Transport, K>(sessions: Vec<(K, Session<T>)>) {
    for (_, session) in sessions {
        let host = session.host().to_string();
        if let Err(e) = session.close().await {
            tracing::error!(host = %host, error = %e, "closing session failed");
        }
    }
}
