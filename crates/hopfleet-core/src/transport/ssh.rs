//! russh-backed two-hop transport.
//!
//! Relay: plain SSH to `relay:port`. Target: a `direct-tcpip` channel opened on
//! the relay to `target:port` (originator `127.0.0.1:22`), with a second SSH
//! session negotiated over that channel. Host keys are accepted without a
//! prompt on both hops.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use russh::client::{self, Handle};
use russh::keys::{load_secret_key, ssh_key, PrivateKey, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect, Preferred};
use tokio::sync::oneshot;

use super::command::{RemoteCommand, RemoteStream, STDOUT_BUFFER_CHUNKS};
use super::{Hop, Shell, Transport, TransportError};
use crate::config::{expand_home, HopfleetConfig};

const ORIGINATOR_ADDRESS: &str = "127.0.0.1";
const ORIGINATOR_PORT: u32 = 22;

/// Login name and key files for both hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub relay_key_path: PathBuf,
    pub target_key_path: PathBuf,
}

impl Credentials {
    pub fn from_config(cfg: &HopfleetConfig) -> anyhow::Result<Self> {
        Ok(Self {
            username: cfg.resolved_username()?,
            relay_key_path: expand_home(&cfg.relay_key_path),
            target_key_path: expand_home(&cfg.target_key_path),
        })
    }
}

/// Client handler that trusts every server key.
pub struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Algorithm preferences; with `compression` the zlib variants are offered before "none".
fn preferred_algorithms(compression: bool) -> Preferred {
    let mut preferred = Preferred::default();
    let mut algs = preferred.compression.into_owned();
    if compression {
        algs.sort_by_key(|name| name.as_ref() == "none");
    } else {
        algs.retain(|name| name.as_ref() == "none");
    }
    preferred.compression = Cow::Owned(algs);
    preferred
}

fn load_key(path: &Path) -> Result<Arc<PrivateKey>, TransportError> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| TransportError::Key {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

fn ssh_err(e: russh::Error) -> TransportError {
    TransportError::Ssh(e.to_string())
}

fn channel_err(e: russh::Error) -> TransportError {
    TransportError::Channel(e.to_string())
}

async fn authenticate(
    handle: &mut Handle<AcceptAnyHostKey>,
    username: &str,
    key: Arc<PrivateKey>,
    host: &str,
) -> Result<(), TransportError> {
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(ssh_err)?
        .flatten();
    let auth = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, hash_alg))
        .await
        .map_err(ssh_err)?;
    if !auth.success() {
        return Err(TransportError::AuthRejected(host.to_string()));
    }
    Ok(())
}

/// Production transport: keys are loaded once and shared by every hop.
pub struct SshTransport {
    username: String,
    relay_key: Arc<PrivateKey>,
    target_key: Arc<PrivateKey>,
    port: u16,
    config: Arc<client::Config>,
}

impl SshTransport {
    pub fn new(credentials: &Credentials, port: u16, compression: bool) -> Result<Self, TransportError> {
        let config = client::Config {
            preferred: preferred_algorithms(compression),
            ..Default::default()
        };
        Ok(Self {
            username: credentials.username.clone(),
            relay_key: load_key(&credentials.relay_key_path)?,
            target_key: load_key(&credentials.target_key_path)?,
            port,
            config: Arc::new(config),
        })
    }

    pub fn from_config(cfg: &HopfleetConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::from_config(cfg)?;
        Self::new(&credentials, cfg.port, cfg.compression).context("load ssh keys")
    }
}

impl Transport for SshTransport {
    type Relay = SshHop;
    type Target = SshHop;

    async fn connect_relay(&self, relay: &str, timeout: Duration) -> Result<SshHop, TransportError> {
        let attempt = async {
            let mut handle = client::connect(
                Arc::clone(&self.config),
                (relay, self.port),
                AcceptAnyHostKey,
            )
            .await
            .map_err(ssh_err)?;
            authenticate(&mut handle, &self.username, Arc::clone(&self.relay_key), relay).await?;
            Ok(SshHop {
                handle,
                host: relay.to_string(),
            })
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn connect_target(
        &self,
        relay: &SshHop,
        host: &str,
        timeout: Duration,
    ) -> Result<SshHop, TransportError> {
        let attempt = async {
            let channel = relay
                .handle
                .channel_open_direct_tcpip(
                    host,
                    u32::from(self.port),
                    ORIGINATOR_ADDRESS,
                    ORIGINATOR_PORT,
                )
                .await
                .map_err(channel_err)?;
            let mut handle = client::connect_stream(
                Arc::clone(&self.config),
                channel.into_stream(),
                AcceptAnyHostKey,
            )
            .await
            .map_err(ssh_err)?;
            authenticate(&mut handle, &self.username, Arc::clone(&self.target_key), host).await?;
            Ok(SshHop {
                handle,
                host: host.to_string(),
            })
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }
}

/// One authenticated russh connection.
pub struct SshHop {
    handle: Handle<AcceptAnyHostKey>,
    host: String,
}

impl SshHop {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Hop for SshHop {
    async fn disconnect(self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(ssh_err)
    }
}

impl Shell for SshHop {
    async fn exec(&self, command: &str) -> Result<RemoteCommand, TransportError> {
        let mut channel = self.handle.channel_open_session().await.map_err(channel_err)?;
        channel.exec(true, command).await.map_err(channel_err)?;

        let (out_tx, stdout) = RemoteStream::bounded(STDOUT_BUFFER_CHUNKS);
        let (err_tx, stderr) = RemoteStream::unbounded();
        let (exit_tx, exit_rx) = oneshot::channel();
        let host = self.host.clone();

        // Pump channel messages into the two streams. Stdout applies backpressure;
        // stderr never blocks so a reader draining stdout first cannot deadlock.
        tokio::spawn(async move {
            let mut out_tx = Some(out_tx);
            let mut err_tx = Some(err_tx);
            let mut status = None;
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => {
                        if let Some(tx) = &out_tx {
                            if tx.send(data.to_vec()).await.is_err() {
                                out_tx = None;
                            }
                        }
                    }
                    ChannelMsg::ExtendedData { data, ext: 1 } => {
                        if let Some(tx) = &err_tx {
                            let _ = tx.send(data.to_vec());
                        }
                    }
                    ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                    ChannelMsg::Eof => {
                        out_tx = None;
                        err_tx = None;
                    }
                    _ => {}
                }
            }
            tracing::debug!(host = %host, ?status, "remote command channel closed");
            let _ = exit_tx.send(status);
        });

        Ok(RemoteCommand::new(stdout, stderr, exit_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_offers_zlib_first() {
        let preferred = preferred_algorithms(true);
        let names: Vec<&str> = preferred.compression.iter().map(|n| n.as_ref()).collect();
        assert!(names.contains(&"none"));
        assert_eq!(names.last(), Some(&"none"));
    }

    #[test]
    fn no_compression_offers_only_none() {
        let preferred = preferred_algorithms(false);
        let names: Vec<&str> = preferred.compression.iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, vec!["none"]);
    }

    #[test]
    fn missing_key_file_is_a_key_error() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials {
            username: "someone".into(),
            relay_key_path: dir.path().join("relay_key"),
            target_key_path: dir.path().join("target_key"),
        };
        let err = SshTransport::new(&credentials, 22, true).err().expect("key load fails");
        assert!(matches!(err, TransportError::Key { .. }), "{err}");
    }

    #[test]
    fn credentials_expand_home() {
        let cfg = HopfleetConfig {
            username: Some("ab123".into()),
            relay_key_path: PathBuf::from("/keys/relay"),
            ..HopfleetConfig::default()
        };
        let creds = Credentials::from_config(&cfg).unwrap();
        assert_eq!(creds.username, "ab123");
        assert_eq!(creds.relay_key_path, PathBuf::from("/keys/relay"));
        assert!(!creds.target_key_path.starts_with("~") || std::env::var_os("HOME").is_none());
    }
}
