//! In-memory transport: relays and hosts that accept or refuse on demand and
//! commands that answer with canned output. Every connect, exec and disconnect
//! is appended to an event log the tests can inspect.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hopfleet_core::transport::{Hop, RemoteCommand, Shell, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RelayConnect(String),
    TargetConnect(String),
    Exec { host: String, command: String },
    Disconnect(String),
}

#[derive(Clone)]
struct Reply {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: u32,
}

impl Reply {
    /// Exit status follows stderr unless given explicitly.
    fn new(stdout: &[u8], stderr: &[u8]) -> Self {
        let status = if stderr.is_empty() { 0 } else { 1 };
        Self {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            status,
        }
    }
}

#[derive(Default)]
struct State {
    failing_relays: HashSet<String>,
    failing_hosts: HashSet<String>,
    replies: HashMap<String, Reply>,
    host_replies: HashMap<(String, String), Reply>,
    events: Vec<Event>,
    open: usize,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_relay(self, relay: &str) -> Self {
        self.lock().failing_relays.insert(relay.to_string());
        self
    }

    pub fn fail_host(self, host: &str) -> Self {
        self.lock().failing_hosts.insert(host.to_string());
        self
    }

    /// Every host answers `command` with this output.
    pub fn reply(self, command: &str, stdout: &[u8], stderr: &[u8]) -> Self {
        self.lock()
            .replies
            .insert(command.to_string(), Reply::new(stdout, stderr));
        self
    }

    /// Every host answers `command` with this output and exit status.
    pub fn reply_with_status(self, command: &str, stdout: &[u8], stderr: &[u8], status: u32) -> Self {
        self.lock().replies.insert(
            command.to_string(),
            Reply {
                status,
                ..Reply::new(stdout, stderr)
            },
        );
        self
    }

    /// `host` answers `command` with this output, overriding `reply`.
    pub fn reply_on(self, host: &str, command: &str, stdout: &[u8], stderr: &[u8]) -> Self {
        self.lock().host_replies.insert(
            (host.to_string(), command.to_string()),
            Reply::new(stdout, stderr),
        );
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn target_attempts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::TargetConnect(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn relay_attempts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RelayConnect(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Hops connected and not yet disconnected.
    pub fn open_hops(&self) -> usize {
        self.lock().open
    }

    fn hop(&self, name: &str) -> FakeHop {
        self.lock().open += 1;
        FakeHop {
            name: name.to_string(),
            transport: self.clone(),
        }
    }
}

pub struct FakeHop {
    name: String,
    transport: FakeTransport,
}

impl Hop for FakeHop {
    async fn disconnect(self) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        state.open -= 1;
        state.events.push(Event::Disconnect(self.name.clone()));
        Ok(())
    }
}

impl Shell for FakeHop {
    async fn exec(&self, command: &str) -> Result<RemoteCommand, TransportError> {
        let mut state = self.transport.lock();
        state.events.push(Event::Exec {
            host: self.name.clone(),
            command: command.to_string(),
        });
        let reply = state
            .host_replies
            .get(&(self.name.clone(), command.to_string()))
            .or_else(|| state.replies.get(command))
            .cloned();
        Ok(match reply {
            Some(reply) => RemoteCommand::finished(reply.stdout, reply.stderr, reply.status),
            None => RemoteCommand::finished(Vec::new(), format!("sh: {command}: not found\n"), 127),
        })
    }
}

impl Transport for FakeTransport {
    type Relay = FakeHop;
    type Target = FakeHop;

    async fn connect_relay(&self, relay: &str, _timeout: Duration) -> Result<FakeHop, TransportError> {
        let refused = {
            let mut state = self.lock();
            state.events.push(Event::RelayConnect(relay.to_string()));
            state.failing_relays.contains(relay)
        };
        if refused {
            return Err(TransportError::AuthRejected(relay.to_string()));
        }
        Ok(self.hop(relay))
    }

    async fn connect_target(
        &self,
        _relay: &FakeHop,
        host: &str,
        _timeout: Duration,
    ) -> Result<FakeHop, TransportError> {
        let refused = {
            let mut state = self.lock();
            state.events.push(Event::TargetConnect(host.to_string()));
            state.failing_hosts.contains(host)
        };
        if refused {
            return Err(TransportError::Timeout(Duration::from_secs(5)));
        }
        Ok(self.hop(host))
    }
}
