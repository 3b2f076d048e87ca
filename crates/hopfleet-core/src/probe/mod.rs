//! Remote probes: a command to run on each host and a parser for its stdout.

mod ping;

pub use ping::{PingProbe, PingStats, DEFAULT_PING_COUNT};

/// Probe output could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("can't parse probe output: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A measurement taken by running one command on every host of a batch.
pub trait Probe: Send + Sync {
    type Record: Send + 'static;

    /// Shell command run on each host.
    fn command(&self) -> String;

    /// Parse the command's full stdout.
    fn parse(&self, stdout: &str) -> Result<Self::Record, ParseError>;
}
