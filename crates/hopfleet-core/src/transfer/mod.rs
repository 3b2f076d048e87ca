//! Chunked remote-to-local transfers.
//!
//! A `TransferTask` pulls a remote command's stdout into a local sink one
//! bounded chunk per `advance`. When stdout reaches EOF the command's stderr
//! decides the outcome: empty means done, anything else fails the transfer
//! with that text. Drivers in `drive` run many tasks side by side.

mod drive;

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::control::{AbortToken, Aborted};
use crate::transport::read_all;

pub use drive::{drive, drive_spawned, drive_stepped, TransferOutcome};

/// Default bytes per `advance`.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Running,
    Done,
    Failed,
}

/// Result of one successful `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A chunk was written; call `advance` again.
    Pending,
    /// Source exhausted with no remote error.
    Complete,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Remote stderr content at end of stream, verbatim.
    #[error("remote error: {0}")]
    Remote(String),
    #[error("no data within {0:?}")]
    Stalled(Duration),
    #[error("source read failed: {0}")]
    Source(#[source] io::Error),
    #[error("sink write failed: {0}")]
    Sink(#[source] io::Error),
    #[error("transfer already finished")]
    Finished,
    #[error("transfer task failed: {0}")]
    Join(String),
    #[error(transparent)]
    Aborted(#[from] Aborted),
}

/// One outstanding pull: data stream `R`, error stream `E`, destination `W`.
pub struct TransferTask<R, E, W> {
    source: R,
    errors: E,
    sink: W,
    state: TransferState,
    bytes: u64,
    read_timeout: Option<Duration>,
    abort: Option<AbortToken>,
    buf: Vec<u8>,
}

impl<R, E, W> TransferTask<R, E, W>
where
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(source: R, errors: E, sink: W) -> Self {
        Self {
            source,
            errors,
            sink,
            state: TransferState::Running,
            bytes: 0,
            read_timeout: None,
            abort: None,
            buf: Vec::new(),
        }
    }

    /// Fail the transfer when a single read waits longer than `limit`.
    pub fn with_read_timeout(mut self, limit: Option<Duration>) -> Self {
        self.read_timeout = limit;
        self
    }

    pub fn with_abort(mut self, abort: AbortToken) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes
    }

    /// Read at most `chunk_size` bytes and append them to the sink.
    ///
    /// Once the task is done or failed every further call returns
    /// `TransferError::Finished` and touches nothing.
    pub async fn advance(&mut self, chunk_size: usize) -> Result<Step, TransferError> {
        if self.state != TransferState::Running {
            return Err(TransferError::Finished);
        }
        match self.step(chunk_size).await {
            Ok(Step::Pending) => Ok(Step::Pending),
            Ok(Step::Complete) => {
                self.state = TransferState::Done;
                Ok(Step::Complete)
            }
            Err(e) => {
                self.state = TransferState::Failed;
                Err(e)
            }
        }
    }

    async fn step(&mut self, chunk_size: usize) -> Result<Step, TransferError> {
        if let Some(abort) = &self.abort {
            abort.check()?;
        }
        let chunk_size = chunk_size.max(1);
        if self.buf.len() < chunk_size {
            self.buf.resize(chunk_size, 0);
        }
        let read = self.source.read(&mut self.buf[..chunk_size]);
        let n = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| TransferError::Stalled(limit))?,
            None => read.await,
        }
        .map_err(TransferError::Source)?;

        if n > 0 {
            self.sink
                .write_all(&self.buf[..n])
                .await
                .map_err(TransferError::Sink)?;
            self.bytes += n as u64;
            return Ok(Step::Pending);
        }

        let err = read_all(&mut self.errors, self.read_timeout)
            .await
            .map_err(TransferError::Source)?;
        if !err.is_empty() {
            return Err(TransferError::Remote(String::from_utf8_lossy(&err).into_owned()));
        }
        self.sink.flush().await.map_err(TransferError::Sink)?;
        Ok(Step::Complete)
    }

    /// Advance until the task finishes; returns the bytes written.
    pub async fn run_to_end(&mut self, chunk_size: usize) -> Result<u64, TransferError> {
        loop {
            if self.advance(chunk_size).await? == Step::Complete {
                return Ok(self.bytes);
            }
        }
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RemoteStream;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn advance_count_is_chunks_plus_one() {
        for (len, chunk) in [(10_000usize, 4096usize), (8192, 4096), (1, 4096), (0, 16)] {
            let data = payload(len);
            let mut task = TransferTask::new(&data[..], &b""[..], Vec::new());
            let mut calls = 0;
            loop {
                calls += 1;
                if task.advance(chunk).await.unwrap() == Step::Complete {
                    break;
                }
            }
            assert_eq!(calls, len.div_ceil(chunk) + 1, "len {len} chunk {chunk}");
            assert_eq!(task.state(), TransferState::Done);
            assert_eq!(task.bytes_transferred(), len as u64);
            assert_eq!(task.into_sink(), data);
        }
    }

    #[tokio::test]
    async fn error_stream_fails_the_transfer_verbatim() {
        let stderr = "wget: unable to resolve host address 'nowhere'\n";
        let mut task = TransferTask::new(&b"partial"[..], stderr.as_bytes(), Vec::new());
        assert_eq!(task.advance(4096).await.unwrap(), Step::Pending);
        match task.advance(4096).await {
            Err(TransferError::Remote(text)) => assert_eq!(text, stderr),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(task.state(), TransferState::Failed);
        assert!(matches!(task.advance(4096).await, Err(TransferError::Finished)));
    }

    #[tokio::test]
    async fn done_task_rejects_further_steps() {
        let mut task = TransferTask::new(&b""[..], &b""[..], Vec::new());
        assert_eq!(task.advance(8).await.unwrap(), Step::Complete);
        assert!(matches!(task.advance(8).await, Err(TransferError::Finished)));
        assert_eq!(task.state(), TransferState::Done);
    }

    #[tokio::test]
    async fn run_to_end_collects_whole_stream() {
        let data = payload(20_000);
        let mut task = TransferTask::new(
            RemoteStream::from_bytes(data.clone()),
            RemoteStream::from_bytes(Vec::new()),
            Vec::new(),
        );
        assert_eq!(task.run_to_end(1000).await.unwrap(), 20_000);
        assert_eq!(task.into_sink(), data);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_source_stalls_after_read_timeout() {
        let (_tx, source) = RemoteStream::bounded(1);
        let mut task = TransferTask::new(source, RemoteStream::from_bytes(Vec::new()), Vec::new())
            .with_read_timeout(Some(Duration::from_secs(30)));
        let err = task.advance(4096).await.unwrap_err();
        assert!(matches!(err, TransferError::Stalled(d) if d == Duration::from_secs(30)));
        assert_eq!(task.state(), TransferState::Failed);
    }

    #[tokio::test]
    async fn aborted_token_stops_the_transfer() {
        let abort = AbortToken::new();
        let mut task =
            TransferTask::new(&b"data"[..], &b""[..], Vec::new()).with_abort(abort.clone());
        abort.abort();
        assert!(matches!(task.advance(2).await, Err(TransferError::Aborted(_))));
        assert_eq!(task.state(), TransferState::Failed);
        assert!(task.into_sink().is_empty());
    }
}
