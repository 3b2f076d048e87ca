//! Output handles of a running remote command.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{mpsc, oneshot};

/// Stdout chunks buffered between the channel pump and the reader before the
/// pump waits (and the SSH window stops the remote side).
pub(crate) const STDOUT_BUFFER_CHUNKS: usize = 32;

enum Chunks {
    Bounded(mpsc::Receiver<Vec<u8>>),
    Unbounded(mpsc::UnboundedReceiver<Vec<u8>>),
}

/// Byte stream fed by a channel of chunks. EOF once every sender is dropped.
pub struct RemoteStream {
    rx: Chunks,
    current: Vec<u8>,
    pos: usize,
}

impl RemoteStream {
    pub(crate) fn bounded(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::from_chunks(Chunks::Bounded(rx)))
    }

    pub(crate) fn unbounded() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::from_chunks(Chunks::Unbounded(rx)))
    }

    fn from_chunks(rx: Chunks) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }

    /// A stream that yields `data` then EOF.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let (tx, stream) = Self::unbounded();
        let data = data.into();
        if !data.is_empty() {
            let _ = tx.send(data);
        }
        stream
    }
}

impl AsyncRead for RemoteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.current.len() {
                let n = buf.remaining().min(this.current.len() - this.pos);
                buf.put_slice(&this.current[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            let next = match &mut this.rx {
                Chunks::Bounded(rx) => ready!(rx.poll_recv(cx)),
                Chunks::Unbounded(rx) => ready!(rx.poll_recv(cx)),
            };
            match next {
                Some(chunk) => {
                    this.current = chunk;
                    this.pos = 0;
                }
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Streams of one remote invocation. Each stream is consumed at most once.
pub struct RemoteCommand {
    pub stdout: RemoteStream,
    pub stderr: RemoteStream,
    exit: oneshot::Receiver<Option<u32>>,
}

impl RemoteCommand {
    pub(crate) fn new(
        stdout: RemoteStream,
        stderr: RemoteStream,
        exit: oneshot::Receiver<Option<u32>>,
    ) -> Self {
        Self {
            stdout,
            stderr,
            exit,
        }
    }

    /// A command that already finished with the given output.
    pub fn finished(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, status: u32) -> Self {
        let (tx, exit) = oneshot::channel();
        let _ = tx.send(Some(status));
        Self::new(
            RemoteStream::from_bytes(stdout),
            RemoteStream::from_bytes(stderr),
            exit,
        )
    }

    /// Split into stdout, stderr and the exit status receiver.
    pub fn into_parts(self) -> (RemoteStream, RemoteStream, ExitStatus) {
        (self.stdout, self.stderr, ExitStatus(self.exit))
    }

    /// Read stdout to EOF, each read bounded by `read_timeout`.
    pub async fn collect_stdout(
        &mut self,
        read_timeout: Option<Duration>,
    ) -> io::Result<Vec<u8>> {
        read_all(&mut self.stdout, read_timeout).await
    }
}

/// Exit status of a remote command, available after its channel closes.
pub struct ExitStatus(oneshot::Receiver<Option<u32>>);

impl ExitStatus {
    /// `None` when the remote side closed without reporting a status.
    pub async fn wait(self) -> Option<u32> {
        self.0.await.ok().flatten()
    }

    /// Like `wait`, but gives up with `None` after `limit`.
    pub async fn wait_for(self, limit: Option<Duration>) -> Option<u32> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.wait()).await.ok().flatten(),
            None => self.wait().await,
        }
    }
}

/// Read `stream` to EOF; every individual read must finish within `read_timeout`.
pub(crate) async fn read_all<R>(stream: &mut R, read_timeout: Option<Duration>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let mut buf = vec![0u8; 4096];
    loop {
        let n = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.read(&mut buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "remote output stalled"))??,
            None => stream.read(&mut buf).await?,
        };
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}
