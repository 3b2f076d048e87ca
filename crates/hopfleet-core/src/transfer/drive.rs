//! Running many transfers at once.
//!
//! `Tasks` gives every transfer its own tokio task; `Stepped` advances all of
//! them round-robin from the calling task, one chunk each per sweep. Both
//! return outcomes in input order.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;

use super::{Step, TransferError, TransferTask};
use crate::config::TransferBackend;

/// Final state of one driven transfer.
#[derive(Debug)]
pub struct TransferOutcome<W> {
    /// `None` only when the transfer's task panicked and took the sink with it.
    pub sink: Option<W>,
    /// Bytes written on success.
    pub result: Result<u64, TransferError>,
}

/// Drive `tasks` to completion with the chosen backend.
pub async fn drive<R, E, W>(
    tasks: Vec<TransferTask<R, E, W>>,
    chunk_size: usize,
    backend: TransferBackend,
) -> Vec<TransferOutcome<W>>
where
    R: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    match backend {
        TransferBackend::Tasks => drive_spawned(tasks, chunk_size).await,
        TransferBackend::Stepped => drive_stepped(tasks, chunk_size).await,
    }
}

/// One tokio task per transfer.
pub async fn drive_spawned<R, E, W>(
    tasks: Vec<TransferTask<R, E, W>>,
    chunk_size: usize,
) -> Vec<TransferOutcome<W>>
where
    R: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let total = tasks.len();
    let mut join_set = JoinSet::new();
    for (idx, mut task) in tasks.into_iter().enumerate() {
        join_set.spawn(async move {
            let result = task.run_to_end(chunk_size).await;
            (
                idx,
                TransferOutcome {
                    sink: Some(task.into_sink()),
                    result,
                },
            )
        });
    }

    let mut slots: Vec<Option<TransferOutcome<W>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, outcome)) => slots[idx] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "transfer task panicked"),
        }
    }
    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| TransferOutcome {
                sink: None,
                result: Err(TransferError::Join("task panicked".into())),
            })
        })
        .collect()
}

/// Round-robin from the current task: each sweep advances every live
/// transfer by one chunk; finished ones drop out of the rotation.
pub async fn drive_stepped<R, E, W>(
    tasks: Vec<TransferTask<R, E, W>>,
    chunk_size: usize,
) -> Vec<TransferOutcome<W>>
where
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let total = tasks.len();
    let mut slots: Vec<Option<TransferOutcome<W>>> = (0..total).map(|_| None).collect();
    let mut live: Vec<(usize, TransferTask<R, E, W>)> = tasks.into_iter().enumerate().collect();

    while !live.is_empty() {
        let mut i = 0;
        while i < live.len() {
            let task = &mut live[i].1;
            let finished = match task.advance(chunk_size).await {
                Ok(Step::Pending) => None,
                Ok(Step::Complete) => Some(Ok(task.bytes_transferred())),
                Err(e) => Some(Err(e)),
            };
            match finished {
                Some(result) => {
                    let (idx, task) = live.remove(i);
                    slots[idx] = Some(TransferOutcome {
                        sink: Some(task.into_sink()),
                        result,
                    });
                }
                None => i += 1,
            }
        }
    }
    slots.into_iter().flatten().collect()
}
