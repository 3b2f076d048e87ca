//! Batch outcome types.

use std::cmp::Ordering;
use std::path::PathBuf;

use super::download::DownloadJob;

/// Everything a batch produced: per-item successes plus the items that still
/// failed after the last pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<S, F> {
    pub successes: Vec<S>,
    pub failed: Vec<F>,
}

impl<S, F> Default for BatchResult<S, F> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<S, F> BatchResult<S, F> {
    /// True when nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn sort_by<C>(&mut self, compare: C)
    where
        C: FnMut(&S, &S) -> Ordering,
    {
        self.successes.sort_by(compare);
    }
}

/// A probe record taken on `host`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord<R> {
    pub host: String,
    pub record: R,
}

/// A job whose file is in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub job: DownloadJob,
    pub host: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// A job that did not produce its file in the last pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub job: DownloadJob,
    /// Host that ran the fetch, when one was reached.
    pub host: Option<String>,
    pub reason: String,
}
