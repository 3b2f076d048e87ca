//! Local file lifecycle for downloads.
//!
//! Data lands in `<destination>.part` and is renamed to the destination only
//! after the transfer succeeded and the file was synced. A failed transfer
//! removes the temp file, so a destination path never holds a partial file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Temporary file suffix used before the final rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// A download destination whose data is still being written to its temp file.
#[derive(Debug)]
pub struct PartFile {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl PartFile {
    /// Create (or truncate) `<final_path>.part` and return it with its open handle.
    pub async fn create(final_path: &Path) -> Result<(Self, File)> {
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok((
            PartFile {
                temp_path,
                final_path: final_path.to_path_buf(),
            },
            file,
        ))
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Sync `file` and move the temp file onto the destination. On failure
    /// the temp file is removed.
    pub async fn finalize(self, file: File) -> Result<PathBuf> {
        match self.commit(file).await {
            Ok(()) => Ok(self.final_path),
            Err(e) => {
                self.discard().await;
                Err(e)
            }
        }
    }

    async fn commit(&self, file: File) -> Result<()> {
        file.sync_all()
            .await
            .with_context(|| format!("failed to sync {}", self.temp_path.display()))?;
        drop(file);
        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .with_context(|| {
                format!(
                    "failed to rename {} to {}",
                    self.temp_path.display(),
                    self.final_path.display()
                )
            })
    }

    /// Remove the temp file. A file that is already gone is not an error.
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "failed to remove temp file")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("file.iso"));
        assert_eq!(p.to_string_lossy(), "file.iso.part");
        let p2 = temp_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.zip.part");
    }

    #[tokio::test]
    async fn create_write_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("output.bin");

        let (part, mut file) = PartFile::create(&final_path).await.unwrap();
        assert!(part.temp_path().exists());
        assert!(!final_path.exists());
        file.write_all(b"hello world").await.unwrap();
        let tp = part.temp_path().to_path_buf();
        let done = part.finalize(file).await.unwrap();

        assert_eq!(done, final_path);
        assert!(!tp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn create_truncates_stale_temp() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("stale.bin");
        std::fs::write(temp_path(&final_path), b"old contents").unwrap();

        let (part, mut file) = PartFile::create(&final_path).await.unwrap();
        file.write_all(b"new").await.unwrap();
        part.finalize(file).await.unwrap();
        assert_eq!(std::fs::read(&final_path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn discard_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("failed.bin");
        let (part, file) = PartFile::create(&final_path).await.unwrap();
        drop(file);
        let tp = part.temp_path().to_path_buf();
        part.discard().await;
        assert!(!tp.exists());
        assert!(!final_path.exists());
    }
}
