//! The snapshot file shared by the scraper (writer) and the API (readers).

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::Snapshot;
use crate::error::CacheError;

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<Snapshot>, CacheError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| CacheError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the file in one step: write a uniquely named sibling temp
    /// file, then rename it over the old one, so readers see either the old
    /// or the new snapshot. Concurrent stores never share a temp file.
    pub async fn store(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let body = serde_json::to_vec(snapshot)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replace(&dir, &path, &body))
            .await
            .map_err(|e| CacheError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })??;

        info!(
            path = %self.path.display(),
            showings = snapshot.showings.len(),
            "cache written"
        );
        Ok(())
    }
}

fn write_replace(dir: &Path, path: &Path, body: &[u8]) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    // Removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix(".showtimes")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;
    tmp.write_all(body).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
