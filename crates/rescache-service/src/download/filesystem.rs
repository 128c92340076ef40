//! Support to download from the local filesystem.
//!
//! This serves `file://` URIs, mostly useful for bundled resources and for testing.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWrite;

use crate::caching::{CacheContents, CacheError};

/// Downloader implementation that copies local files.
#[derive(Debug, Default)]
pub struct FilesystemDownloader {}

impl FilesystemDownloader {
    pub fn new() -> Self {
        Self {}
    }

    /// Copies the file at `path` into `destination`.
    pub async fn download_source(
        &self,
        path: &Path,
        mut destination: impl AsyncWrite + Unpin,
    ) -> CacheContents {
        tracing::debug!("Fetching resource from {:?}", path);

        let mut file = File::open(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CacheError::NotFound,
            _ => e.into(),
        })?;
        tokio::io::copy(&mut file, &mut destination).await?;
        Ok(())
    }
}
