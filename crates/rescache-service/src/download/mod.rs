//! Durable storage of cached resources.
//!
//! The [`Storage`] trait is everything the coordinator needs from the filesystem and the
//! network. [`RemoteStorage`] is the implementation used outside of tests: it downloads `http`,
//! `https` and `file` URIs into the local filesystem.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::prelude::*;
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::caching::{CacheContents, CacheError};
use crate::config::Config;
use crate::request::ResourceRequest;
use crate::utils::http::{DownloadTimeouts, content_length_timeout, create_client};

mod filesystem;
mod http;

pub use self::filesystem::FilesystemDownloader;
pub use self::http::HttpDownloader;

/// The durable storage the coordinator keeps its resources in.
///
/// The coordinator assumes it owns the files it names, but any of them may disappear at any
/// time. Such files are treated as cache misses.
#[async_trait]
pub trait Storage: fmt::Debug + Send + Sync + 'static {
    /// Creates `path` and all of its parents. Succeeds if the directory already exists.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Recursively deletes `path`.
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Checks whether a file exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    /// Downloads the resource described by `request` to `destination`.
    ///
    /// On success, `destination` must contain the complete resource. Dropping the returned
    /// future cancels the download.
    async fn download(&self, request: &ResourceRequest, destination: &Path) -> CacheContents;

    /// Deletes the file at `path`.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// A [`Storage`] backed by the local filesystem, which fetches resources over the network.
///
/// Downloads are first written to a temporary file and atomically moved to their destination
/// once complete, so a destination only ever exists with its full contents.
#[derive(Debug)]
pub struct RemoteStorage {
    tmp_dir: PathBuf,
    timeouts: DownloadTimeouts,
    http: HttpDownloader,
    fs: FilesystemDownloader,
}

impl RemoteStorage {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let timeouts = config.timeouts();
        let client = create_client(&timeouts, &config.user_agent)?;

        Ok(Self {
            tmp_dir: config.tmp_dir(),
            timeouts,
            http: HttpDownloader::new(client, timeouts),
            fs: FilesystemDownloader::new(),
        })
    }

    /// Dispatches downloading of the given resource to the appropriate downloader.
    async fn dispatch_download(
        &self,
        request: &ResourceRequest,
        destination: &mut File,
    ) -> CacheContents {
        let url = Url::parse(&request.uri)
            .map_err(|e| CacheError::DownloadError(format!("invalid uri: {e}")))?;

        match url.scheme() {
            "http" | "https" => self.http.download_source(request, destination).await,
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| CacheError::DownloadError("invalid file uri".into()))?;
                self.fs.download_source(&path, destination).await
            }
            scheme => Err(CacheError::DownloadError(format!(
                "unsupported scheme `{scheme}`"
            ))),
        }
    }

    async fn download_to_tempfile(
        &self,
        request: &ResourceRequest,
        temp_file: &NamedTempFile,
    ) -> CacheContents {
        let mut destination = File::from_std(temp_file.reopen()?);
        self.dispatch_download(request, &mut destination).await?;
        destination.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    async fn download(&self, request: &ResourceRequest, destination: &Path) -> CacheContents {
        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        let temp_file = NamedTempFile::new_in(&self.tmp_dir)?;

        let timeout = self.timeouts.max_download;
        let result = tokio::time::timeout(timeout, self.download_to_tempfile(request, &temp_file))
            .await
            .unwrap_or(Err(CacheError::Timeout(timeout)));

        match &result {
            Ok(()) => {
                temp_file.persist(destination)?;
                tracing::debug!("Resource `{}` fetched successfully", request);
            }
            Err(err) => tracing::debug!("Resource `{}` fetching failed: {}", request, err),
        }

        result
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Writes a stream of chunks into `destination`, enforcing an optional total `timeout`.
async fn download_stream(
    uri: &str,
    stream: impl Stream<Item = Result<impl AsRef<[u8]>, CacheError>>,
    destination: &mut File,
    timeout: Option<Duration>,
) -> CacheContents {
    tracing::trace!("Downloading from `{}`", uri);
    let future = async {
        futures::pin_mut!(stream);

        let start = Instant::now();
        let mut bytes_transferred = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();
            bytes_transferred += chunk.len() as u64;
            destination.write_all(chunk).await?;
        }
        destination.flush().await?;

        tracing::trace!(
            bytes_transferred,
            elapsed = ?start.elapsed(),
            "Finished downloading `{}`",
            uri
        );
        Ok(())
    };

    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| CacheError::Timeout(timeout))?,
        None => future.await,
    }
}

async fn download_reqwest(
    uri: &str,
    builder: reqwest::RequestBuilder,
    timeouts: &DownloadTimeouts,
    destination: &mut File,
) -> CacheContents {
    let request = builder.send();

    let timeout = timeouts.head;
    let request = tokio::time::timeout(timeout, request);

    let timeout_err = CacheError::Timeout(timeout);
    let response = request.await.map_err(|_| timeout_err)??;

    let status = response.status();
    if status.is_success() {
        tracing::trace!("Success hitting `{}`", uri);

        let timeout = response
            .content_length()
            .map(|cl| content_length_timeout(cl, timeouts.streaming));
        let stream = response.bytes_stream().map_err(CacheError::from);

        download_stream(uri, stream, destination, timeout).await
    } else if matches!(status, StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED) {
        tracing::debug!("Insufficient permissions to download `{}`: {}", uri, status);

        Err(CacheError::PermissionDenied(status.to_string()))
        // If it's a client error, chances are it's a 404.
    } else if status.is_client_error() {
        tracing::debug!(
            "Unexpected client error status code from `{}`: {}",
            uri,
            status
        );

        Err(CacheError::NotFound)
    } else {
        tracing::debug!("Unexpected status code from `{}`: {}", uri, status);

        Err(CacheError::DownloadError(status.to_string()))
    }
}
