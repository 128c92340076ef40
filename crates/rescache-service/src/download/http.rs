//! Support to download from HTTP sources.

use reqwest::{Client, header};
use tokio::fs::File;

use crate::caching::{CacheContents, CacheError};
use crate::request::ResourceRequest;
use crate::utils::http::DownloadTimeouts;

/// Downloader implementation that supports `http` and `https` URIs.
#[derive(Debug)]
pub struct HttpDownloader {
    client: Client,
    timeouts: DownloadTimeouts,
}

impl HttpDownloader {
    pub fn new(client: Client, timeouts: DownloadTimeouts) -> Self {
        Self { client, timeouts }
    }

    /// Downloads a resource hosted on an HTTP server.
    pub async fn download_source(
        &self,
        request: &ResourceRequest,
        destination: &mut File,
    ) -> CacheContents {
        let download_url = reqwest::Url::parse(&request.uri)
            .map_err(|e| CacheError::DownloadError(format!("invalid url: {e}")))?;

        tracing::debug!("Fetching resource from `{}`", download_url);

        let mut builder = self.client.request(request.method.clone(), download_url);
        // A request is only sent with all of its headers.
        for (key, value) in &request.headers {
            let name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| CacheError::DownloadError(format!("invalid header name `{key}`")))?;
            let value = header::HeaderValue::from_str(value).map_err(|_| {
                CacheError::DownloadError(format!("invalid value for header `{key}`"))
            })?;
            builder = builder.header(name, value);
        }

        super::download_reqwest(&request.uri, builder, &self.timeouts, destination).await
    }
}
