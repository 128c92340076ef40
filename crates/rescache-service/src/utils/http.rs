use std::time::Duration;

use reqwest::redirect;

use crate::config::Config;

/// Various timeouts for all the downloaders.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DownloadTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// The timeout for receiving the first headers.
    pub head: Duration,
    /// An adaptive timeout per 1GB of content.
    pub streaming: Duration,
    /// Global timeout for one download.
    pub max_download: Duration,
}

impl DownloadTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect_timeout,
            head: config.head_timeout,
            streaming: config.streaming_timeout,
            max_download: config.max_download_timeout,
        }
    }
}

impl Default for DownloadTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(500),
            head: Duration::from_secs(5),
            streaming: Duration::from_secs(250),
            max_download: Duration::from_secs(315),
        }
    }
}

/// Creates a [`reqwest::Client`] with the provided options.
///
/// * `timeouts` controls connection and download timeouts.
/// * `user_agent` is sent with every request.
pub fn create_client(
    timeouts: &DownloadTimeouts,
    user_agent: &str,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .user_agent(user_agent)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.max_download)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(redirect::Policy::limited(10))
        .build()
}

/// Computes a streaming timeout for a body of `content_length` bytes.
///
/// The timeout scales with the size of the body, but never drops below 10 seconds.
pub fn content_length_timeout(content_length: u64, timeout_per_gb: Duration) -> Duration {
    let gb = content_length as f64 / (1024.0 * 1024.0 * 1024.0);
    timeout_per_gb.mul_f64(gb).max(Duration::from_secs(10))
}
