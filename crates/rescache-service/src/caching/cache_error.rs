use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// An error that happens when fetching a resource from a remote location.
///
/// None of these are ever handed to observers. A failed fetch leaves the entry unresolved, and
/// the next registration or invalidation of the URI tries again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The resource was not found at the remote location.
    #[error("not found")]
    NotFound,
    /// The resource could not be fetched due to missing permissions.
    ///
    /// The attached string contains the remote's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The resource could not be fetched due to a timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The resource could not be fetched due to another problem,
    /// like connection loss, DNS resolution, or a 5xx server response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The fetch was cancelled before it completed.
    #[error("download cancelled")]
    Cancelled,
    /// An unexpected error in the cache itself, usually an io error.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for CacheError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl From<tempfile::PersistError> for CacheError {
    #[track_caller]
    fn from(err: tempfile::PersistError) -> Self {
        Self::from_std_error(err)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            // reqwest does not tell which of its timeouts fired, the connect and total
            // timeouts are both reported the same way.
            return Self::DownloadError("request timed out".into());
        }
        Self::download_error(&error)
    }
}

impl CacheError {
    /// Creates a [`DownloadError`](Self::DownloadError) from the innermost source of `error`.
    pub(crate) fn download_error(mut error: &dyn StdError) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        Self::DownloadError(error_string)
    }

    #[track_caller]
    pub fn from_std_error<E: StdError + 'static>(e: E) -> Self {
        let dynerr: &dyn StdError = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// A short tag describing the kind of error, used for metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::NotFound => "notfound",
            Self::PermissionDenied(_) => "permissiondenied",
            Self::Timeout(_) => "timeout",
            Self::DownloadError(_) => "downloaderror",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internalerror",
        }
    }
}

/// The outcome of a fetch: `Ok(T)` or an error denoting why the resource could not be fetched.
pub type CacheContents<T = ()> = Result<T, CacheError>;
