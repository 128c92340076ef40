//! Descriptors for the resources observers ask for.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Method;
use thiserror::Error;

/// An error returned when a registration names an unusable resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// The source lists a number of resources other than exactly one.
    #[error("expected exactly one resource, got {0}")]
    MultipleSources(usize),
    /// The resource does not have a URI.
    #[error("resource has an empty uri")]
    EmptyUri,
}

/// A request for a single remote resource.
///
/// This is what the coordinator uses to issue the download, so it carries everything needed
/// to reproduce the request: the URI, the HTTP method and additional headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub uri: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
}

impl ResourceRequest {
    /// Creates a `GET` request for `uri` without any extra headers.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
        }
    }

    /// Sets the HTTP method used to fetch the resource.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header sent along with the download.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// The resource(s) a host hands to [`Coordinator::register`](crate::Coordinator::register).
///
/// Hosts may pass a list of candidates, but the cache only ever deals with exactly one
/// resource per registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Single(ResourceRequest),
    Multiple(Vec<ResourceRequest>),
}

impl RequestSource {
    /// Resolves this source into the single request it describes.
    pub fn into_single(self) -> Result<ResourceRequest, RegisterError> {
        let request = match self {
            Self::Single(request) => request,
            Self::Multiple(mut requests) => {
                if requests.len() != 1 {
                    return Err(RegisterError::MultipleSources(requests.len()));
                }
                requests.remove(0)
            }
        };

        if request.uri.is_empty() {
            return Err(RegisterError::EmptyUri);
        }
        Ok(request)
    }
}

impl From<ResourceRequest> for RequestSource {
    fn from(request: ResourceRequest) -> Self {
        Self::Single(request)
    }
}

impl From<Vec<ResourceRequest>> for RequestSource {
    fn from(requests: Vec<ResourceRequest>) -> Self {
        Self::Multiple(requests)
    }
}

impl From<&str> for RequestSource {
    fn from(uri: &str) -> Self {
        Self::Single(ResourceRequest::new(uri))
    }
}

impl From<String> for RequestSource {
    fn from(uri: String) -> Self {
        Self::Single(ResourceRequest::new(uri))
    }
}
