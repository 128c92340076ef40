use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;

/// The longest file extension taken over from a URI.
const MAX_EXTENSION_LEN: usize = 10;

/// Derives the local file names of cached resources.
///
/// All paths live directly inside the cache directory and are made of a body and an extension
/// taken from the URI:
///
/// - Immutable resources are content-addressed: the body is the hex-encoded sha-256 hash of the
///   full URI, so the same URI always maps to the same file, also across process restarts.
/// - Mutable resources get a fresh random body for every fetch, so a re-fetch never writes to a
///   file somebody might still be reading.
///
/// The extension is only taken over if it consists of 1 to 10 ASCII alphanumeric characters.
/// Anything else, such as `photo.tar-gz` or `image.p%20g`, gets the configured default
/// extension, just like a URI without any extension.
#[derive(Debug, Clone)]
pub struct CachePaths {
    cache_dir: PathBuf,
    default_extension: String,
}

impl CachePaths {
    pub fn new(cache_dir: impl Into<PathBuf>, default_extension: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            default_extension: default_extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_dir, &config.default_extension)
    }

    /// The directory all cache files are placed in.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The directory for temporary files of running downloads.
    pub fn tmp_dir(&self) -> PathBuf {
        self.cache_dir.join("tmp")
    }

    /// Returns the path a resource is downloaded to.
    ///
    /// This is deterministic for `immutable` resources, and unique per call otherwise.
    pub fn path_for(&self, uri: &str, immutable: bool) -> PathBuf {
        if immutable {
            self.immutable_path(uri)
        } else {
            self.fresh_path(uri)
        }
    }

    /// The content-addressed path of an immutable resource.
    pub fn immutable_path(&self, uri: &str) -> PathBuf {
        let hash = Sha256::digest(uri.as_bytes());
        self.file_path(&format!("{hash:x}"), uri)
    }

    /// A new, unique path for a mutable resource.
    pub fn fresh_path(&self, uri: &str) -> PathBuf {
        let token = Uuid::new_v4();
        self.file_path(&token.simple().to_string(), uri)
    }

    fn file_path(&self, body: &str, uri: &str) -> PathBuf {
        let extension = file_extension(uri).unwrap_or(&self.default_extension);
        self.cache_dir.join(format!("{body}.{extension}"))
    }
}

/// Extracts the file extension from the last path segment of `uri`.
///
/// Query strings and fragments are ignored. Returns `None` if the last segment has no
/// extension, or if it does not look like a file extension at all.
pub fn file_extension(uri: &str) -> Option<&str> {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    let path = match without_query.split_once("://") {
        Some((_scheme, rest)) => rest.find('/').map_or("", |start| &rest[start..]),
        None => without_query,
    };

    let file_name = path.rsplit('/').next()?;
    let (_, extension) = file_name.rsplit_once('.')?;

    let is_valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.bytes().all(|b| b.is_ascii_alphanumeric());
    is_valid.then_some(extension)
}
