//! # Resource caching
//!
//! All caching is done by the [`Coordinator`]. Hosts register [`Observer`]s for a URI, and the
//! coordinator makes sure the resource behind that URI is available in the local cache
//! directory, pushing its local path to all observers once it is.
//!
//! ## Entries
//!
//! The coordinator keeps one in-memory entry per URI, created by the first registration and
//! kept until the cache is cleared. The first registration decides how the resource is
//! requested and whether it is *mutable* or *immutable*:
//!
//! - Immutable entries are content-addressed. Their path is derived from the URI alone (see
//!   [`CachePaths`]) and known as soon as the entry exists, so a file downloaded by an earlier
//!   process is reused without downloading it again.
//! - Mutable entries get a new random path for every download, and can be invalidated, which
//!   re-downloads the resource to a new path.
//!
//! ## Resolution
//!
//! Every registration and invalidation *resolves* the entry. If the entry has a path and the
//! file is still there, the path is pushed to the observers right away. Files may disappear out
//! of band at any time; a missing file is a cache miss. Otherwise, a fetch is launched, unless
//! one is already running for this URI: there is never more than one fetch per URI.
//!
//! ## Fetches
//!
//! Fetches run as tasks in the background. Each one ends in exactly one of these states:
//!
//! - Success: the downloaded path is pushed to all observers.
//! - Failure or cancellation: the partially written file is removed and observers are not
//!   notified. The entry stays unresolved until it is resolved again.
//! - Abandoned: the entry no longer waits for this fetch, because the cache was cleared in
//!   the meantime. The result is dropped.
//!
//! ### Metrics
//!
//! - `caches.register`: All registrations, tagged by mutability.
//! - `caches.file.hit`: Resolutions served by an existing file.
//! - `caches.file.evicted`: Resolutions that found their file removed out of band.
//! - `caches.fetch.launched`: Fetches actually started.
//! - `caches.fetch.completed`: Fetches that ran to an end, tagged with their `status`.
//! - `caches.fetch.duration`: Time taken by fetches, tagged with their `status`.
//! - `caches.notify`: Fan-outs to observers.
//! - `caches.invalidate` and `caches.clear`: Invalidations and full clears.

mod cache_error;
mod coordinator;
mod entry;
mod fetch;
mod observer;
mod paths;


pub use cache_error::{CacheContents, CacheError};
pub use coordinator::Coordinator;
pub use observer::Observer;
pub use paths::{CachePaths, file_extension};
