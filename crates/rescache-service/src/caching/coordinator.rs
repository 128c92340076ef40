use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::channel::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::{RemoteStorage, Storage};
use crate::request::{RegisterError, RequestSource};

use super::entry::{CacheEntry, FetchId, InFlightFetch};
use super::fetch::FetchJob;
use super::{CachePaths, Observer};

type Entries = HashMap<String, CacheEntry>;

/// Coordinates fetching, caching and observing of remote resources.
///
/// The coordinator is a cheap handle, clones share the same state. A host application should
/// create one coordinator and hand it to every part that needs it.
///
/// See the [module level docs](super) for how resources are resolved.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    paths: CachePaths,
    storage: Arc<dyn Storage>,
    runtime: tokio::runtime::Handle,
    entries: Mutex<Entries>,
    next_fetch_id: AtomicU64,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("Coordinator")
            .field("paths", &self.inner.paths)
            .field("storage", &self.inner.storage)
            .field("entries", &entries)
            .finish()
    }
}

impl Coordinator {
    /// Creates a coordinator that spawns its fetches on `runtime`.
    pub fn new(
        paths: CachePaths,
        storage: Arc<dyn Storage>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                paths,
                storage,
                runtime,
                entries: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a coordinator downloading through a [`RemoteStorage`] set up from `config`.
    pub fn from_config(
        config: &Config,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, reqwest::Error> {
        let storage = RemoteStorage::new(config)?;
        Ok(Self::new(
            CachePaths::from_config(config),
            Arc::new(storage),
            runtime,
        ))
    }

    /// Registers `observer` for the resource described by `source`.
    ///
    /// The first registration of a URI creates its entry and decides whether it is `immutable`
    /// and how it is requested. Later registrations only add their observer.
    ///
    /// Returns once the entry was resolved: either the observers were notified with an
    /// existing file, or a fetch is running in the background.
    pub async fn register(
        &self,
        source: impl Into<RequestSource>,
        observer: Observer,
        immutable: bool,
    ) -> Result<(), RegisterError> {
        let request = source.into().into_single()?;
        let uri = request.uri.clone();

        let mutability = if immutable { "immutable" } else { "mutable" };
        metric!(counter("caches.register") += 1, "mutability" => mutability);

        {
            let mut entries = self.entries();
            match entries.entry(uri.clone()) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    if entry.immutable != immutable || entry.request != request {
                        tracing::debug!(
                            uri = %uri,
                            immutable = entry.immutable,
                            "Ignoring changed request for existing cache entry"
                        );
                    }
                    entry.observers.push(observer);
                }
                Entry::Vacant(vacant) => {
                    let local_path = immutable.then(|| self.inner.paths.immutable_path(&uri));
                    tracing::trace!(uri = %uri, immutable, "Creating cache entry");
                    vacant.insert(CacheEntry::new(request, observer, immutable, local_path));
                }
            }
        }

        self.resolve(&uri).await;
        Ok(())
    }

    /// Removes all registrations of `observer` for `uri`.
    ///
    /// This neither cancels a running fetch nor removes the entry.
    pub fn unregister(&self, uri: &str, observer: &Observer) {
        if let Some(entry) = self.entries().get_mut(uri) {
            entry.remove_observer(observer);
        }
    }

    /// Forces a fresh download of a mutable resource.
    ///
    /// The current file is abandoned, the resource is downloaded to a new path and observers
    /// are notified once that completes. Does nothing for immutable or unknown URIs.
    pub async fn invalidate(&self, uri: &str) {
        {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(uri) else {
                return;
            };
            if entry.immutable {
                tracing::trace!(uri, "Not invalidating immutable cache entry");
                return;
            }
            entry.local_path = None;
        }

        metric!(counter("caches.invalidate") += 1);
        self.resolve(uri).await;
    }

    /// Cancels the fetch currently running for `uri`, if any.
    ///
    /// Returns after the fetch has wound down. Observers are not notified for a cancelled fetch,
    /// but the next registration or invalidation of `uri` will fetch it again.
    pub async fn cancel(&self, uri: &str) {
        let in_flight = self
            .entries()
            .get(uri)
            .and_then(|entry| entry.in_flight.clone());
        let Some(fetch) = in_flight else {
            return;
        };

        tracing::debug!(uri, fetch = fetch.id, "Cancelling fetch");
        fetch.cancel.cancel();
        fetch.done.await;
    }

    /// Forgets about all resources and deletes the cache directory.
    ///
    /// Running fetches are not cancelled, but their results are dropped. Afterwards, every URI
    /// behaves as if it was never registered.
    pub async fn clear(&self) -> io::Result<()> {
        let entries = std::mem::take(&mut *self.entries());
        tracing::debug!("Dropped {} cache entries", entries.len());
        drop(entries);

        metric!(counter("caches.clear") += 1);

        let cache_dir = self.inner.paths.cache_dir();
        match self.inner.storage.remove_dir_all(cache_dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // Observers are never called with the lock held, so a poisoned lock
        // still holds consistent entries.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn paths(&self) -> &CachePaths {
        &self.inner.paths
    }

    pub(super) fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Serves an entry from an existing file, or launches a fetch for it.
    async fn resolve(&self, uri: &str) {
        let local_path = match self.entries().get(uri) {
            Some(entry) => entry.local_path.clone(),
            None => return,
        };

        if let Some(path) = local_path {
            if self.inner.storage.exists(&path).await {
                metric!(counter("caches.file.hit") += 1);
                self.notify(uri);
                return;
            }
            metric!(counter("caches.file.evicted") += 1);
            tracing::debug!(uri, path = %path.display(), "Cached file is gone, fetching again");
        }

        // The check above may have given another resolution the chance to launch a fetch,
        // `launch_fetch` looks at the current state.
        self.launch_fetch(uri);
    }

    /// Starts a fetch for `uri`, unless one is already running.
    fn launch_fetch(&self, uri: &str) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(uri) else {
            return;
        };
        if let Some(fetch) = &entry.in_flight {
            tracing::trace!(uri, fetch = fetch.id, "Fetch already in flight");
            return;
        }

        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let destination = self.inner.paths.path_for(uri, entry.immutable);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        entry.in_flight = Some(InFlightFetch {
            id,
            cancel: cancel.clone(),
            done: done_rx.map(|_| ()).boxed().shared(),
        });

        tracing::debug!(uri, fetch = id, destination = %destination.display(), "Launching fetch");
        metric!(counter("caches.fetch.launched") += 1);

        let job = FetchJob {
            coordinator: self.clone(),
            uri: uri.to_owned(),
            request: entry.request.clone(),
            immutable: entry.immutable,
            destination,
            id,
            cancel,
        };
        self.inner.runtime.spawn(job.run(done_tx));
    }

    /// Completes a successful fetch, returning `true` if observers should be notified.
    ///
    /// `present` tells whether the downloaded file could be found after the download.
    pub(super) fn finish_success(
        &self,
        uri: &str,
        id: FetchId,
        path: PathBuf,
        present: bool,
    ) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(uri).filter(|entry| entry.is_waiting_for(id)) else {
            tracing::debug!(uri, fetch = id, "Dropping result of abandoned fetch");
            return false;
        };

        entry.in_flight = None;
        if !present {
            tracing::debug!(uri, fetch = id, "Downloaded file is missing");
            return false;
        }
        if !entry.immutable {
            entry.local_path = Some(path);
        }
        true
    }

    /// Clears the bookkeeping of fetch `id` if `uri` is still waiting for it.
    ///
    /// Returns `true` if the entry was waiting for this fetch.
    pub(super) fn finish_failure(&self, uri: &str, id: FetchId) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(uri) {
            Some(entry) if entry.is_waiting_for(id) => {
                entry.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `uri` is currently waiting for fetch `id`.
    pub(super) fn is_waiting_for(&self, uri: &str, id: FetchId) -> bool {
        self.entries()
            .get(uri)
            .is_some_and(|entry| entry.is_waiting_for(id))
    }

    /// Pushes the current path of `uri` to all of its observers.
    ///
    /// Observers are called without holding any locks, so they are free to call back into the
    /// coordinator. An observer that is unregistered while the fan-out is running is skipped.
    pub(super) fn notify(&self, uri: &str) {
        let (observers, path) = {
            let entries = self.entries();
            let Some(entry) = entries.get(uri) else {
                return;
            };
            let Some(path) = entry.local_path.clone() else {
                return;
            };
            (entry.observers.clone(), path)
        };

        metric!(counter("caches.notify") += 1);
        tracing::trace!(uri, observers = observers.len(), "Notifying observers");

        for observer in observers {
            if self.is_registered(uri, &observer) {
                observer.notify(Some(&path));
            }
        }
    }

    fn is_registered(&self, uri: &str, observer: &Observer) -> bool {
        self.entries()
            .get(uri)
            .is_some_and(|entry| entry.observers.iter().any(|o| o.ptr_eq(observer)))
    }
}
