use std::fmt;
use std::path::PathBuf;

use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use crate::request::ResourceRequest;

use super::Observer;

/// Identifies one launched fetch.
///
/// Ids are handed out in increasing order by the coordinator, and allow a finished fetch to
/// tell whether the entry it was launched for is still waiting for it.
pub(crate) type FetchId = u64;

/// A future that resolves once a fetch has gone through its completion handling.
pub(crate) type FetchDone = Shared<BoxFuture<'static, ()>>;

/// Bookkeeping for the fetch currently running for an entry.
#[derive(Clone)]
pub(crate) struct InFlightFetch {
    pub id: FetchId,
    pub cancel: CancellationToken,
    pub done: FetchDone,
}

impl fmt::Debug for InFlightFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightFetch")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// The in-memory state of one cached resource.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    /// The request of the first registration, used to issue all fetches.
    pub request: ResourceRequest,
    /// All handlers interested in this resource, in registration order.
    pub observers: Vec<Observer>,
    /// Where the resource lives on disk.
    ///
    /// Immutable entries have this assigned at creation, mutable entries only once a fetch
    /// has completed.
    pub local_path: Option<PathBuf>,
    /// Whether the resource is content-addressed. Never changes.
    pub immutable: bool,
    pub in_flight: Option<InFlightFetch>,
}

impl CacheEntry {
    pub fn new(
        request: ResourceRequest,
        observer: Observer,
        immutable: bool,
        local_path: Option<PathBuf>,
    ) -> Self {
        Self {
            request,
            observers: vec![observer],
            local_path,
            immutable,
            in_flight: None,
        }
    }

    /// Removes every registration of `observer`.
    pub fn remove_observer(&mut self, observer: &Observer) {
        self.observers.retain(|o| !o.ptr_eq(observer));
    }

    /// Returns `true` if `id` is the fetch this entry is currently waiting for.
    pub fn is_waiting_for(&self, id: FetchId) -> bool {
        self.in_flight.as_ref().is_some_and(|fetch| fetch.id == id)
    }
}
