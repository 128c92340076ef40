use std::path::PathBuf;
use std::time::Instant;

use futures::channel::oneshot;
use tokio_util::sync::CancellationToken;

use crate::request::ResourceRequest;
use crate::utils::defer::defer;

use super::entry::FetchId;
use super::{CacheContents, CacheError, Coordinator};

/// A single download of a resource into the cache, running as its own task.
pub(super) struct FetchJob {
    pub coordinator: Coordinator,
    pub uri: String,
    pub request: ResourceRequest,
    pub immutable: bool,
    pub destination: PathBuf,
    pub id: FetchId,
    pub cancel: CancellationToken,
}

impl FetchJob {
    /// Runs the download and its completion handling.
    ///
    /// `done` is dropped once the entry has been updated, which wakes up everyone waiting for
    /// this fetch to end.
    pub async fn run(self, done: oneshot::Sender<()>) {
        // If this task is torn down before completing, e.g. because the runtime shuts down,
        // the entry must not wait for it forever.
        let abandoned = {
            let coordinator = self.coordinator.clone();
            let uri = self.uri.clone();
            let id = self.id;
            defer(move || {
                coordinator.finish_failure(&uri, id);
            })
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CacheError::Cancelled),
            result = self.download() => result,
        };

        let status = match &result {
            Ok(()) => "success",
            Err(err) => err.metrics_tag(),
        };
        metric!(timer("caches.fetch.duration") = start.elapsed(), "status" => status);
        metric!(counter("caches.fetch.completed") += 1, "status" => status);

        match result {
            Ok(()) => self.complete().await,
            Err(err) => self.fail(err).await,
        }

        abandoned.disarm();
        drop(done);
    }

    async fn download(&self) -> CacheContents {
        let storage = self.coordinator.storage();
        storage
            .create_dir_all(self.coordinator.paths().cache_dir())
            .await?;
        storage.download(&self.request, &self.destination).await
    }

    async fn complete(self) {
        // Storage may report success without the file actually being there.
        let present = self.coordinator.storage().exists(&self.destination).await;

        let notify =
            self.coordinator
                .finish_success(&self.uri, self.id, self.destination.clone(), present);
        if notify {
            tracing::debug!(uri = %self.uri, fetch = self.id, "Fetch completed");
            self.coordinator.notify(&self.uri);
        }
    }

    async fn fail(self, err: CacheError) {
        tracing::debug!(
            error = &err as &dyn std::error::Error,
            uri = %self.uri,
            fetch = self.id,
            "Fetch failed"
        );

        // Immutable resources share their destination with later fetches of the same URI,
        // which are only possible once this one is no longer waited for.
        let owns_destination =
            !self.immutable || self.coordinator.is_waiting_for(&self.uri, self.id);
        if owns_destination {
            if let Err(e) = self.coordinator.storage().remove_file(&self.destination).await {
                tracing::trace!(
                    error = &e as &dyn std::error::Error,
                    path = %self.destination.display(),
                    "Could not remove partial download"
                );
            }
        }

        self.coordinator.finish_failure(&self.uri, self.id);
    }
}
