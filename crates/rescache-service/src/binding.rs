//! Binding of a single host view to a cached resource.
//!
//! A [`ResourceBinding`] is the observer side of the [`Coordinator`]: it owns a handler that is
//! called with local paths, keeps track of which URI it is registered for and unregisters
//! itself when dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::caching::{Coordinator, Observer};
use crate::request::{RegisterError, RequestSource};

/// Option keys that configure the binding itself and are never forwarded to the host view.
pub const RESERVED_OPTIONS: &[&str] = &["source", "immutable", "placeholder"];

/// Options of a [`ResourceBinding`].
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BindingOptions {
    /// Registers resources as immutable.
    pub immutable: bool,

    /// A local file shown while the bound resource is not available.
    pub placeholder: Option<PathBuf>,

    /// Presentation settings meant for the host view.
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, String>,
}

impl BindingOptions {
    /// Returns the passthrough options the host view should receive.
    pub fn forwarded_options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.passthrough
            .iter()
            .filter(|(key, _)| !RESERVED_OPTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// A handler bound to at most one resource at a time.
#[derive(Debug)]
pub struct ResourceBinding {
    coordinator: Coordinator,
    options: BindingOptions,
    observer: Observer,
    uri: Option<String>,
}

impl ResourceBinding {
    /// Creates an unbound binding which will call `handler` with every path it receives.
    pub fn new<F>(coordinator: Coordinator, options: BindingOptions, handler: F) -> Self
    where
        F: Fn(Option<&Path>) + Send + Sync + 'static,
    {
        Self {
            coordinator,
            options,
            observer: Observer::new(handler),
            uri: None,
        }
    }

    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// The URI this binding is currently registered for.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Binds to the resource described by `source`.
    ///
    /// Switching to a different URI unregisters from the previous one and shows the placeholder
    /// until the new resource is available. Binding the current URI again does nothing.
    /// An invalid `source` leaves the binding unchanged.
    pub async fn bind(&mut self, source: impl Into<RequestSource>) -> Result<(), RegisterError> {
        let request = source.into().into_single()?;
        if self.uri.as_deref() == Some(request.uri.as_str()) {
            return Ok(());
        }

        self.unbind();
        self.observer.notify(self.options.placeholder.as_deref());

        let uri = request.uri.clone();
        self.coordinator
            .register(request, self.observer.clone(), self.options.immutable)
            .await?;
        self.uri = Some(uri);
        Ok(())
    }

    /// Unregisters from the currently bound resource, if any.
    pub fn unbind(&mut self) {
        if let Some(uri) = self.uri.take() {
            tracing::trace!(uri, "Unbinding resource");
            self.coordinator.unregister(&uri, &self.observer);
        }
    }
}

impl Drop for ResourceBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}
