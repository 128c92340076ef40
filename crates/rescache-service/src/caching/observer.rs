use std::fmt;
use std::path::Path;
use std::sync::Arc;

type Callback = dyn Fn(Option<&Path>) + Send + Sync;

/// A handler that is notified whenever the local copy of a resource becomes available.
///
/// Observers are compared by identity: clones of the same `Observer` are equal, two observers
/// created from identical closures are not. Unregistering an observer removes every
/// registration made with it or any of its clones.
#[derive(Clone)]
pub struct Observer {
    callback: Arc<Callback>,
}

impl Observer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&Path>) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(f),
        }
    }

    /// Invokes the handler with the current local path of the resource.
    pub fn notify(&self, path: Option<&Path>) {
        (self.callback)(path)
    }

    /// Returns `true` if both observers refer to the same handler.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        // Compare the data pointers only, vtable pointers of the same closure may differ
        // across codegen units.
        std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(&other.callback))
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observer")
            .field(&Arc::as_ptr(&self.callback))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_identity() {
        let a = Observer::new(|_| {});
        let b = Observer::new(|_| {});

        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_notify() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer = {
            let seen = Arc::clone(&seen);
            Observer::new(move |path| seen.lock().unwrap().push(path.map(Path::to_path_buf)))
        };

        observer.notify(Some(Path::new("/cache/a.png")));
        observer.notify(None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(Path::new("/cache/a.png").to_path_buf()), None]
        );
    }
}
