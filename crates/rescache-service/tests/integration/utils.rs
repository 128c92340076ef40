use std::path::{Path, PathBuf};
use std::time::Duration;

use rescache_service::Observer;
use rescache_service::caching::Coordinator;
use rescache_service::config::Config;
use rescache_test as test;
use tokio::sync::mpsc;

pub use test::{SECRET_TOKEN, Server};

/// Setup tests and create a test coordinator.
///
/// This function returns a tuple containing the coordinator to test, and a temporary cache
/// directory. The directory is cleaned up when the [`TempDir`](test::TempDir) instance is
/// dropped. Keep it as guard until the test has finished.
///
/// The `update_config` closure can modify any default configuration if needed before the
/// coordinator is created.
pub fn setup_coordinator(
    update_config: impl FnOnce(&mut Config),
) -> (Coordinator, test::TempDir) {
    test::setup();

    let cache_dir = test::tempdir();

    let mut config = Config {
        cache_dir: cache_dir.path().join("cache"),
        ..Default::default()
    };
    update_config(&mut config);

    let handle = tokio::runtime::Handle::current();
    let coordinator = Coordinator::from_config(&config, handle).unwrap();

    (coordinator, cache_dir)
}

/// The paths received by an [`Observer`].
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<PathBuf>,
}

impl Notifications {
    /// Waits for the next notification.
    pub async fn next(&mut self) -> PathBuf {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("observer was not notified")
            .expect("observer was dropped")
    }

    /// Asserts that no notification arrives within a short time.
    ///
    /// A dropped observer counts as silent.
    pub async fn assert_silent(&mut self) {
        let received = tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await;
        assert!(
            !matches!(received, Ok(Some(_))),
            "unexpected notification: {received:?}"
        );
    }
}

/// Creates an observer and a handle to the paths it receives.
pub fn observer() -> (Observer, Notifications) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer = Observer::new(move |path: Option<&Path>| {
        if let Some(path) = path {
            tx.send(path.to_path_buf()).ok();
        }
    });
    (observer, Notifications { rx })
}

/// Lists the names of all files in `dir`, ignoring directories.
///
/// A missing directory has no files.
pub fn cached_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}
