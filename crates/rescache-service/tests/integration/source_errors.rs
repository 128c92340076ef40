use std::time::Duration;

use crate::{Server, cached_files, observer, setup_coordinator};

#[tokio::test]
async fn test_not_found() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("files/missing.png").to_string();
    coordinator.register(uri.as_str(), observer, true).await.unwrap();

    notifications.assert_silent().await;
    assert!(cached_files(&cache_dir.path().join("cache")).is_empty());
}

#[tokio::test]
async fn test_unauthorized() {
    let (coordinator, _cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("private/hello.txt").to_string();
    coordinator.register(uri.as_str(), observer, false).await.unwrap();

    notifications.assert_silent().await;
    assert_eq!(server.hits("private/hello.txt"), 1);
}

#[tokio::test]
async fn test_failure_is_retried() {
    let (coordinator, _cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("status/503").to_string();
    coordinator
        .register(uri.as_str(), observer.clone(), false)
        .await
        .unwrap();
    notifications.assert_silent().await;

    // every trigger retries a failed resource
    coordinator.register(uri.as_str(), observer, false).await.unwrap();
    notifications.assert_silent().await;

    assert_eq!(server.hits("status/503"), 2);
}

#[tokio::test]
async fn test_timeout() {
    let (coordinator, cache_dir) = setup_coordinator(|config| {
        config.head_timeout = Duration::from_millis(100);
    });
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("delay/1s/hello.txt").to_string();
    coordinator.register(uri.as_str(), observer, false).await.unwrap();

    notifications.assert_silent().await;
    let cache = cache_dir.path().join("cache");
    assert!(cached_files(&cache).is_empty());
    assert!(cached_files(&cache.join("tmp")).is_empty());
}
