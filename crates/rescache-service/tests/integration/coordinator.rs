use rescache_service::ResourceRequest;
use rescache_service::caching::CachePaths;
use rescache_test::PIXEL_PNG;

use crate::{Server, cached_files, observer, setup_coordinator};

#[tokio::test]
async fn test_immutable_resource() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("files/pixel.png").to_string();
    coordinator.register(uri.as_str(), observer, true).await.unwrap();

    let path = notifications.next().await;
    let cache = cache_dir.path().join("cache");
    assert_eq!(path, CachePaths::new(&cache, "jpg").immutable_path(&uri));
    assert_eq!(std::fs::read(&path).unwrap(), PIXEL_PNG);
    assert_eq!(server.hits("files/pixel.png"), 1);
}

#[tokio::test]
async fn test_immutable_resource_survives_restart() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let uri = server.url("files/pixel.png").to_string();

    let (observer1, mut notifications1) = observer();
    coordinator.register(uri.as_str(), observer1, true).await.unwrap();
    let first = notifications1.next().await;

    // a coordinator sharing the cache directory, as after restarting the host
    let (restarted, _other_dir) = setup_coordinator(|config| {
        config.cache_dir = cache_dir.path().join("cache");
    });
    let (observer2, mut notifications2) = observer();
    restarted.register(uri.as_str(), observer2, true).await.unwrap();

    assert_eq!(notifications2.next().await, first);
    assert_eq!(server.hits("files/pixel.png"), 1);
}

#[tokio::test]
async fn test_mutable_resource_invalidate() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("changing/avatar.png").to_string();
    coordinator.register(uri.as_str(), observer, false).await.unwrap();

    let first = notifications.next().await;
    assert_eq!(first.extension().unwrap(), "png");
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "version 1");

    coordinator.invalidate(&uri).await;
    let second = notifications.next().await;

    assert_ne!(first, second);
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "version 2");
    // the previous file is left behind
    assert!(first.exists());
    assert_eq!(cached_files(&cache_dir.path().join("cache")).len(), 2);
}

#[tokio::test]
async fn test_concurrent_registrations() {
    let (coordinator, _cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer1, mut notifications1) = observer();
    let (observer2, mut notifications2) = observer();

    let uri = server.url("delay/100ms/hello.txt").to_string();
    coordinator.register(uri.as_str(), observer1, false).await.unwrap();
    coordinator.register(uri.as_str(), observer2, false).await.unwrap();

    let path1 = notifications1.next().await;
    let path2 = notifications2.next().await;

    assert_eq!(path1, path2);
    assert_eq!(std::fs::read(&path1).unwrap(), b"hello world\n");
    assert_eq!(server.hits("delay/100ms/hello.txt"), 1);
}

#[tokio::test]
async fn test_request_headers() {
    let (coordinator, _cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let request = ResourceRequest::new(server.url("private/hello.txt").to_string())
        .with_header("Authorization", crate::SECRET_TOKEN);
    coordinator.register(request, observer, false).await.unwrap();

    let path = notifications.next().await;
    assert_eq!(path.extension().unwrap(), "txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world\n");
}

#[tokio::test]
async fn test_cancel() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("delay/1s/hello.txt").to_string();
    coordinator
        .register(uri.as_str(), observer.clone(), false)
        .await
        .unwrap();
    coordinator.cancel(&uri).await;

    notifications.assert_silent().await;
    let cache = cache_dir.path().join("cache");
    assert!(cached_files(&cache).is_empty());
    assert!(cached_files(&cache.join("tmp")).is_empty());

    // a later registration fetches again
    coordinator.register(uri.as_str(), observer, false).await.unwrap();
    let path = notifications.next().await;
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world\n");
}

#[tokio::test]
async fn test_evicted_file() {
    let (coordinator, _cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("files/pixel.png").to_string();
    coordinator
        .register(uri.as_str(), observer.clone(), true)
        .await
        .unwrap();
    let path = notifications.next().await;

    std::fs::remove_file(&path).unwrap();
    coordinator.register(uri.as_str(), observer, true).await.unwrap();

    assert_eq!(notifications.next().await, path);
    assert!(path.exists());
    assert_eq!(server.hits("files/pixel.png"), 2);
}

#[tokio::test]
async fn test_clear() {
    let (coordinator, cache_dir) = setup_coordinator(|_| ());
    let server = Server::with_fixtures();
    let (observer, mut notifications) = observer();

    let uri = server.url("files/hello.txt").to_string();
    coordinator
        .register(uri.as_str(), observer.clone(), false)
        .await
        .unwrap();
    notifications.next().await;

    coordinator.clear().await.unwrap();
    assert!(!cache_dir.path().join("cache").exists());
    // clearing a missing cache directory is fine
    coordinator.clear().await.unwrap();

    coordinator.register(uri.as_str(), observer, false).await.unwrap();
    let path = notifications.next().await;
    assert!(path.exists());
    assert_eq!(server.hits("files/hello.txt"), 2);
}
