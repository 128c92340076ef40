//! Helpers for testing the resource cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test. When dropped too early, this might silently leak the temp
//!    directory, since the cache will create it again lazily after it has been deleted. To avoid
//!    this, assign it to a variable in the test function (e.g. `let _cache_dir = tempdir()`).
//!
//!  - When using [`Server`], make sure that the server is held until all requests to the
//!    server have been made. Dropping the server stops serving, and all further requests to it
//!    fail.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{self, Request};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use reqwest::Url;
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// The value of the `Authorization` header accepted by the `/private` routes of [`Server`].
pub const SECRET_TOKEN: &str = "Bearer rescache-test-token";

/// A tiny but valid PNG image, served as `/files/pixel.png`.
pub const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60, 0x00, 0x02, 0x00,
    0x00, 0x05, 0x00, 0x01, 0x7a, 0x5e, 0xab, 0x3f, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44,
    0xae, 0x42, 0x60, 0x82,
];

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `rescache_service` crate and
///    mutes all other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("rescache_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it as a guard to
/// automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Returns the contents of a file served under `/files`.
fn fixture(name: &str) -> Option<&'static [u8]> {
    match name {
        "hello.txt" => Some(b"hello world\n"),
        "pixel.png" => Some(PIXEL_PNG),
        _ => None,
    }
}

fn serve_fixture(name: &str) -> Response {
    match fixture(name) {
        Some(contents) => contents.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

type Hits = Arc<Mutex<BTreeMap<String, usize>>>;

/// A test server that binds to a random port and serves fixtures.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
///
/// The fixture server created by [`with_fixtures`](Self::with_fixtures) serves these routes:
///
/// - `/files/{name}`: The fixtures `hello.txt` and `pixel.png`, 404 for anything else.
/// - `/private/{name}`: Like `/files`, but responds with 401 unless the `Authorization` header
///   matches [`SECRET_TOKEN`].
/// - `/changing/{name}`: A different body on every request, `version {n}` for the n-th request
///   to that path.
/// - `/delay/{duration}/{path}`: Waits for the given [`humantime`] duration and redirects to
///   `/files/{path}`.
/// - `/status/{code}`: An empty response with the given status code.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    hits: Hits,
}

impl Server {
    /// Creates a new test server serving the given router.
    pub fn new(router: Router) -> Self {
        let hits = Hits::default();

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri): extract::OriginalUri, req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.path().to_owned()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };
        let router = router
            .layer(middleware::from_fn(hitcounter))
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = std::net::TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            hits,
        }
    }

    /// Creates a server serving the fixture routes listed on [`Server`].
    pub fn with_fixtures() -> Self {
        let versions = Hits::default();

        let router = Router::new()
            .route(
                "/files/*name",
                get(|extract::Path(name): extract::Path<String>| async move {
                    serve_fixture(&name)
                }),
            )
            .route(
                "/private/*name",
                get(
                    |headers: HeaderMap, extract::Path(name): extract::Path<String>| async move {
                        let authorized = headers
                            .get(header::AUTHORIZATION)
                            .is_some_and(|value| value == SECRET_TOKEN);
                        if authorized {
                            serve_fixture(&name)
                        } else {
                            StatusCode::UNAUTHORIZED.into_response()
                        }
                    },
                ),
            )
            .route(
                "/changing/*name",
                get(move |extract::Path(name): extract::Path<String>| {
                    let versions = versions.clone();
                    async move {
                        let mut versions = versions.lock().unwrap();
                        let version = versions.entry(name).or_default();
                        *version += 1;
                        format!("version {version}")
                    }
                }),
            )
            .route(
                "/delay/:time/*path",
                get(
                    |extract::Path((time, path)): extract::Path<(String, String)>| async move {
                        let duration = humantime::parse_duration(&time).unwrap();
                        tokio::time::sleep(duration).await;

                        (StatusCode::FOUND, [("Location", format!("/files/{path}"))])
                    },
                ),
            )
            .route(
                "/status/:code",
                get(|extract::Path(code): extract::Path<u16>| async move {
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            );

        Self::new(router)
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }

    /// Returns the number of requests made to `path`.
    pub fn hits(&self, path: &str) -> usize {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.hits.lock().unwrap().get(&path).copied().unwrap_or_default()
    }

    /// Returns the total number of requests made since the last call and resets the count.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
