use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use rescache_service::caching::Coordinator;
use rescache_service::{Observer, ResourceRequest};
use tokio::sync::mpsc;

use crate::output::{self, FetchResult, OutputFormat};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// The URIs of the resources to fetch.
    #[arg(required = true, value_name = "URI")]
    uris: Vec<String>,

    /// Cache the resources as immutable, reusing files from earlier runs.
    #[arg(long)]
    immutable: bool,

    /// An additional request header, may be given multiple times.
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// The HTTP method used for requests.
    #[arg(long, default_value = "GET")]
    method: reqwest::Method,

    /// How long to wait for all resources to be fetched.
    ///
    /// Failed fetches are not reported early. If any resource cannot be fetched, the command
    /// waits for the full timeout and then lists the resources that are still missing.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// The output format.
    #[arg(long, value_enum, default_value = "pretty")]
    format: OutputFormat,
}

impl FetchArgs {
    fn request(&self, uri: &str) -> ResourceRequest {
        let request = ResourceRequest::new(uri).with_method(self.method.clone());
        self.headers
            .iter()
            .fold(request, |request, (name, value)| {
                request.with_header(name.as_str(), value.as_str())
            })
    }
}

fn parse_header(header: &str) -> Result<(String, String), String> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| format!("`{header}` is not of the form NAME:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("`{header}` has an empty header name"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

/// Fetches all resources in `args` and prints where they were cached.
pub async fn run(coordinator: &Coordinator, args: FetchArgs) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut resolved: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();
    let mut observers = vec![];

    for uri in &args.uris {
        if resolved.insert(uri.clone(), None).is_some() {
            continue;
        }

        let observer = {
            let tx = tx.clone();
            let uri = uri.clone();
            Observer::new(move |path| {
                if let Some(path) = path {
                    tx.send((uri.clone(), path.to_path_buf())).ok();
                }
            })
        };

        coordinator
            .register(args.request(uri), observer.clone(), args.immutable)
            .await
            .with_context(|| format!("invalid resource `{uri}`"))?;
        observers.push((uri.clone(), observer));
    }

    let deadline = tokio::time::sleep(args.timeout);
    tokio::pin!(deadline);

    while resolved.values().any(Option::is_none) {
        tokio::select! {
            Some((uri, path)) = rx.recv() => {
                resolved.insert(uri, Some(path));
            }
            _ = &mut deadline => {
                tracing::debug!("Timed out after {}", humantime::format_duration(args.timeout));
                break;
            }
        }
    }

    for (uri, observer) in &observers {
        coordinator.unregister(uri, observer);
        if resolved[uri].is_none() {
            coordinator.cancel(uri).await;
        }
    }

    let results: Vec<_> = resolved
        .into_iter()
        .map(|(uri, path)| FetchResult { uri, path })
        .collect();
    output::print(&results, args.format);

    let failed = results.iter().filter(|result| result.path.is_none()).count();
    if failed > 0 {
        bail!("{failed} of {} resources could not be fetched", results.len());
    }
    Ok(())
}
