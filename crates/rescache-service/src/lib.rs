//! Client-side cache for remote resources.
//!
//! The [`Coordinator`](caching::Coordinator) makes sure every resource is fetched at most once
//! into a local cache directory, and pushes the resulting local path to everyone observing the
//! resource's URI.

#[macro_use]
pub mod metrics;

pub mod binding;
pub mod caching;
pub mod config;
pub mod download;
pub mod logging;
pub mod request;
pub mod utils;

pub use caching::{Coordinator, Observer};
pub use request::{RequestSource, ResourceRequest};
