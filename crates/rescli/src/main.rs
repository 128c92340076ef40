//! Rescli.
//!
//! A command line client for the resource cache. It fetches resources into the local cache
//! directory, using the same configuration file as any other host of the cache.

#![warn(missing_debug_implementations, clippy::all)]

mod cli;
mod fetch;
mod output;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            rescache_service::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
