use std::fmt::Write;
use std::path::PathBuf;

use clap::ValueEnum;
use console::style;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One colored line per resource.
    Pretty,
    /// Tab separated URI and path, `-` for resources that could not be fetched.
    Compact,
}

/// The outcome of fetching a single resource.
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub uri: String,
    pub path: Option<PathBuf>,
}

pub fn print(results: &[FetchResult], format: OutputFormat) {
    match format {
        OutputFormat::Pretty => print_pretty(results),
        OutputFormat::Compact => print!("{}", render_compact(results)),
    }
}

fn print_pretty(results: &[FetchResult]) {
    for result in results {
        match &result.path {
            Some(path) => println!(
                "{} {}\n  {}",
                style("✓").green(),
                style(&result.uri).bold(),
                path.display()
            ),
            None => println!(
                "{} {}\n  {}",
                style("✗").red(),
                style(&result.uri).bold(),
                style("not fetched").dim()
            ),
        }
    }
}

fn render_compact(results: &[FetchResult]) -> String {
    let mut out = String::new();
    for result in results {
        let path = match &result.path {
            Some(path) => path.display().to_string(),
            None => "-".into(),
        };
        writeln!(out, "{}\t{}", result.uri, path).ok();
    }
    out
}
