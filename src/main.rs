//! folio - revision-safe edits to hosted repositories
//!
//! Reads, stages, and commits text resources in a remote repository while
//! refusing writes based on stale revisions.

use clap::Parser;
use folio::cli::Cli;
use folio::output::emit_error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    // Tracing is opt-in via RUST_LOG.
    // Ignore invalid or oversized filters so startup never fails on them.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    match cli.run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let _ = emit_error(&err, json);
            std::process::exit(err.exit_code());
        }
    }
}
