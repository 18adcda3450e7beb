use std::io;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Output goes to stderr: stdout carries protocol frames.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();
}
