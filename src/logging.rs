// src/logging.rs
//! Diagnostics go to stderr through `tracing`; stdout carries only CSV.
//!
//! `RUST_LOG` wins when set. Otherwise the level is `warn`, or `debug`
//! with `-D`.

use tracing_subscriber::EnvFilter;

pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
