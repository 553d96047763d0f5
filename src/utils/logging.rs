//! Diagnostic logging setup.
//!
//! Replies are streamed to stdout, so log output always goes to stderr.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "chitter=warn";

/// Filter directive for a `-v` count; `RUST_LOG` takes precedence.
pub fn directive_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_DIRECTIVE,
        1 => "chitter=info",
        2 => "chitter=debug",
        _ => "chitter=trace",
    }
}

pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive_for_verbosity(verbosity)));

    // A second init (e.g. from an embedding test harness) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
