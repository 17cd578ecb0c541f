//! Log output for the CLI.
//!
//! The library crates log through the `log` facade. `try_init` installs a
//! `tracing_subscriber` fmt layer on stderr and bridges `log` records into it.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset and `--verbose` is not given.
const DEFAULT_FILTER: &str = "warn";

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Route library logs to stderr. `warn` by default, `debug` when verbose.
pub(crate) fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
