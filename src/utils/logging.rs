//! Diagnostic logging setup
//!
//! Diagnostics go to stderr so they never interleave with chat output on
//! stdout. `RELIEF_LOG` overrides the default filter, e.g.
//! `RELIEF_LOG=relief=debug relief chat`.

use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "RELIEF_LOG";
const DEFAULT_FILTER: &str = "relief=info";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
