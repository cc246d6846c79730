//! Diagnostic logging setup.
//!
//! Events go to stderr in the compact format so stdout stays clean for
//! command output. `RUST_LOG`, when set, overrides `[logging] level`.

use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: `RUST_LOG` if present, else `level` for this crate
/// with noisy HTTP and driver crates held at `warn`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "hybridq={level},hyper=warn,reqwest=warn,sqlx=warn",
            level = level
        ))
    })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(level: &str) {
    let _ = fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level))
        .with_target(false)
        .try_init();
}
