//! Logging setup and small helpers over `tracing`.
//!
//! Logs go to stderr so they never interleave with REPL output on stdout.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "PROMPT_STUDIO_LOG";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool) {
    let directives = filter_directives(
        verbose,
        [
            std::env::var(LOG_ENV).ok(),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        ],
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// `--verbose` wins over the environment. Otherwise the first parsable,
/// non-empty value from `env` is used, then `warn`.
fn filter_directives(verbose: bool, env: [Option<String>; 2]) -> String {
    if verbose {
        return "debug".to_string();
    }
    env.into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| "warn".to_string())
}

pub fn debug(message: impl AsRef<str>) {
    tracing::debug!("{}", message.as_ref());
}

pub fn info(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}
