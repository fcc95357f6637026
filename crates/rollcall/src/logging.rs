//! Logging setup for the `rollcall` binary.
//!
//! Log lines go to stderr; stdout carries command output (tables, JSON, CSV
//! exports written to `-`). The filter comes from `ROLLCALL_LOG`, then
//! `RUST_LOG`, then the command-line verbosity.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding filter directives for rollcall only.
pub const LOG_ENV: &str = "ROLLCALL_LOG";

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings, such as skipped malformed embeddings.
    #[default]
    Normal,
    /// Match decisions and attendance writes.
    Verbose,
    /// Per-student distances and storage queries.
    Trace,
}

impl Verbosity {
    /// Map `-q` and the number of `-v` flags to a verbosity. `-q` wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::INFO,
            Self::Trace => Level::DEBUG,
        }
    }
}

/// Pick the filter directives: an explicit override if it is non-blank,
/// otherwise `rollcall=<level>` for `verbosity`.
#[must_use]
pub fn filter_directives(verbosity: Verbosity, env_override: Option<&str>) -> String {
    match env_override.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives.to_string(),
        _ => format!("rollcall={}", verbosity.to_level_filter()),
    }
}

fn env_override() -> Option<String> {
    std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
}

/// Install the global subscriber.
///
/// Invalid override directives fall back to the verbosity default. Calling
/// this more than once keeps the first subscriber.
///
/// # Examples
///
/// ```no_run
/// use rollcall::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let directives = filter_directives(verbosity, env_override().as_deref());
    let env_filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(verbosity, None)));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Initialize logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
