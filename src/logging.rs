//! Operator-facing log output.
//!
//! The verbosity is an explicit [`LogLevel`] decided at startup from the
//! CLI or the config file and handed to [`init`]. `RUST_LOG`, when set,
//! takes precedence so individual modules can be traced.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Numeric verbosity as used by the `loglevel` option.
///
/// - 0: errors only
/// - 1: per-image progress (default)
/// - 2: every tool command and shell command
/// - 3+: shell responses byte for byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub u8);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(1)
    }
}

impl LogLevel {
    /// Directive understood by [`EnvFilter`].
    pub fn directive(&self) -> &'static str {
        match self.0 {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Install the global tracing subscriber.
///
/// Output: stderr, compact format.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_directives() {
        assert_eq!(LogLevel(0).directive(), "error");
        assert_eq!(LogLevel::default().directive(), "info");
        assert_eq!(LogLevel(2).directive(), "debug");
        assert_eq!(LogLevel(9).directive(), "trace");
    }
}
