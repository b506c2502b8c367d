use std::sync::Once;

use env_logger::WriteStyle;
use log::LevelFilter;

use super::ring::{self, RingLogger};

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` filter syntax ("warn",
/// "lumen_engine=debug", ...). When unset, `RUST_LOG` is consulted, then
/// `default_level`.
///
/// `ring_capacity` is the number of recent entries kept in memory for
/// [`recent_entries`](super::recent_entries). Zero disables the ring.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub default_level: LevelFilter,
    pub write_style: WriteStyle,
    pub ring_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            default_level: LevelFilter::Info,
            write_style: WriteStyle::Auto,
            ring_capacity: 256,
        }
    }
}

impl LoggingConfig {
    /// Config with an explicit filter string, ignoring `RUST_LOG`.
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self { env_filter: Some(filter.into()), ..Self::default() }
    }

    fn resolved_filter(&self) -> Option<String> {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|f| !f.trim().is_empty())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger: an `env_logger` writer behind the in-memory
/// ring. Only the first call has an effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match config.resolved_filter() {
            Some(filter) => builder.parse_filters(&filter),
            None => builder.filter_level(config.default_level),
        };
        builder.write_style(config.write_style);

        let writer = builder.build();
        let max_level = writer.filter();
        ring::set_capacity(config.ring_capacity);

        // A test harness may have installed its own logger already.
        if log::set_boxed_logger(Box::new(RingLogger::new(writer))).is_ok() {
            log::set_max_level(max_level);
        }
        log::debug!("logging initialized (ring capacity {})", config.ring_capacity);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let config = LoggingConfig::with_filter("lumen_engine=trace");
        assert_eq!(config.resolved_filter().as_deref(), Some("lumen_engine=trace"));
    }

    #[test]
    fn blank_filter_is_ignored() {
        let config = LoggingConfig::with_filter("   ");
        if std::env::var("RUST_LOG").map_or(true, |v| v.trim().is_empty()) {
            assert_eq!(config.resolved_filter(), None);
        }
    }
}
