//! Logging utilities.
//!
//! Logger initialization plus an in-memory ring of recent records, so hosts
//! can surface the latest engine warnings (compile errors, context loss)
//! without scraping stderr.

mod init;
mod ring;

pub use init::{init_logging, LoggingConfig};
pub use ring::{recent_entries, LogEntry};
