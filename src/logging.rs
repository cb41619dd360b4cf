//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Indexing started");
//! warn!("Failed to set modification time");
//! ```

pub use tracing::{debug, error, info, warn};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Changes the level of an installed subscriber
pub struct LogLevelHandle(reload::Handle<EnvFilter, Registry>);

impl LogLevelHandle {
	/// Switch to `level`, unless `RUST_LOG` is set
	pub fn set_level(&self, level: &str) {
		self.set_level_from(level, std::env::var("RUST_LOG").ok().as_deref());
	}

	fn set_level_from(&self, level: &str, rust_log: Option<&str>) {
		if let Err(e) = self.0.reload(filter_for(level, rust_log)) {
			warn!("Could not change log level to {}: {}", level, e);
		}
	}
}

/// `RUST_LOG` wins when set; otherwise `level`, falling back to info
fn filter_for(level: &str, rust_log: Option<&str>) -> EnvFilter {
	rust_log
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.or_else(|| EnvFilter::try_new(level).ok())
		.unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber with environment filter support.
///
/// Call early with a default `level`, then hand the configured level (from
/// the config file or `BUCKETSYNC_LOG`) to the returned handle:
///
/// ```bash
/// RUST_LOG=debug bucketsync run
/// RUST_LOG=bucketsync::transfer=trace bucketsync run -c config.toml
/// ```
///
/// Returns `None` when a subscriber was already installed (tests, embedding).
pub fn init_tracing(level: &str) -> Option<LogLevelHandle> {
	let filter = filter_for(level, std::env::var("RUST_LOG").ok().as_deref());
	let (filter, handle) = reload::Layer::new(filter);
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.try_init()
		.ok()
		.map(|_| LogLevelHandle(handle))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rust_log_wins_over_configured_level() {
		assert_eq!(filter_for("debug", None).to_string(), "debug");
		assert_eq!(filter_for("debug", Some("warn")).to_string(), "warn");
	}

	#[test]
	fn test_configured_level_applies_after_init() {
		let (filter, handle) = reload::Layer::new(filter_for("info", None));
		let subscriber = tracing_subscriber::registry().with(filter);
		tracing::subscriber::with_default(subscriber, || {
			assert!(!tracing::enabled!(tracing::Level::DEBUG));
			LogLevelHandle(handle).set_level_from("debug", None);
			assert!(tracing::enabled!(tracing::Level::DEBUG));
		});
	}
}

// vim: ts=4
