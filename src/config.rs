//! Configuration for bucketsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (config.json / config.json5 / config.toml)
//! 3. Environment variables (SOURCE_*, DEST_*, and sync keys)
//!
//! Keys use the snake_case names of the original `config.json` layout, so
//! existing files load unchanged.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::*;
use crate::validation::{self, ValidationError, Validator};

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Complete configuration: two endpoints plus the sync parameters table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Endpoint files are read from
	pub source: EndpointConfig,

	/// Endpoint files are mirrored to
	pub destination: EndpointConfig,

	/// Sync parameters handed to the engine
	pub sync: SyncSettings,

	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			source: EndpointConfig::default(),
			destination: EndpointConfig::default(),
			sync: SyncSettings::default(),
			log_level: "info".to_string(),
		}
	}
}

// ============================================================================
// ENDPOINT
// ============================================================================

/// Connection parameters for one endpoint
///
/// Opaque to the engine; only the session provider reads them.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
	pub host: String,
	pub port: u16,
	pub username: String,
	pub password: String,

	/// Path to a private key file
	#[serde(rename = "keyfile")]
	pub key_file: String,

	/// Connect timeout in seconds
	#[serde(rename = "timeout")]
	pub timeout_secs: u64,

	/// Keep-alive interval in seconds (0 disables)
	#[serde(rename = "keepalive")]
	pub keepalive_secs: u64,
}

impl Default for EndpointConfig {
	fn default() -> Self {
		EndpointConfig {
			host: String::new(),
			port: 22,
			username: String::new(),
			password: String::new(),
			key_file: String::new(),
			timeout_secs: 30,
			keepalive_secs: 0,
		}
	}
}

impl EndpointConfig {
	/// Human-readable `user@host:port` label, used in logs and errors
	pub fn label(&self) -> String {
		let host = if self.host.is_empty() { "localhost" } else { self.host.as_str() };
		if self.username.is_empty() {
			format!("{}:{}", host, self.port)
		} else {
			format!("{}@{}:{}", self.username, host, self.port)
		}
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	pub fn keepalive(&self) -> Option<Duration> {
		if self.keepalive_secs == 0 {
			None
		} else {
			Some(Duration::from_secs(self.keepalive_secs))
		}
	}

	/// Copy with secrets replaced, for display
	pub fn masked(&self) -> Self {
		let mut copy = self.clone();
		if !copy.password.is_empty() {
			copy.password = "********".to_string();
		}
		copy
	}
}

// Secrets never reach Debug output (and therefore never reach logs)
impl std::fmt::Debug for EndpointConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EndpointConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("username", &self.username)
			.field("password", &if self.password.is_empty() { "" } else { "********" })
			.field("key_file", &self.key_file)
			.field("timeout_secs", &self.timeout_secs)
			.field("keepalive_secs", &self.keepalive_secs)
			.finish()
	}
}

// ============================================================================
// SYNC PARAMETERS
// ============================================================================

/// Sync parameters table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
	/// Root of the mirrored tree on the source endpoint
	pub source_path: String,

	/// Root of the mirrored tree on the destination endpoint
	pub destination_path: String,

	/// Substring, name-prefix or glob patterns to leave out
	pub exclude_patterns: Vec<String>,

	/// Concurrency budget for both indexing and transfer
	pub max_concurrent_transfers: usize,

	/// Copy buffer size in bytes
	pub chunk_size: usize,

	/// Attempts per file before it is marked failed
	pub retry_attempts: u32,

	/// Fixed delay between attempts, in seconds
	#[serde(rename = "retry_delay")]
	pub retry_delay_secs: u64,

	/// Hash both sides of every copy and compare before commit
	pub verify_transfers: bool,

	/// Number of date buckets (days) to scan
	pub days_to_sync: usize,

	/// How long in-flight work may unwind after cancellation, in seconds
	pub grace_period_secs: u64,
}

impl Default for SyncSettings {
	fn default() -> Self {
		SyncSettings {
			source_path: String::new(),
			destination_path: String::new(),
			exclude_patterns: vec![],
			max_concurrent_transfers: 4,
			chunk_size: 32 * 1024,
			retry_attempts: 3,
			retry_delay_secs: 5,
			verify_transfers: true,
			days_to_sync: 7,
			grace_period_secs: 5,
		}
	}
}

impl SyncSettings {
	pub fn retry_delay(&self) -> Duration {
		Duration::from_secs(self.retry_delay_secs)
	}

	pub fn grace_period(&self) -> Duration {
		Duration::from_secs(self.grace_period_secs)
	}
}

impl Validator for SyncSettings {
	fn validate(&self) -> Result<(), ValidationError> {
		validation::validate_sync_root("source_path", &self.source_path)?;
		validation::validate_sync_root("destination_path", &self.destination_path)?;
		validation::validate_concurrency(self.max_concurrent_transfers)?;
		validation::validate_chunk_size(self.chunk_size)?;
		validation::validate_retry_count(self.retry_attempts)?;
		validation::validate_retry_delay_secs(self.retry_delay_secs)?;
		validation::validate_days_to_sync(self.days_to_sync)?;
		Ok(())
	}
}

impl Validator for Config {
	fn validate(&self) -> Result<(), ValidationError> {
		for (name, endpoint) in
			[("Source SFTP", &self.source), ("Destination SFTP", &self.destination)]
		{
			validation::validate_credentials(
				name,
				&endpoint.host,
				&endpoint.username,
				&endpoint.password,
				&endpoint.key_file,
			)?;
			validation::validate_timeout_secs(endpoint.timeout_secs)?;
		}
		self.sync.validate()
	}
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
	/// Load from a file (if present) and apply environment overrides
	///
	/// A missing file is not an error: defaults plus environment are used.
	pub fn load(path: &Path) -> Result<Config, ConfigError> {
		let mut config = if path.exists() {
			info!("Loading configuration from {}", path.display());
			Config::from_file(path)?
		} else {
			info!("Config file {} not found, using environment variables", path.display());
			Config::default()
		};
		config.apply_env_from(|key| std::env::var(key).ok());
		Ok(config)
	}

	/// Parse a config file, choosing the format by extension
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let display = path.display().to_string();
		let contents = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Read { path: display.clone(), source: e })?;
		let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
		if is_toml {
			toml::from_str(&contents)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		} else {
			json5::from_str(&contents)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		}
	}

	/// Load, then reject anything the engine cannot run with
	pub fn load_validated(path: &Path) -> Result<Config, ConfigError> {
		Ok(Config::load(path)?.validated()?)
	}

	/// Apply overrides from a key lookup (the process environment in production)
	///
	/// Unparsable numeric and boolean values are ignored.
	pub fn apply_env_from<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

		for (prefix, endpoint) in [("SOURCE", &mut self.source), ("DEST", &mut self.destination)] {
			if let Some(v) = get(&format!("{}_HOST", prefix)) {
				endpoint.host = v;
			}
			if let Some(v) = get(&format!("{}_PORT", prefix)) {
				set_parsed(&mut endpoint.port, &format!("{}_PORT", prefix), &v);
			}
			if let Some(v) = get(&format!("{}_USERNAME", prefix)) {
				endpoint.username = v;
			}
			if let Some(v) = get(&format!("{}_PASSWORD", prefix)) {
				endpoint.password = v;
			}
			if let Some(v) = get(&format!("{}_KEYFILE", prefix)) {
				endpoint.key_file = v;
			}
			if let Some(v) = get(&format!("{}_TIMEOUT", prefix)) {
				set_parsed(&mut endpoint.timeout_secs, &format!("{}_TIMEOUT", prefix), &v);
			}
			if let Some(v) = get(&format!("{}_KEEPALIVE", prefix)) {
				set_parsed(&mut endpoint.keepalive_secs, &format!("{}_KEEPALIVE", prefix), &v);
			}
		}

		let sync = &mut self.sync;
		if let Some(v) = get("SOURCE_PATH") {
			sync.source_path = v;
		}
		if let Some(v) = get("DEST_PATH") {
			sync.destination_path = v;
		}
		if let Some(v) = get("EXCLUDE_PATTERNS") {
			sync.exclude_patterns = v.split(',').map(|p| p.to_string()).collect();
		}
		if let Some(v) = get("MAX_CONCURRENT_TRANSFERS") {
			set_parsed(&mut sync.max_concurrent_transfers, "MAX_CONCURRENT_TRANSFERS", &v);
		}
		if let Some(v) = get("CHUNK_SIZE") {
			set_parsed(&mut sync.chunk_size, "CHUNK_SIZE", &v);
		}
		if let Some(v) = get("RETRY_ATTEMPTS") {
			set_parsed(&mut sync.retry_attempts, "RETRY_ATTEMPTS", &v);
		}
		if let Some(v) = get("RETRY_DELAY") {
			set_parsed(&mut sync.retry_delay_secs, "RETRY_DELAY", &v);
		}
		if let Some(v) = get("VERIFY_TRANSFERS") {
			match parse_bool(&v) {
				Some(b) => sync.verify_transfers = b,
				None => warn!("Ignoring VERIFY_TRANSFERS={:?}: not a boolean", v),
			}
		}
		if let Some(v) = get("DAYS_TO_SYNC") {
			set_parsed(&mut sync.days_to_sync, "DAYS_TO_SYNC", &v);
		}
		if let Some(v) = get("BUCKETSYNC_LOG") {
			self.log_level = v;
		}
	}

	/// Copy with endpoint secrets masked, for display
	pub fn masked(&self) -> Config {
		Config {
			source: self.source.masked(),
			destination: self.destination.masked(),
			sync: self.sync.clone(),
			log_level: self.log_level.clone(),
		}
	}
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
	match value.trim().parse() {
		Ok(parsed) => *slot = parsed,
		Err(_) => warn!("Ignoring {}={:?}: not a valid number", key, value),
	}
}

// Accepts the spellings Go's strconv.ParseBool accepts
fn parse_bool(value: &str) -> Option<bool> {
	match value.trim() {
		"1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
		"0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.sync.max_concurrent_transfers, 4);
		assert_eq!(config.sync.retry_attempts, 3);
		assert_eq!(config.source.port, 22);
		assert_eq!(config.log_level, "info");
	}

	#[test]
	fn test_original_json_layout_parses() {
		let json = r#"{
			"source": { "host": "src.example.com", "port": 2222, "username": "u",
				"password": "p", "keyfile": "", "timeout": 10, "keepalive": 15 },
			"destination": { "host": "dst.example.com", "username": "v", "keyfile": "/k" },
			"sync": {
				"source_path": "/in", "destination_path": "/out",
				"exclude_patterns": [".tmp", "*.part"],
				"max_concurrent_transfers": 8, "chunk_size": 65536,
				"retry_attempts": 2, "retry_delay": 1,
				"verify_transfers": false, "days_to_sync": 3,
			}
		}"#;
		let config: Config = json5::from_str(json).unwrap();
		assert_eq!(config.source.port, 2222);
		assert_eq!(config.source.keepalive(), Some(Duration::from_secs(15)));
		assert_eq!(config.destination.key_file, "/k");
		assert_eq!(config.destination.port, 22);
		assert_eq!(config.sync.retry_delay(), Duration::from_secs(1));
		assert_eq!(config.sync.exclude_patterns, vec![".tmp", "*.part"]);
		assert!(!config.sync.verify_transfers);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_env_overrides_file_values() {
		let mut config = Config::default();
		config.sync.source_path = "/from-file".to_string();
		let vars = env(&[
			("SOURCE_PATH", "/from-env"),
			("DEST_PORT", "2200"),
			("EXCLUDE_PATTERNS", ".tmp,~"),
			("VERIFY_TRANSFERS", "false"),
			("DAYS_TO_SYNC", "2"),
		]);
		config.apply_env_from(|k| vars.get(k).cloned());
		assert_eq!(config.sync.source_path, "/from-env");
		assert_eq!(config.destination.port, 2200);
		assert_eq!(config.sync.exclude_patterns, vec![".tmp", "~"]);
		assert!(!config.sync.verify_transfers);
		assert_eq!(config.sync.days_to_sync, 2);
	}

	#[test]
	fn test_env_ignores_unparsable_numbers() {
		let mut config = Config::default();
		let vars = env(&[("MAX_CONCURRENT_TRANSFERS", "lots"), ("VERIFY_TRANSFERS", "maybe")]);
		config.apply_env_from(|k| vars.get(k).cloned());
		assert_eq!(config.sync.max_concurrent_transfers, 4);
		assert!(config.sync.verify_transfers);
	}

	#[test]
	fn test_validate_rejects_remote_without_credentials() {
		let mut config = Config::default();
		config.sync.source_path = "/in".to_string();
		config.sync.destination_path = "/out".to_string();
		config.source.host = "sftp.example.com".to_string();
		config.source.username = "backup".to_string();
		let err = config.validate().unwrap_err();
		assert!(err.to_string().contains("password or key file"));
	}

	#[test]
	fn test_debug_masks_password() {
		let endpoint = EndpointConfig { password: "hunter2".to_string(), ..Default::default() };
		let debug = format!("{:?}", endpoint);
		assert!(!debug.contains("hunter2"));
		assert_eq!(endpoint.masked().password, "********");
	}

	#[test]
	fn test_toml_config_file() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(
			&path,
			"log_level = \"debug\"\n[sync]\nsource_path = \"/a\"\ndestination_path = \"/b\"\n",
		)
		.unwrap();
		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.log_level, "debug");
		assert_eq!(config.sync.source_path, "/a");
		assert_eq!(config.sync.chunk_size, 32 * 1024);
	}
}

// vim: ts=4
