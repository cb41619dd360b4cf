//! Configuration validation functions

use super::ValidationError;

/// Largest worker pool accepted for indexing and transfer
pub const MAX_CONCURRENCY: usize = 256;

/// Smallest copy buffer accepted
pub const MIN_CHUNK_SIZE: usize = 512;

/// Largest copy buffer accepted (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Validate the shared concurrency budget
pub fn validate_concurrency(workers: usize) -> Result<(), ValidationError> {
	if workers == 0 {
		return Err(ValidationError::ConfigError(
			"max_concurrent_transfers must be at least 1".to_string(),
		));
	}
	if workers > MAX_CONCURRENCY {
		return Err(ValidationError::ConfigError(format!(
			"max_concurrent_transfers must be at most {}, got {}",
			MAX_CONCURRENCY, workers
		)));
	}
	Ok(())
}

/// Validate the copy buffer size in bytes
pub fn validate_chunk_size(size: usize) -> Result<(), ValidationError> {
	if size < MIN_CHUNK_SIZE {
		return Err(ValidationError::ConfigError(format!(
			"chunk_size must be at least {}, got {}",
			MIN_CHUNK_SIZE, size
		)));
	}
	if size > MAX_CHUNK_SIZE {
		return Err(ValidationError::ConfigError(format!(
			"chunk_size must be at most {}, got {}",
			MAX_CHUNK_SIZE, size
		)));
	}
	Ok(())
}

/// Validate retry count (total attempts per file)
pub fn validate_retry_count(count: u32) -> Result<(), ValidationError> {
	if count == 0 {
		return Err(ValidationError::ConfigError(
			"retry_attempts must be at least 1".to_string(),
		));
	}
	if count > 100 {
		return Err(ValidationError::ConfigError(format!("Retry count too high: {}", count)));
	}
	Ok(())
}

/// Validate the delay between attempts
pub fn validate_retry_delay_secs(delay_secs: u64) -> Result<(), ValidationError> {
	if delay_secs > 3600 {
		return Err(ValidationError::ConfigError(format!(
			"Retry delay too large: {} seconds (max 3600)",
			delay_secs
		)));
	}
	Ok(())
}

/// Validate the number of buckets (days) to scan
pub fn validate_days_to_sync(days: usize) -> Result<(), ValidationError> {
	if days == 0 {
		return Err(ValidationError::ConfigError("days_to_sync must be at least 1".to_string()));
	}
	if days > 3660 {
		return Err(ValidationError::ConfigError(format!(
			"days_to_sync too large: {} (max 3660)",
			days
		)));
	}
	Ok(())
}

/// Validate timeout in seconds
pub fn validate_timeout_secs(timeout_secs: u64) -> Result<(), ValidationError> {
	if timeout_secs == 0 {
		return Err(ValidationError::ConfigError("Timeout must be greater than 0".to_string()));
	}
	if timeout_secs > 3600 {
		return Err(ValidationError::ConfigError(format!(
			"Timeout too large: {} seconds (max 3600)",
			timeout_secs
		)));
	}
	Ok(())
}

/// Validate that a remote endpoint carries enough to authenticate
///
/// Local endpoints (empty host or loopback) need no credentials.
pub fn validate_credentials(
	endpoint: &str,
	host: &str,
	username: &str,
	password: &str,
	keyfile: &str,
) -> Result<(), ValidationError> {
	if is_local_host(host) {
		return Ok(());
	}
	if username.is_empty() {
		return Err(ValidationError::ConfigError(format!(
			"{} configuration is incomplete (host and username are required)",
			endpoint
		)));
	}
	if password.is_empty() && keyfile.is_empty() {
		return Err(ValidationError::ConfigError(format!(
			"{} requires either password or key file",
			endpoint
		)));
	}
	Ok(())
}

/// Hosts served by the filesystem-backed session
pub fn is_local_host(host: &str) -> bool {
	matches!(host, "" | "localhost" | "127.0.0.1" | "::1")
}


// vim: ts=4
