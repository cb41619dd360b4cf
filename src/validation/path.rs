//! Remote path validation
//!
//! Remote paths are `/`-separated strings; they are never interpreted by the
//! local platform's path rules.

use super::ValidationError;

/// True when no segment of the path is `..`
pub fn is_path_safe(path: &str) -> bool {
	!path.split('/').any(|segment| segment == "..")
}

/// Validate that a path cannot climb out of its root
pub fn validate_path_safe(path: &str) -> Result<(), ValidationError> {
	if !is_path_safe(path) {
		return Err(ValidationError::PathError(format!(
			"Path contains parent directory reference (..): {}",
			path
		)));
	}
	Ok(())
}

/// Validate a sync root: non-empty and free of `..` segments
pub fn validate_sync_root(name: &str, path: &str) -> Result<(), ValidationError> {
	if path.trim().is_empty() {
		return Err(ValidationError::PathError(format!("{} must not be empty", name)));
	}
	validate_path_safe(path)
}

/// Validate a bucket name: exactly one normal path segment
pub fn validate_bucket_name(bucket: &str) -> Result<(), ValidationError> {
	if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains('/') {
		return Err(ValidationError::PathError(format!(
			"Bucket name must be a single directory name, got {:?}",
			bucket
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_is_path_safe_normal() {
		assert!(is_path_safe("file.txt"));
		assert!(is_path_safe("/data/01012024/file.txt"));
		assert!(is_path_safe("a/b/..c/file.txt"));
	}

	#[test]
	fn test_is_path_safe_with_parent() {
		assert!(!is_path_safe("../file.txt"));
		assert!(!is_path_safe("/data/../etc/passwd"));
	}

	#[test]
	fn test_validate_sync_root_empty() {
		let result = validate_sync_root("source_path", "  ");
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("source_path must not be empty"));
	}

	#[test]
	fn test_validate_bucket_name() {
		assert!(validate_bucket_name("01012024").is_ok());
		assert!(validate_bucket_name("").is_err());
		assert!(validate_bucket_name("..").is_err());
		assert!(validate_bucket_name("a/b").is_err());
	}
}

// vim: ts=4
