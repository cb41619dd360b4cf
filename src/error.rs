//! Error types for bucketsync operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::validation::ValidationError;

/// Run-level error type
#[derive(Debug)]
pub enum SyncError {
	/// An endpoint could not be reached or refused the session
	Connection(ConnectionError),

	/// A directory could not be listed
	Scan(ScanError),

	/// A single file copy attempt failed
	Transfer(TransferError),

	/// The cancellation signal fired before the operation finished
	Cancelled,

	/// Cancelled, and a stage was abandoned after the grace period
	Timeout,

	/// Settings handed to the engine are unusable
	InvalidConfig { message: String },

	/// I/O error outside of a scan or transfer
	Io(io::Error),
}

impl SyncError {
	/// True for the cancellation outcome, which is not a failure
	pub fn is_cancelled(&self) -> bool {
		matches!(self, SyncError::Cancelled | SyncError::Timeout)
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Scan(e) => write!(f, "Scan error: {}", e),
			SyncError::Transfer(e) => write!(f, "Transfer error: {}", e),
			SyncError::Cancelled => write!(f, "Operation cancelled"),
			SyncError::Timeout => write!(f, "Operation cancelled after grace period"),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Connection(e) => Some(e),
			SyncError::Scan(e) => Some(e),
			SyncError::Transfer(e) => Some(e),
			SyncError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ScanError> for SyncError {
	fn from(e: ScanError) -> Self {
		SyncError::Scan(e)
	}
}

impl From<TransferError> for SyncError {
	fn from(e: TransferError) -> Self {
		SyncError::Transfer(e)
	}
}

/// Session establishment errors
#[derive(Debug)]
pub enum ConnectionError {
	/// Endpoint could not be reached at all
	Unreachable { endpoint: String, source: Box<dyn Error + Send + Sync> },

	/// Endpoint rejected the credentials
	AuthenticationFailed { endpoint: String, message: String },

	/// Session dropped while in use
	Disconnected { endpoint: String },

	/// Provider cannot serve this kind of endpoint
	Unsupported { endpoint: String, message: String },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::Unreachable { endpoint, source } => {
				write!(f, "Failed to connect to {}: {}", endpoint, source)
			}
			ConnectionError::AuthenticationFailed { endpoint, message } => {
				write!(f, "Authentication to {} failed: {}", endpoint, message)
			}
			ConnectionError::Disconnected { endpoint } => {
				write!(f, "Connection lost to {}", endpoint)
			}
			ConnectionError::Unsupported { endpoint, message } => {
				write!(f, "Cannot open session to {}: {}", endpoint, message)
			}
		}
	}
}

impl Error for ConnectionError {}

/// A single directory listing failed
#[derive(Debug)]
pub struct ScanError {
	pub path: String,
	pub source: io::Error,
}

impl fmt::Display for ScanError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "failed to read directory {}: {}", self.path, self.source)
	}
}

impl Error for ScanError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.source)
	}
}

/// Failure of one copy attempt
#[derive(Debug)]
pub enum TransferError {
	/// Source object could not be opened
	Open { path: String, source: io::Error },

	/// Temporary destination object could not be created
	Create { path: String, source: io::Error },

	/// Destination parent directory could not be created
	CreateDir { path: String, source: io::Error },

	/// Reading from the source failed mid-stream
	Read { path: String, source: io::Error },

	/// Writing to the destination failed mid-stream
	Write { path: String, source: io::Error },

	/// Reading the temporary object back for verification failed
	Verify { path: String, source: io::Error },

	/// Committing the temporary object failed
	Rename { from: String, to: String, source: io::Error },

	/// Source and destination digests differ after the copy
	FingerprintMismatch { path: String, source_digest: String, destination_digest: String },
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferError::Open { path, source } => {
				write!(f, "failed to open source file {}: {}", path, source)
			}
			TransferError::Create { path, source } => {
				write!(f, "failed to create destination file {}: {}", path, source)
			}
			TransferError::CreateDir { path, source } => {
				write!(f, "failed to create destination directory {}: {}", path, source)
			}
			TransferError::Read { path, source } => {
				write!(f, "failed to read from source {}: {}", path, source)
			}
			TransferError::Write { path, source } => {
				write!(f, "failed to write to destination {}: {}", path, source)
			}
			TransferError::Verify { path, source } => {
				write!(f, "failed to read back destination {} for verification: {}", path, source)
			}
			TransferError::Rename { from, to, source } => {
				write!(f, "failed to rename {} to {}: {}", from, to, source)
			}
			TransferError::FingerprintMismatch { path, source_digest, destination_digest } => {
				write!(
					f,
					"hash verification failed for {}: src={}, dest={}",
					path, source_digest, destination_digest
				)
			}
		}
	}
}

impl TransferError {
	/// Underlying I/O error, if the attempt failed on I/O
	pub fn io_error(&self) -> Option<&io::Error> {
		match self {
			TransferError::Open { source, .. }
			| TransferError::Create { source, .. }
			| TransferError::CreateDir { source, .. }
			| TransferError::Read { source, .. }
			| TransferError::Write { source, .. }
			| TransferError::Verify { source, .. }
			| TransferError::Rename { source, .. } => Some(source),
			TransferError::FingerprintMismatch { .. } => None,
		}
	}

	/// True when the error came from the source session
	pub fn is_source_side(&self) -> bool {
		matches!(self, TransferError::Open { .. } | TransferError::Read { .. })
	}

	/// True when the session itself went away
	pub fn is_disconnect(&self) -> bool {
		self.io_error().map_or(false, |e| e.kind() == io::ErrorKind::NotConnected)
	}
}

impl Error for TransferError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		self.io_error().map(|e| e as &(dyn Error + 'static))
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file exists but could not be read
	Read { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// Config failed validation
	Invalid(ValidationError),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "failed to read config file {}: {}", path, source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "failed to parse config file {}: {}", path, message)
			}
			ConfigError::Invalid(e) => write!(f, "{}", e),
		}
	}
}

impl Error for ConfigError {}

impl From<ValidationError> for ConfigError {
	fn from(e: ValidationError) -> Self {
		ConfigError::Invalid(e)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_scan_error_message_names_directory() {
		let err = ScanError {
			path: "/data/01012024".to_string(),
			source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
		};
		assert_eq!(err.to_string(), "failed to read directory /data/01012024: denied");
	}

	#[test]
	fn test_cancelled_is_not_a_failure_kind() {
		assert!(SyncError::Cancelled.is_cancelled());
		let err: SyncError = io::Error::new(io::ErrorKind::Other, "boom").into();
		assert!(!err.is_cancelled());
	}

	#[test]
	fn test_read_back_failure_belongs_to_destination() {
		let err = TransferError::Verify {
			path: "/out/01012024/f.bsync-tmp".to_string(),
			source: io::Error::new(io::ErrorKind::NotConnected, "connection lost"),
		};
		assert!(err.is_disconnect());
		assert!(!err.is_source_side());
		assert!(err.to_string().starts_with("failed to read back destination"));

		let err = TransferError::Read {
			path: "/in/01012024/f".to_string(),
			source: io::Error::new(io::ErrorKind::NotConnected, "connection lost"),
		};
		assert!(err.is_source_side());
	}
}

// vim: ts=4
