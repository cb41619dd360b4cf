//! Rules a config has to pass before the engine will run with it
//!
//! `config` holds the numeric range checks and endpoint credential rules,
//! `path` the sync-root and bucket-name checks.

use std::error::Error;
use std::fmt;

pub mod config;
pub mod path;

pub use config::*;
pub use path::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// A setting is out of range or an endpoint is incomplete
	ConfigError(String),
	/// A sync root or bucket name is unusable
	PathError(String),
}

impl ValidationError {
	pub fn message(&self) -> &str {
		match self {
			ValidationError::ConfigError(msg) | ValidationError::PathError(msg) => msg,
		}
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "invalid configuration: {}", msg),
			ValidationError::PathError(msg) => write!(f, "invalid path: {}", msg),
		}
	}
}

impl Error for ValidationError {}

/// Implemented by every config section the engine consumes
pub trait Validator {
	fn validate(&self) -> Result<(), ValidationError>;

	/// Pass `self` through only when it validates
	fn validated(self) -> Result<Self, ValidationError>
	where
		Self: Sized,
	{
		self.validate()?;
		Ok(self)
	}
}


// vim: ts=4
