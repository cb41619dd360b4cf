//! Exclusion predicate built from `exclude_patterns`
//!
//! A plain pattern excludes an entry when the entry's full path contains it,
//! or when the entry's name starts with it. Patterns containing glob
//! metacharacters are compiled with globset and matched against the
//! root-relative path and the name. Engine temp files are always excluded.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;

use crate::session;
use crate::transfer::TEMP_SUFFIX;

/// Exclusion errors
#[derive(Debug)]
pub enum ExclusionError {
	InvalidPattern(String),
}

impl fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExclusionError::InvalidPattern(msg) => write!(f, "Invalid exclude pattern: {}", msg),
		}
	}
}

impl std::error::Error for ExclusionError {}

/// Compiled exclusion predicate
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
	/// Substring / name-prefix patterns
	literals: Vec<String>,

	/// User glob patterns
	globs: GlobSet,

	/// Always-excluded patterns (built-in)
	always_exclude: GlobSet,
}

impl ExclusionFilter {
	/// Compile a filter; blank patterns are ignored
	pub fn new(patterns: &[String]) -> Result<Self, ExclusionError> {
		let mut literals = Vec::new();
		let mut globs = Vec::new();
		for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
			if is_glob(pattern) {
				globs.push(pattern.to_string());
			} else {
				literals.push(pattern.to_string());
			}
		}

		let always_exclude = Self::build_glob_set(&[format!("**/*{}", TEMP_SUFFIX)])?;
		let globs = Self::build_glob_set(&globs)?;
		Ok(Self { literals, globs, always_exclude })
	}

	/// Filter that only drops engine temp files
	pub fn empty() -> Self {
		let always_exclude = Self::build_glob_set(&[format!("**/*{}", TEMP_SUFFIX)])
			.unwrap_or_else(|_| GlobSet::empty());
		Self { literals: vec![], globs: GlobSet::empty(), always_exclude }
	}

	fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ExclusionError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			let glob = Glob::new(pattern)
				.map_err(|e| ExclusionError::InvalidPattern(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}
		builder.build().map_err(|e| {
			ExclusionError::InvalidPattern(format!("Failed to build pattern set: {}", e))
		})
	}

	/// Check an entry by its full remote path and its root-relative path
	pub fn is_excluded(&self, full_path: &str, relative_path: &str) -> bool {
		let name = session::basename(full_path);
		if self.always_exclude.is_match(relative_path) || self.always_exclude.is_match(name) {
			return true;
		}

		if self.literals.iter().any(|p| full_path.contains(p.as_str()) || name.starts_with(p.as_str()))
		{
			return true;
		}

		self.globs.is_match(relative_path) || self.globs.is_match(name)
	}

	pub fn pattern_count(&self) -> usize {
		self.literals.len() + self.globs.len()
	}
}

fn is_glob(pattern: &str) -> bool {
	pattern.contains(['*', '?', '[', '{'])
}


// vim: ts=4
