//! Indexed state of one endpoint's subtree
//!
//! Scanner tasks write into a shared [`SnapshotBuilder`] behind a single
//! `RwLock`; [`SnapshotBuilder::finish`] hands back a plain [`TreeSnapshot`]
//! that is read without any locking.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::session;

/// One file discovered during indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
	pub absolute_path: String,

	/// Key used for cross-tree matching
	pub relative_path: String,

	pub size: u64,
	pub modified: SystemTime,

	/// Content hash, only computed on the destination side
	pub fingerprint: Option<String>,
}

/// Files and scanned directories of one subtree
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
	pub root: String,
	pub files: HashMap<String, FileRecord>,

	/// Scanned directories, root-relative
	pub directories: HashSet<String>,
}

impl TreeSnapshot {
	pub fn new(root: impl Into<String>) -> Self {
		Self { root: root.into(), ..Default::default() }
	}

	pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
		self.files.get(relative_path)
	}

	pub fn file_count(&self) -> usize {
		self.files.len()
	}

	pub fn total_bytes(&self) -> u64 {
		self.files.values().map(|f| f.size).sum()
	}
}

/// Concurrent write side of a snapshot
pub struct SnapshotBuilder {
	inner: RwLock<TreeSnapshot>,
}

impl SnapshotBuilder {
	pub fn new(root: impl Into<String>) -> Self {
		Self { inner: RwLock::new(TreeSnapshot::new(root)) }
	}

	/// Record a scanned directory (root-relative)
	pub fn add_dir(&self, relative_path: &str) {
		let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
		snapshot.directories.insert(relative_path.to_string());
	}

	/// Record a file; its parent directory is recorded too
	pub fn add_file(&self, record: FileRecord) {
		let parent = session::parent(&record.relative_path).to_string();
		let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
		snapshot.directories.insert(parent);
		snapshot.files.insert(record.relative_path.clone(), record);
	}

	/// Files and directories recorded so far
	pub fn counts(&self) -> (usize, usize) {
		let snapshot = self.inner.read().unwrap_or_else(|e| e.into_inner());
		(snapshot.files.len(), snapshot.directories.len())
	}

	/// Take the finished snapshot out of the builder
	///
	/// Callable through a shared handle once every writer is done; the
	/// builder is left empty.
	pub fn finish(&self) -> TreeSnapshot {
		let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
		let root = snapshot.root.clone();
		std::mem::replace(&mut *snapshot, TreeSnapshot::new(root))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(rel: &str, size: u64) -> FileRecord {
		FileRecord {
			absolute_path: format!("/root/{}", rel),
			relative_path: rel.to_string(),
			size,
			modified: SystemTime::UNIX_EPOCH,
			fingerprint: None,
		}
	}

	#[test]
	fn test_every_file_has_parent_directory() {
		let builder = SnapshotBuilder::new("/root");
		builder.add_file(record("01012024/a/b.txt", 3));
		builder.add_file(record("01012024/c.txt", 4));
		let snapshot = builder.finish();
		for key in snapshot.files.keys() {
			assert!(snapshot.directories.contains(session::parent(key)));
		}
		assert_eq!(snapshot.total_bytes(), 7);
	}

	#[test]
	fn test_concurrent_writers() {
		let builder = std::sync::Arc::new(SnapshotBuilder::new("/root"));
		let handles: Vec<_> = (0..8)
			.map(|t| {
				let builder = builder.clone();
				std::thread::spawn(move || {
					for i in 0..100 {
						builder.add_file(record(&format!("d{}/f{}", t, i), 1));
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(builder.counts(), (800, 8));
	}
}

// vim: ts=4
