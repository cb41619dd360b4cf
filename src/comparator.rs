//! Snapshot comparator
//!
//! Turns a source and a destination snapshot into the ordered work list.
//! Files present only at the destination are left alone.

use crate::logging::*;
use crate::session;
use crate::snapshot::{FileRecord, TreeSnapshot};

/// Lifecycle of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
	Pending,
	InFlight,
	Succeeded,
	Failed,
	Cancelled,
}

/// One file queued for copy
#[derive(Debug, Clone)]
pub struct TransferJob {
	/// Source-side record
	pub record: FileRecord,
	pub destination_path: String,
	pub reason: Reason,
	pub attempts_made: u32,
	pub state: JobState,
}

impl TransferJob {
	pub fn new(record: FileRecord, destination_root: &str, reason: Reason) -> Self {
		let destination_path = session::join(destination_root, &record.relative_path);
		Self { record, destination_path, reason, attempts_made: 0, state: JobState::Pending }
	}
}

/// Why a file was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
	Missing,
	SizeChanged,
	Newer,
}

impl Reason {
	pub fn as_str(&self) -> &'static str {
		match self {
			Reason::Missing => "new",
			Reason::SizeChanged => "size changed",
			Reason::Newer => "newer",
		}
	}
}

/// Outcome of a comparison
#[derive(Debug, Default)]
pub struct Comparison {
	/// Sorted ascending by source size
	pub jobs: Vec<TransferJob>,

	/// Source files already up to date
	pub skipped: usize,
}

impl Comparison {
	pub fn total_bytes(&self) -> u64 {
		self.jobs.iter().map(|j| j.record.size).sum()
	}

	/// Queued jobs that were missing at the destination
	pub fn new_files(&self) -> usize {
		self.jobs.iter().filter(|j| j.reason == Reason::Missing).count()
	}
}

/// Decide whether a source file needs copying
pub fn needs_transfer(source: &FileRecord, destination: Option<&FileRecord>) -> Option<Reason> {
	match destination {
		None => Some(Reason::Missing),
		Some(dest) if dest.size != source.size => Some(Reason::SizeChanged),
		Some(dest) if source.modified > dest.modified => Some(Reason::Newer),
		Some(_) => None,
	}
}

/// Build the work list for `source` against `destination`
pub fn compare(source: &TreeSnapshot, destination: &TreeSnapshot) -> Comparison {
	let mut comparison = Comparison::default();
	for record in source.files.values() {
		match needs_transfer(record, destination.get(&record.relative_path)) {
			Some(reason) => {
				debug!("Queued {} ({})", record.relative_path, reason.as_str());
				comparison.jobs.push(TransferJob::new(record.clone(), &destination.root, reason));
			}
			None => comparison.skipped += 1,
		}
	}
	// Path tie-break keeps the order deterministic across runs
	comparison.jobs.sort_by(|a, b| {
		a.record
			.size
			.cmp(&b.record.size)
			.then_with(|| a.record.relative_path.cmp(&b.record.relative_path))
	});
	comparison
}


// vim: ts=4
