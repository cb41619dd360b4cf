//! Run statistics
//!
//! One [`RunStatistics`] per run, shared through a [`StatsHandle`] so every
//! counter update goes through a single lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Counters of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
	pub run_id: Uuid,

	/// Every indexed source file (queued + skipped)
	pub total_files: usize,
	pub transferred_files: usize,
	pub skipped_files: usize,
	pub failed_files: usize,
	pub total_bytes_transferred: u64,
	pub started_at: DateTime<Utc>,
	pub duration: Duration,
}

impl RunStatistics {
	pub fn new() -> Self {
		Self {
			run_id: Uuid::new_v4(),
			total_files: 0,
			transferred_files: 0,
			skipped_files: 0,
			failed_files: 0,
			total_bytes_transferred: 0,
			started_at: Utc::now(),
			duration: Duration::ZERO,
		}
	}

	/// Jobs that reached a terminal success or failure
	pub fn attempted_files(&self) -> usize {
		self.transferred_files + self.failed_files
	}

	/// Percentage of attempted jobs that succeeded
	pub fn success_rate(&self) -> Option<f64> {
		let attempted = self.attempted_files();
		if attempted == 0 {
			return None;
		}
		Some(self.transferred_files as f64 / attempted as f64 * 100.0)
	}

	/// Average bytes per second over the whole run
	pub fn throughput(&self) -> Option<f64> {
		let secs = self.duration.as_secs_f64();
		if secs <= 0.0 || self.total_bytes_transferred == 0 {
			return None;
		}
		Some(self.total_bytes_transferred as f64 / secs)
	}

	/// Human-readable summary block, one entry per line
	pub fn summary_lines(&self) -> Vec<String> {
		let rule = "=".repeat(60);
		let mut lines = vec![
			rule.clone(),
			format!("Run {} finished", self.run_id),
			rule.clone(),
			format!("Total files processed: {}", self.total_files),
			format!("Successfully transferred: {}", self.transferred_files),
			format!("Skipped (up-to-date): {}", self.skipped_files),
			format!("Failed transfers: {}", self.failed_files),
			format!("Total data transferred: {}", format_bytes(self.total_bytes_transferred)),
			format!("Total duration: {}", format_duration(self.duration)),
		];
		if let Some(rate) = self.throughput() {
			lines.push(format!("Average throughput: {}", format_rate(rate)));
		}
		if let Some(rate) = self.success_rate() {
			lines.push(format!("Success rate: {:.1}%", rate));
		}
		lines.push(rule);
		lines
	}
}

impl Default for RunStatistics {
	fn default() -> Self {
		Self::new()
	}
}

/// Shared, lock-guarded statistics of the current run
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
	inner: Arc<Mutex<RunStatistics>>,
}

impl StatsHandle {
	pub fn new() -> Self {
		Self::default()
	}

	/// Apply an update under the lock
	pub fn update<F: FnOnce(&mut RunStatistics)>(&self, f: F) {
		let mut stats = self.inner.lock().unwrap_or_else(|e| e.into_inner());
		f(&mut stats);
	}

	/// Copy of the current counters
	pub fn snapshot(&self) -> RunStatistics {
		self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn record_transferred(&self, bytes: u64) {
		self.update(|s| {
			s.transferred_files += 1;
			s.total_bytes_transferred += bytes;
		});
	}

	pub fn record_failed(&self) {
		self.update(|s| s.failed_files += 1);
	}

	/// Freeze the duration, measured from `started`
	pub fn finish(&self, started: Instant) -> RunStatistics {
		self.update(|s| s.duration = started.elapsed());
		self.snapshot()
	}
}

/// Format a byte count with base-1024 units
pub fn format_bytes(bytes: u64) -> String {
	const KB: f64 = 1024.0;
	const MB: f64 = KB * 1024.0;
	const GB: f64 = MB * 1024.0;
	let b = bytes as f64;
	if b > GB {
		format!("{:.2} GB", b / GB)
	} else if b > MB {
		format!("{:.2} MB", b / MB)
	} else if b > KB {
		format!("{:.2} KB", b / KB)
	} else {
		format!("{} bytes", bytes)
	}
}

/// Format a bytes-per-second rate
pub fn format_rate(bytes_per_sec: f64) -> String {
	const KB: f64 = 1024.0;
	const MB: f64 = KB * 1024.0;
	if bytes_per_sec > MB {
		format!("{:.2} MB/s", bytes_per_sec / MB)
	} else if bytes_per_sec > KB {
		format!("{:.2} KB/s", bytes_per_sec / KB)
	} else {
		format!("{:.0} B/s", bytes_per_sec)
	}
}

/// Format a duration rounded to whole seconds (`1h2m3s`)
pub fn format_duration(duration: Duration) -> String {
	let secs = duration.as_secs_f64().round() as u64;
	let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
	if h > 0 {
		format!("{}h{}m{}s", h, m, s)
	} else if m > 0 {
		format!("{}m{}s", m, s)
	} else {
		format!("{}s", s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_format_bytes() {
		assert_eq!(format_bytes(0), "0 bytes");
		assert_eq!(format_bytes(1024), "1024 bytes");
		assert_eq!(format_bytes(2050), "2.00 KB");
		assert_eq!(format_bytes(5 * 1024 * 1024 + 1), "5.00 MB");
		assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 + 1), "3.00 GB");
	}

	#[test]
	fn test_format_rate_and_duration() {
		assert_eq!(format_rate(512.0), "512 B/s");
		assert_eq!(format_rate(2048.0), "2.00 KB/s");
		assert_eq!(format_duration(Duration::from_millis(61_400)), "1m1s");
		assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
	}

	#[test]
	fn test_concurrent_updates_are_not_lost() {
		let stats = StatsHandle::new();
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let stats = stats.clone();
				std::thread::spawn(move || {
					for _ in 0..1000 {
						stats.record_transferred(2);
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
		let snap = stats.snapshot();
		assert_eq!(snap.transferred_files, 8000);
		assert_eq!(snap.total_bytes_transferred, 16000);
	}

	#[test]
	fn test_summary_success_rate() {
		let mut stats = RunStatistics::new();
		stats.transferred_files = 3;
		stats.failed_files = 1;
		stats.total_bytes_transferred = 2050;
		stats.duration = Duration::from_secs(1);
		let summary = stats.summary_lines().join("\n");
		assert!(summary.contains("Success rate: 75.0%"));
		assert!(summary.contains("Total data transferred: 2.00 KB"));
		assert!(summary.contains("Average throughput: 2.00 KB/s"));
	}

	#[test]
	fn test_summary_without_jobs_omits_rates() {
		let stats = RunStatistics::new();
		let summary = stats.summary_lines().join("\n");
		assert!(!summary.contains("Success rate"));
		assert!(!summary.contains("Average throughput"));
	}
}

// vim: ts=4
