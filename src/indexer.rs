//! Tree indexer
//!
//! Builds a [`TreeSnapshot`] of one endpoint, restricted to a list of
//! top-level buckets. Each bucket is walked depth-first by its own task;
//! bucket tasks share one semaphore sized by the concurrency budget.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionError, ScanError, SyncError};
use crate::events::{IndexProgress, ProgressEvent, Reporter};
use crate::exclusion::ExclusionFilter;
use crate::logging::*;
use crate::session::{self, RemoteSession};
use crate::snapshot::{FileRecord, SnapshotBuilder, TreeSnapshot};
use crate::validation;

/// Interval between indexing progress ticks
pub const INDEX_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Which endpoint is being indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Source,
	Destination,
}

impl Side {
	pub fn as_str(&self) -> &'static str {
		match self {
			Side::Source => "source",
			Side::Destination => "destination",
		}
	}
}

/// Walks one endpoint's buckets into a snapshot
pub struct TreeIndexer {
	session: Arc<dyn RemoteSession>,
	filter: Arc<ExclusionFilter>,
	reporter: Reporter,
	cancel: CancellationToken,
	max_concurrency: usize,
	chunk_size: usize,
	progress_interval: Duration,
}

/// Shared by the bucket tasks of one pass
struct ScanContext {
	session: Arc<dyn RemoteSession>,
	filter: Arc<ExclusionFilter>,
	reporter: Reporter,
	cancel: CancellationToken,
	builder: SnapshotBuilder,
	root: String,
	fingerprint: bool,
	chunk_size: usize,

	/// Set when the session itself dropped; ends every bucket walk
	disconnected: AtomicBool,
}

impl TreeIndexer {
	pub fn new(
		session: Arc<dyn RemoteSession>,
		filter: Arc<ExclusionFilter>,
		reporter: Reporter,
		cancel: CancellationToken,
	) -> Self {
		Self {
			session,
			filter,
			reporter,
			cancel,
			max_concurrency: 4,
			chunk_size: 32 * 1024,
			progress_interval: INDEX_PROGRESS_INTERVAL,
		}
	}

	pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
		self.max_concurrency = max_concurrency.max(1);
		self
	}

	pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
		self.chunk_size = chunk_size.max(1);
		self
	}

	pub fn with_progress_interval(mut self, interval: Duration) -> Self {
		self.progress_interval = interval;
		self
	}

	/// Index `buckets` under `root`
	///
	/// Destination files are fingerprinted; source files are not. Returns
	/// `SyncError::Cancelled` if the token fired before the pass finished.
	pub async fn index(
		&self,
		side: Side,
		root: &str,
		buckets: &[String],
	) -> Result<TreeSnapshot, SyncError> {
		let started = Instant::now();
		self.reporter.info(format!(
			"Indexing {} tree {} ({} buckets)",
			side.as_str(),
			root,
			buckets.len()
		));

		let ctx = Arc::new(ScanContext {
			session: self.session.clone(),
			filter: self.filter.clone(),
			reporter: self.reporter.clone(),
			cancel: self.cancel.clone(),
			builder: SnapshotBuilder::new(root),
			root: root.to_string(),
			fingerprint: side == Side::Destination,
			chunk_size: self.chunk_size,
			disconnected: AtomicBool::new(false),
		});
		let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
		let buckets_done = Arc::new(AtomicUsize::new(0));

		let progress_done = CancellationToken::new();
		let _progress_guard = progress_done.clone().drop_guard();
		let progress = tokio::spawn(report_progress(
			ctx.clone(),
			side,
			buckets.len(),
			buckets_done.clone(),
			started,
			self.progress_interval,
			progress_done.clone(),
		));

		// Dropping the set aborts walks still running
		let mut tasks = JoinSet::new();
		for bucket in buckets {
			if let Err(e) = validation::validate_bucket_name(bucket) {
				self.reporter.warn(format!("Skipping bucket: {}", e));
				buckets_done.fetch_add(1, Ordering::Relaxed);
				continue;
			}
			let ctx = ctx.clone();
			let semaphore = semaphore.clone();
			let buckets_done = buckets_done.clone();
			let bucket = bucket.clone();
			tasks.spawn(async move {
				if ctx.cancel.is_cancelled() {
					return;
				}
				let _permit = tokio::select! {
					_ = ctx.cancel.cancelled() => return,
					permit = semaphore.acquire_owned() => match permit {
						Ok(permit) => permit,
						Err(_) => return,
					},
				};
				if ctx.cancel.is_cancelled() {
					return;
				}
				scan_bucket(&ctx, &bucket).await;
				buckets_done.fetch_add(1, Ordering::Relaxed);
			});
		}

		while let Some(joined) = tasks.join_next().await {
			if let Err(e) = joined {
				self.reporter.error(format!("Indexing task failed: {}", e));
			}
		}
		progress_done.cancel();
		let _ = progress.await;

		if self.cancel.is_cancelled() {
			return Err(SyncError::Cancelled);
		}
		if ctx.disconnected.load(Ordering::Acquire) {
			return Err(ConnectionError::Disconnected { endpoint: self.session.name().to_string() }.into());
		}

		let snapshot = ctx.builder.finish();
		self.reporter.progress(ProgressEvent::Indexing(IndexProgress {
			side: side.as_str().to_string(),
			buckets_done: buckets_done.load(Ordering::Relaxed),
			buckets_total: buckets.len(),
			files_seen: snapshot.file_count(),
			dirs_seen: snapshot.directories.len(),
			elapsed: started.elapsed(),
		}));
		self.reporter.info(format!(
			"Indexed {} tree: {} files in {} directories",
			side.as_str(),
			snapshot.file_count(),
			snapshot.directories.len()
		));
		Ok(snapshot)
	}
}

async fn report_progress(
	ctx: Arc<ScanContext>,
	side: Side,
	buckets_total: usize,
	buckets_done: Arc<AtomicUsize>,
	started: Instant,
	period: Duration,
	done: CancellationToken,
) {
	let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
	loop {
		tokio::select! {
			_ = done.cancelled() => return,
			_ = ticker.tick() => {
				let (files_seen, dirs_seen) = ctx.builder.counts();
				ctx.reporter.progress(ProgressEvent::Indexing(IndexProgress {
					side: side.as_str().to_string(),
					buckets_done: buckets_done.load(Ordering::Relaxed),
					buckets_total,
					files_seen,
					dirs_seen,
					elapsed: started.elapsed(),
				}));
			}
		}
	}
}

/// Depth-first walk of one bucket
async fn scan_bucket(ctx: &ScanContext, bucket: &str) {
	let bucket_root = session::join(&ctx.root, bucket);
	let mut stack = vec![bucket_root.clone()];

	while let Some(dir) = stack.pop() {
		// No new listing once cancelled
		if ctx.cancel.is_cancelled() || ctx.disconnected.load(Ordering::Acquire) {
			return;
		}

		let entries = match ctx.session.list_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound && dir == bucket_root => {
				debug!("Bucket {} not present on {}", bucket, ctx.session.name());
				continue;
			}
			Err(e) if e.kind() == io::ErrorKind::NotConnected => {
				ctx.disconnected.store(true, Ordering::Release);
				ctx.reporter.error(format!("Connection lost to {}: {}", ctx.session.name(), e));
				return;
			}
			Err(e) => {
				let err = ScanError { path: dir.clone(), source: e };
				ctx.reporter.warn(format!("Error scanning bucket {}: {}", bucket, err));
				continue;
			}
		};

		let dir_rel = session::relative(&ctx.root, &dir).unwrap_or(bucket).to_string();
		ctx.builder.add_dir(&dir_rel);

		for entry in entries {
			if ctx.cancel.is_cancelled() || ctx.disconnected.load(Ordering::Acquire) {
				return;
			}
			let full = session::join(&dir, &entry.name);
			let rel = session::join(&dir_rel, &entry.name);
			if ctx.filter.is_excluded(&full, &rel) {
				debug!("Excluded {}", rel);
				continue;
			}
			if entry.is_dir {
				stack.push(full);
				continue;
			}

			let fingerprint = if ctx.fingerprint {
				match fingerprint_file(ctx.session.as_ref(), &full, ctx.chunk_size).await {
					Ok(digest) => {
						debug!("Fingerprint {} {}", rel, digest);
						Some(digest)
					}
					Err(e) if e.kind() == io::ErrorKind::NotConnected => {
						ctx.disconnected.store(true, Ordering::Release);
						ctx.reporter.error(format!("Connection lost to {}: {}", ctx.session.name(), e));
						return;
					}
					Err(e) => {
						ctx.reporter.warn(format!("Failed to fingerprint {}: {}", full, e));
						None
					}
				}
			} else {
				None
			};

			ctx.builder.add_file(FileRecord {
				absolute_path: full,
				relative_path: rel,
				size: entry.size,
				modified: entry.modified,
				fingerprint,
			});
		}
	}
}

/// Stream a remote file through blake3 and return the hex digest
pub async fn fingerprint_file(
	session: &dyn RemoteSession,
	path: &str,
	chunk_size: usize,
) -> io::Result<String> {
	let mut reader = session.open_read(path).await?;
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; chunk_size.max(1)];
	loop {
		let n = reader.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hex::encode(hasher.finalize().as_bytes()))
}


// vim: ts=4
