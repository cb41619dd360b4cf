//! Transfer pipeline
//!
//! A fixed pool of workers drains the size-ordered job queue. Each job is
//! copied into a temporary object next to its final path and renamed into
//! place only after the copy (and, if enabled, verification) succeeded, so a
//! half-written file is never visible at the real path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::comparator::{JobState, TransferJob};
use crate::config::SyncSettings;
use crate::error::TransferError;
use crate::events::{ProgressEvent, Reporter, TransferProgress};
use crate::indexer::fingerprint_file;
use crate::logging::*;
use crate::session::{self, RemoteReader, RemoteSession, RemoteWriter};
use crate::stats::{format_bytes, StatsHandle};

/// Suffix of the temporary object a job writes before commit
pub const TEMP_SUFFIX: &str = ".bsync-tmp";

/// Interval between transfer progress ticks
pub const TRANSFER_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Knobs of one pipeline run
#[derive(Debug, Clone)]
pub struct TransferSettings {
	pub max_concurrency: usize,
	pub chunk_size: usize,
	pub retry_attempts: u32,
	pub retry_delay: Duration,
	pub verify: bool,
	pub grace_period: Duration,
	pub progress_interval: Duration,
}

impl From<&SyncSettings> for TransferSettings {
	fn from(settings: &SyncSettings) -> Self {
		Self {
			max_concurrency: settings.max_concurrent_transfers.max(1),
			chunk_size: settings.chunk_size.max(1),
			retry_attempts: settings.retry_attempts.max(1),
			retry_delay: settings.retry_delay(),
			verify: settings.verify_transfers,
			grace_period: settings.grace_period(),
			progress_interval: TRANSFER_PROGRESS_INTERVAL,
		}
	}
}

/// What the pipeline did with its jobs
#[derive(Debug, Default)]
pub struct PipelineReport {
	/// Every job handed back by a worker or left unstarted, in finishing order
	pub jobs: Vec<TransferJob>,

	/// Largest number of jobs in flight at once
	pub peak_in_flight: usize,

	/// Session that dropped mid-run, if any
	pub disconnected: Option<String>,

	/// Workers were abandoned after the grace period
	pub timed_out: bool,
}

impl PipelineReport {
	pub fn count(&self, state: JobState) -> usize {
		self.jobs.iter().filter(|j| j.state == state).count()
	}
}

/// Outcome of one copy attempt
enum Attempt {
	Committed(u64),
	Cancelled,
}

/// Shared by all workers of one run
struct Shared {
	source: Arc<dyn RemoteSession>,
	destination: Arc<dyn RemoteSession>,
	settings: TransferSettings,
	reporter: Reporter,
	stats: StatsHandle,

	/// Cancelled with the run, or when a session drops
	halt: CancellationToken,
	cancel: CancellationToken,

	queue: Mutex<VecDeque<TransferJob>>,
	finished: Mutex<Vec<TransferJob>>,
	in_flight: AtomicUsize,
	peak_in_flight: AtomicUsize,
	files_done: AtomicUsize,
	bytes_done: AtomicU64,
	disconnected: Mutex<Option<String>>,
}

pub struct TransferPipeline {
	source: Arc<dyn RemoteSession>,
	destination: Arc<dyn RemoteSession>,
	settings: TransferSettings,
	reporter: Reporter,
	stats: StatsHandle,
	cancel: CancellationToken,
}

impl TransferPipeline {
	pub fn new(
		source: Arc<dyn RemoteSession>,
		destination: Arc<dyn RemoteSession>,
		settings: TransferSettings,
		reporter: Reporter,
		stats: StatsHandle,
		cancel: CancellationToken,
	) -> Self {
		Self { source, destination, settings, reporter, stats, cancel }
	}

	/// Run every job to a terminal state
	pub async fn run(&self, jobs: Vec<TransferJob>) -> PipelineReport {
		let started = Instant::now();
		let files_total = jobs.len();
		let bytes_total: u64 = jobs.iter().map(|j| j.record.size).sum();
		self.reporter.info(format!(
			"Transferring {} files ({}) with {} workers",
			files_total,
			format_bytes(bytes_total),
			self.settings.max_concurrency
		));

		let shared = Arc::new(Shared {
			source: self.source.clone(),
			destination: self.destination.clone(),
			settings: self.settings.clone(),
			reporter: self.reporter.clone(),
			stats: self.stats.clone(),
			halt: self.cancel.child_token(),
			cancel: self.cancel.clone(),
			queue: Mutex::new(jobs.into()),
			finished: Mutex::new(Vec::with_capacity(files_total)),
			in_flight: AtomicUsize::new(0),
			peak_in_flight: AtomicUsize::new(0),
			files_done: AtomicUsize::new(0),
			bytes_done: AtomicU64::new(0),
			disconnected: Mutex::new(None),
		});

		let progress_done = CancellationToken::new();
		let progress = tokio::spawn(report_progress(
			shared.clone(),
			files_total,
			bytes_total,
			started,
			progress_done.clone(),
		));

		let mut workers = JoinSet::new();
		for id in 0..self.settings.max_concurrency.min(files_total.max(1)) {
			workers.spawn(worker(id, shared.clone()));
		}

		let timed_out = wait_for_workers(&mut workers, &shared).await;
		progress_done.cancel();
		let _ = progress.await;

		let mut report = PipelineReport {
			jobs: std::mem::take(&mut *shared.finished.lock().unwrap_or_else(|e| e.into_inner())),
			peak_in_flight: shared.peak_in_flight.load(Ordering::Acquire),
			disconnected: shared.disconnected.lock().unwrap_or_else(|e| e.into_inner()).clone(),
			timed_out,
		};
		// Never started
		let mut queue = shared.queue.lock().unwrap_or_else(|e| e.into_inner());
		report.jobs.extend(queue.drain(..).map(|mut job| {
			job.state = JobState::Cancelled;
			job
		}));
		report
	}
}

/// Join all workers; after a halt, give them the grace period and no more
async fn wait_for_workers(workers: &mut JoinSet<()>, shared: &Shared) -> bool {
	let mut deadline: Option<tokio::time::Instant> = None;
	loop {
		tokio::select! {
			joined = workers.join_next() => match joined {
				None => return false,
				Some(Err(e)) => shared.reporter.error(format!("Transfer worker failed: {}", e)),
				Some(Ok(())) => {}
			},
			_ = shared.halt.cancelled(), if deadline.is_none() => {
				deadline = Some(tokio::time::Instant::now() + shared.settings.grace_period);
			}
			_ = sleep_until(deadline), if deadline.is_some() => {
				shared.reporter.warn("Workers did not finish within timeout");
				workers.abort_all();
				return true;
			}
		}
	}
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
	match deadline {
		Some(at) => tokio::time::sleep_until(at).await,
		None => std::future::pending().await,
	}
}

async fn worker(id: usize, shared: Arc<Shared>) {
	debug!("Transfer worker {} started", id);
	loop {
		if shared.halt.is_cancelled() {
			break;
		}
		let next = shared.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
		let mut job = match next {
			Some(job) => job,
			None => break,
		};

		job.state = JobState::InFlight;
		let now = shared.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
		shared.peak_in_flight.fetch_max(now, Ordering::AcqRel);

		let state = process(&shared, &mut job).await;
		job.state = state;
		shared.in_flight.fetch_sub(1, Ordering::AcqRel);

		match job.state {
			JobState::Succeeded => {
				shared.stats.record_transferred(job.record.size);
				shared.files_done.fetch_add(1, Ordering::AcqRel);
				shared.bytes_done.fetch_add(job.record.size, Ordering::AcqRel);
			}
			JobState::Failed => {
				shared.stats.record_failed();
				shared.files_done.fetch_add(1, Ordering::AcqRel);
			}
			_ => {}
		}
		shared.finished.lock().unwrap_or_else(|e| e.into_inner()).push(job);
	}
	debug!("Transfer worker {} finished", id);
}

/// Retry loop of one job
async fn process(shared: &Shared, job: &mut TransferJob) -> JobState {
	let max = shared.settings.retry_attempts;
	let path = job.record.relative_path.clone();

	for attempt in 1..=max {
		if shared.halt.is_cancelled() {
			return JobState::Cancelled;
		}
		job.attempts_made = attempt;

		match copy_once(shared, job).await {
			Ok(Attempt::Committed(bytes)) => {
				shared.reporter.info(format!("Transferred {} ({})", path, format_bytes(bytes)));
				return JobState::Succeeded;
			}
			Ok(Attempt::Cancelled) => return JobState::Cancelled,
			Err(e) if e.is_disconnect() && !shared.cancel.is_cancelled() => {
				let endpoint = if e.is_source_side() {
					shared.source.name()
				} else {
					shared.destination.name()
				}
				.to_string();
				shared.reporter.error(format!("Connection lost during transfer of {}: {}", path, e));
				*shared.disconnected.lock().unwrap_or_else(|e| e.into_inner()) = Some(endpoint);
				shared.halt.cancel();
				return JobState::Failed;
			}
			Err(e) if attempt < max => {
				shared.reporter.warn(format!(
					"Attempt {}/{} failed for {}: {}; retrying in {}s",
					attempt,
					max,
					path,
					e,
					shared.settings.retry_delay.as_secs()
				));
				tokio::select! {
					_ = shared.halt.cancelled() => return JobState::Cancelled,
					_ = tokio::time::sleep(shared.settings.retry_delay) => {}
				}
			}
			Err(e) => {
				if shared.cancel.is_cancelled() {
					return JobState::Cancelled;
				}
				shared.reporter.error(format!(
					"Failed to transfer {} after {} attempts: {}",
					path, max, e
				));
			}
		}
	}
	JobState::Failed
}

/// One attempt: temp write, optional verification, rename, timestamps
async fn copy_once(shared: &Shared, job: &TransferJob) -> Result<Attempt, TransferError> {
	let source_path = &job.record.absolute_path;
	let dest = &job.destination_path;
	let temp = format!("{}{}", dest, TEMP_SUFFIX);

	let parent = session::parent(dest);
	if !parent.is_empty() {
		shared
			.destination
			.mkdir_all(parent)
			.await
			.map_err(|e| TransferError::CreateDir { path: parent.to_string(), source: e })?;
	}

	let mut reader = shared
		.source
		.open_read(source_path)
		.await
		.map_err(|e| TransferError::Open { path: source_path.clone(), source: e })?;
	let mut writer = shared
		.destination
		.create_write(&temp)
		.await
		.map_err(|e| TransferError::Create { path: temp.clone(), source: e })?;

	let streamed = stream(shared, &mut reader, &mut writer, source_path, &temp).await;
	let streamed = match streamed {
		Ok(Some(digest)) => writer
			.shutdown()
			.await
			.map(|_| Some(digest))
			.map_err(|e| TransferError::Write { path: temp.clone(), source: e }),
		other => other,
	};
	drop(reader);
	drop(writer);

	let source_digest = match streamed {
		Ok(Some(digest)) => digest,
		Ok(None) => {
			discard(shared, &temp).await;
			return Ok(Attempt::Cancelled);
		}
		Err(e) => {
			discard(shared, &temp).await;
			return Err(e);
		}
	};

	if shared.settings.verify {
		let written = fingerprint_file(shared.destination.as_ref(), &temp, shared.settings.chunk_size)
			.await
			.map_err(|e| TransferError::Verify { path: temp.clone(), source: e });
		let mismatch = match written {
			Ok(dest_digest) if dest_digest == source_digest => None,
			Ok(dest_digest) => Some(TransferError::FingerprintMismatch {
				path: dest.clone(),
				source_digest,
				destination_digest: dest_digest,
			}),
			Err(e) => Some(e),
		};
		if let Some(e) = mismatch {
			discard(shared, &temp).await;
			return Err(e);
		}
	}

	if let Err(e) = shared.destination.rename(&temp, dest).await {
		discard(shared, &temp).await;
		return Err(TransferError::Rename { from: temp, to: dest.clone(), source: e });
	}

	if let Err(e) = shared.destination.set_times(dest, job.record.modified).await {
		shared.reporter.warn(format!("Failed to set modification time on {}: {}", dest, e));
	}
	Ok(Attempt::Committed(job.record.size))
}

/// Chunked copy; returns the source digest, or `None` if halted between chunks
async fn stream(
	shared: &Shared,
	reader: &mut RemoteReader,
	writer: &mut RemoteWriter,
	source_path: &str,
	temp: &str,
) -> Result<Option<String>, TransferError> {
	let mut buf = vec![0u8; shared.settings.chunk_size];
	let mut hasher = blake3::Hasher::new();
	loop {
		if shared.halt.is_cancelled() {
			return Ok(None);
		}
		let n = reader
			.read(&mut buf)
			.await
			.map_err(|e| TransferError::Read { path: source_path.to_string(), source: e })?;
		if n == 0 {
			break;
		}
		writer
			.write_all(&buf[..n])
			.await
			.map_err(|e| TransferError::Write { path: temp.to_string(), source: e })?;
		if shared.settings.verify {
			hasher.update(&buf[..n]);
		}
	}
	Ok(Some(hex::encode(hasher.finalize().as_bytes())))
}

/// Best-effort removal of a temp object
async fn discard(shared: &Shared, temp: &str) {
	if let Err(e) = shared.destination.remove(temp).await {
		debug!("Could not remove {}: {}", temp, e);
	}
}

async fn report_progress(
	shared: Arc<Shared>,
	files_total: usize,
	bytes_total: u64,
	started: Instant,
	done: CancellationToken,
) {
	let period = shared.settings.progress_interval;
	let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
	loop {
		tokio::select! {
			_ = done.cancelled() => return,
			_ = ticker.tick() => {
				shared.reporter.progress(ProgressEvent::Transfer(TransferProgress {
					files_done: shared.files_done.load(Ordering::Acquire),
					files_total,
					bytes_done: shared.bytes_done.load(Ordering::Acquire),
					bytes_total,
					in_flight: shared.in_flight.load(Ordering::Acquire),
					elapsed: started.elapsed(),
				}));
				shared.reporter.stats(&shared.stats.snapshot());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::comparator::{Reason, TransferJob};
	use crate::events::NoopSink;
	use crate::local::LocalSession;
	use crate::snapshot::FileRecord;
	use std::fs;
	use std::time::SystemTime;

	fn settings() -> TransferSettings {
		TransferSettings {
			max_concurrency: 2,
			chunk_size: 1024,
			retry_attempts: 2,
			retry_delay: Duration::from_millis(10),
			verify: true,
			grace_period: Duration::from_secs(5),
			progress_interval: TRANSFER_PROGRESS_INTERVAL,
		}
	}

	fn job(src_root: &str, dst_root: &str, rel: &str, size: u64) -> TransferJob {
		TransferJob::new(
			FileRecord {
				absolute_path: session::join(src_root, rel),
				relative_path: rel.to_string(),
				size,
				modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000),
				fingerprint: None,
			},
			dst_root,
			Reason::Missing,
		)
	}

	fn pipeline(settings: TransferSettings, cancel: CancellationToken) -> TransferPipeline {
		let reporter = Reporter::new(Arc::new(NoopSink), cancel.clone());
		TransferPipeline::new(
			Arc::new(LocalSession::new("src")),
			Arc::new(LocalSession::new("dst")),
			settings,
			reporter,
			StatsHandle::new(),
			cancel,
		)
	}

	#[tokio::test]
	async fn test_copies_into_nested_destination() {
		let src = tempfile::TempDir::new().unwrap();
		let dst = tempfile::TempDir::new().unwrap();
		let (s, d) = (src.path().to_string_lossy().into_owned(), dst.path().to_string_lossy().into_owned());
		fs::create_dir_all(src.path().join("01012024/deep")).unwrap();
		let data = vec![7u8; 5000];
		fs::write(src.path().join("01012024/deep/f.bin"), &data).unwrap();

		let report = pipeline(settings(), CancellationToken::new())
			.run(vec![job(&s, &d, "01012024/deep/f.bin", 5000)])
			.await;

		assert_eq!(report.count(JobState::Succeeded), 1);
		assert_eq!(report.jobs[0].attempts_made, 1);
		let copied = dst.path().join("01012024/deep/f.bin");
		assert_eq!(fs::read(&copied).unwrap(), data);
		assert!(!dst.path().join(format!("01012024/deep/f.bin{}", TEMP_SUFFIX)).exists());
		let mtime = fs::metadata(&copied).unwrap().modified().unwrap();
		assert_eq!(mtime, SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000));
	}

	#[tokio::test]
	async fn test_missing_source_fails_after_all_attempts() {
		let src = tempfile::TempDir::new().unwrap();
		let dst = tempfile::TempDir::new().unwrap();
		let (s, d) = (src.path().to_string_lossy().into_owned(), dst.path().to_string_lossy().into_owned());

		let p = pipeline(settings(), CancellationToken::new());
		let report = p.run(vec![job(&s, &d, "gone.txt", 3)]).await;

		assert_eq!(report.count(JobState::Failed), 1);
		assert_eq!(report.jobs[0].attempts_made, 2);
		assert_eq!(p.stats.snapshot().failed_files, 1);
	}

	#[tokio::test]
	async fn test_cancelled_before_run_starts_nothing() {
		let src = tempfile::TempDir::new().unwrap();
		let dst = tempfile::TempDir::new().unwrap();
		let (s, d) = (src.path().to_string_lossy().into_owned(), dst.path().to_string_lossy().into_owned());
		fs::write(src.path().join("a"), b"a").unwrap();

		let cancel = CancellationToken::new();
		cancel.cancel();
		let report = pipeline(settings(), cancel).run(vec![job(&s, &d, "a", 1)]).await;

		assert_eq!(report.count(JobState::Cancelled), 1);
		assert_eq!(report.jobs[0].attempts_made, 0);
		assert!(!dst.path().join("a").exists());
	}
}

// vim: ts=4
