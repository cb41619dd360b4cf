//! Run coordinator
//!
//! [`SyncEngine::run`] connects both endpoints, indexes the destination, then
//! the source, compares, transfers, and reports exactly one [`RunOutcome`]
//! together with the final statistics. Cancellation is an explicit token
//! checked between stages and handed to every stage.

use futures::future;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bucket;
use crate::comparator::{self, JobState, TransferJob};
use crate::config::{Config, EndpointConfig};
use crate::error::{ConnectionError, SyncError};
use crate::events::{EventSink, NoopSink, Phase, Reporter};
use crate::exclusion::ExclusionFilter;
use crate::indexer::{Side, TreeIndexer};
use crate::logging::*;
use crate::session::{RemoteSession, SessionProvider};
use crate::stats::{format_bytes, RunStatistics, StatsHandle};
use crate::transfer::{TransferPipeline, TransferSettings};
use crate::validation::Validator;

/// Bucket-name generator: number of buckets in, directory names out
pub type BucketFn = dyn Fn(usize) -> Vec<String> + Send + Sync;

/// Terminal outcome of a run
#[derive(Debug)]
pub enum RunOutcome {
	/// Every job was attempted
	Completed,

	/// The token fired before the run finished
	Cancelled,

	/// Unrecoverable connection or indexing error
	Failed(SyncError),
}

impl RunOutcome {
	pub fn is_completed(&self) -> bool {
		matches!(self, RunOutcome::Completed)
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, RunOutcome::Cancelled)
	}

	pub fn is_failed(&self) -> bool {
		matches!(self, RunOutcome::Failed(_))
	}
}

/// Everything a caller gets back from one run
#[derive(Debug)]
pub struct RunReport {
	pub outcome: RunOutcome,
	pub stats: RunStatistics,

	/// Relative paths in queue order (smallest first)
	pub work_list: Vec<String>,

	/// Jobs in their terminal states
	pub jobs: Vec<TransferJob>,

	/// Largest number of simultaneously in-flight jobs
	pub peak_in_flight: usize,

	/// A stage was abandoned after the grace period
	pub timed_out: bool,
}

/// What the stages hand back on a clean finish
#[derive(Default)]
struct StageResult {
	work_list: Vec<String>,
	jobs: Vec<TransferJob>,
	peak_in_flight: usize,
	cancelled: bool,
	timed_out: bool,
}

pub struct SyncEngine {
	provider: Arc<dyn SessionProvider>,
	config: Config,
	sink: Arc<dyn EventSink>,
	buckets: Arc<BucketFn>,
	progress_interval: Option<Duration>,
}

impl SyncEngine {
	pub fn new(provider: Arc<dyn SessionProvider>, config: Config) -> Self {
		Self {
			provider,
			config,
			sink: Arc::new(NoopSink),
			buckets: Arc::new(bucket::date_buckets),
			progress_interval: None,
		}
	}

	/// Route log, progress, phase and stats events to `sink`
	pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sink = sink;
		self
	}

	/// Replace the date-bucket generator
	pub fn with_buckets<F>(mut self, buckets: F) -> Self
	where
		F: Fn(usize) -> Vec<String> + Send + Sync + 'static,
	{
		self.buckets = Arc::new(buckets);
		self
	}

	/// Override both progress intervals
	pub fn with_progress_interval(mut self, interval: Duration) -> Self {
		self.progress_interval = Some(interval);
		self
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Run one sync to a terminal outcome
	///
	/// Cancel `cancel` to stop; the call still returns full statistics.
	pub async fn run(&self, cancel: CancellationToken) -> RunReport {
		let stats = StatsHandle::new();
		let run_id = stats.snapshot().run_id;
		let span = tracing::info_span!("run", id = %run_id);
		self.run_inner(stats, cancel).instrument(span).await
	}

	async fn run_inner(&self, stats: StatsHandle, cancel: CancellationToken) -> RunReport {
		let started = Instant::now();
		let reporter = Reporter::new(self.sink.clone(), cancel.clone());
		reporter.phase(Phase::Connecting);
		reporter.info(format!(
			"Starting sync {} -> {}",
			self.config.sync.source_path, self.config.sync.destination_path
		));

		let result = match self.connect(&reporter).await {
			Ok((source, destination)) => {
				let result =
					self.stages(&source, &destination, &reporter, &stats, &cancel).await;
				future::join(
					close(&reporter, source.as_ref()),
					close(&reporter, destination.as_ref()),
				)
				.await;
				result
			}
			Err(e) => Err(e),
		};

		let (outcome, stage) = match result {
			Ok(stage) if stage.cancelled => (RunOutcome::Cancelled, stage),
			Ok(stage) => (RunOutcome::Completed, stage),
			Err(SyncError::Cancelled) => (RunOutcome::Cancelled, StageResult::default()),
			Err(SyncError::Timeout) => {
				(RunOutcome::Cancelled, StageResult { timed_out: true, ..StageResult::default() })
			}
			Err(e) => (RunOutcome::Failed(e), StageResult::default()),
		};

		let final_stats = stats.finish(started);
		reporter.phase(Phase::Finished);
		for line in final_stats.summary_lines() {
			reporter.info(line);
		}
		match &outcome {
			RunOutcome::Completed => reporter.info("Sync completed"),
			RunOutcome::Cancelled => reporter.warn("Sync cancelled"),
			RunOutcome::Failed(e) => reporter.error(format!("Sync failed: {}", e)),
		}
		reporter.stats(&final_stats);

		RunReport {
			outcome,
			stats: final_stats,
			work_list: stage.work_list,
			jobs: stage.jobs,
			peak_in_flight: stage.peak_in_flight,
			timed_out: stage.timed_out,
		}
	}

	/// Source first, then destination; a half-open pair is closed again
	async fn connect(
		&self,
		reporter: &Reporter,
	) -> Result<(Arc<dyn RemoteSession>, Arc<dyn RemoteSession>), SyncError> {
		let config = &self.config;
		config.sync.validate().map_err(|e| SyncError::InvalidConfig { message: e.to_string() })?;

		reporter.info(format!("Connecting to source {}", config.source.label()));
		let source = self.connect_endpoint("source", &config.source).await?;

		reporter.info(format!("Connecting to destination {}", config.destination.label()));
		let destination = match self.connect_endpoint("destination", &config.destination).await {
			Ok(session) => session,
			Err(e) => {
				close(reporter, source.as_ref()).await;
				return Err(e.into());
			}
		};
		Ok((source, destination))
	}

	/// Connect one endpoint, giving up after its configured timeout
	async fn connect_endpoint(
		&self,
		label: &str,
		endpoint: &EndpointConfig,
	) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
		match tokio::time::timeout(endpoint.timeout(), self.provider.connect(label, endpoint)).await {
			Ok(result) => result,
			Err(_) => Err(ConnectionError::Unreachable {
				endpoint: endpoint.label(),
				source: format!("connection timed out after {}s", endpoint.timeout_secs).into(),
			}),
		}
	}

	async fn stages(
		&self,
		source: &Arc<dyn RemoteSession>,
		destination: &Arc<dyn RemoteSession>,
		reporter: &Reporter,
		stats: &StatsHandle,
		cancel: &CancellationToken,
	) -> Result<StageResult, SyncError> {
		let sync = &self.config.sync;
		let grace = sync.grace_period();
		let filter = Arc::new(
			ExclusionFilter::new(&sync.exclude_patterns)
				.map_err(|e| SyncError::InvalidConfig { message: e.to_string() })?,
		);
		let buckets = (self.buckets)(sync.days_to_sync);
		reporter.info(format!("Buckets to sync: {}", buckets.join(", ")));

		let indexer = |session: &Arc<dyn RemoteSession>| {
			let indexer =
				TreeIndexer::new(session.clone(), filter.clone(), reporter.clone(), cancel.clone())
					.with_concurrency(sync.max_concurrent_transfers)
					.with_chunk_size(sync.chunk_size);
			match self.progress_interval {
				Some(interval) => indexer.with_progress_interval(interval),
				None => indexer,
			}
		};

		check(cancel)?;
		reporter.phase(Phase::IndexingDestination);
		let dest_snapshot = within_grace(
			cancel,
			grace,
			indexer(destination).index(Side::Destination, &sync.destination_path, &buckets),
		)
		.await?;

		check(cancel)?;
		reporter.phase(Phase::IndexingSource);
		let source_snapshot = within_grace(
			cancel,
			grace,
			indexer(source).index(Side::Source, &sync.source_path, &buckets),
		)
		.await?;

		check(cancel)?;
		reporter.phase(Phase::Comparing);
		let comparison = comparator::compare(&source_snapshot, &dest_snapshot);
		stats.update(|s| {
			s.total_files = source_snapshot.file_count();
			s.skipped_files = comparison.skipped;
		});
		let new_files = comparison.new_files();
		reporter.info(format!(
			"{} files to transfer ({} new, {} changed, {}), {} up to date",
			comparison.jobs.len(),
			new_files,
			comparison.jobs.len() - new_files,
			format_bytes(comparison.total_bytes()),
			comparison.skipped
		));
		reporter.stats(&stats.snapshot());
		let work_list: Vec<String> =
			comparison.jobs.iter().map(|j| j.record.relative_path.clone()).collect();

		check(cancel)?;
		reporter.phase(Phase::Transferring);
		let mut settings = TransferSettings::from(sync);
		if let Some(interval) = self.progress_interval {
			settings.progress_interval = interval;
		}
		let pipeline = TransferPipeline::new(
			source.clone(),
			destination.clone(),
			settings,
			reporter.clone(),
			stats.clone(),
			cancel.clone(),
		);
		let report = pipeline.run(comparison.jobs).await;

		if let Some(endpoint) = report.disconnected {
			return Err(ConnectionError::Disconnected { endpoint }.into());
		}
		let cancelled = cancel.is_cancelled()
			&& (report.timed_out || report.count(JobState::Cancelled) > 0);
		Ok(StageResult {
			work_list,
			jobs: report.jobs,
			peak_in_flight: report.peak_in_flight,
			cancelled,
			timed_out: report.timed_out,
		})
	}
}

fn check(cancel: &CancellationToken) -> Result<(), SyncError> {
	if cancel.is_cancelled() {
		return Err(SyncError::Cancelled);
	}
	Ok(())
}

/// Await `stage`, but give up `grace` after cancellation
async fn within_grace<T, F>(
	cancel: &CancellationToken,
	grace: Duration,
	stage: F,
) -> Result<T, SyncError>
where
	F: Future<Output = Result<T, SyncError>>,
{
	tokio::pin!(stage);
	tokio::select! {
		result = &mut stage => result,
		_ = cancel.cancelled() => {
			match tokio::time::timeout(grace, &mut stage).await {
				Ok(Err(e)) if !e.is_cancelled() => Err(e),
				Ok(_) => Err(SyncError::Cancelled),
				Err(_) => {
					warn!("Indexing did not finish within timeout");
					Err(SyncError::Timeout)
				}
			}
		}
	}
}

async fn close(reporter: &Reporter, session: &dyn RemoteSession) {
	if let Err(e) = session.close().await {
		reporter.warn(format!("Error closing session {}: {}", session.name(), e));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::local::LocalSessionProvider;

	#[tokio::test]
	async fn test_remote_endpoint_fails_before_any_stage() {
		let mut config = Config::default();
		config.sync.source_path = "/nonexistent/src".to_string();
		config.sync.destination_path = "/nonexistent/dst".to_string();
		config.destination.host = "sftp.example.com".to_string();

		let engine = SyncEngine::new(Arc::new(LocalSessionProvider::new()), config);
		let report = engine.run(CancellationToken::new()).await;
		match report.outcome {
			RunOutcome::Failed(SyncError::Connection(ConnectionError::Unsupported { .. })) => {}
			other => panic!("unexpected outcome {:?}", other),
		}
		assert_eq!(report.stats.total_files, 0);
	}

	#[tokio::test]
	async fn test_invalid_settings_fail() {
		let config = Config::default();
		let engine = SyncEngine::new(Arc::new(LocalSessionProvider::new()), config);
		let report = engine.run(CancellationToken::new()).await;
		assert!(matches!(report.outcome, RunOutcome::Failed(SyncError::InvalidConfig { .. })));
	}

	#[tokio::test]
	async fn test_cancelled_before_start() {
		let dir = tempfile::TempDir::new().unwrap();
		let mut config = Config::default();
		config.sync.source_path = dir.path().join("src").to_string_lossy().into_owned();
		config.sync.destination_path = dir.path().join("dst").to_string_lossy().into_owned();
		let cancel = CancellationToken::new();
		cancel.cancel();
		let engine = SyncEngine::new(Arc::new(LocalSessionProvider::new()), config);
		assert!(engine.run(cancel).await.outcome.is_cancelled());
	}
}

// vim: ts=4
