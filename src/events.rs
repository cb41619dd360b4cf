//! Event stream from the engine to presentation layers
//!
//! The engine writes to a narrow [`EventSink`]; each presenter (terminal,
//! web socket, UI widget) supplies its own adapter. [`Reporter`] is the
//! engine-side half: it mirrors every line into `tracing`, forwards it to the
//! sink, and drops teardown noise once the run is cancelled.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::logging::*;
use crate::stats::{format_bytes, format_duration, format_rate, RunStatistics};

// Type aliases to reduce complexity
type LogFn = dyn Fn(&LogEvent) + Send + Sync;
type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;
type PhaseFn = dyn Fn(Phase) + Send + Sync;
type StatsFn = dyn Fn(&RunStatistics) + Send + Sync;

/// Stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
	Idle,
	Connecting,
	IndexingDestination,
	IndexingSource,
	Comparing,
	Transferring,
	Finished,
}

impl std::fmt::Display for Phase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Phase::Idle => "idle",
			Phase::Connecting => "connecting",
			Phase::IndexingDestination => "indexing destination",
			Phase::IndexingSource => "indexing source",
			Phase::Comparing => "comparing",
			Phase::Transferring => "transferring",
			Phase::Finished => "finished",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

/// One human-readable log line
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
	/// Unix timestamp (seconds)
	pub timestamp: i64,
	pub level: LogLevel,
	pub message: String,
}

impl LogEvent {
	pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
		Self { timestamp: chrono::Utc::now().timestamp(), level, message: message.into() }
	}
}

/// Indexing progress of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexProgress {
	/// "source" or "destination"
	pub side: String,
	pub buckets_done: usize,
	pub buckets_total: usize,
	pub files_seen: usize,
	pub dirs_seen: usize,
	pub elapsed: Duration,
}

impl IndexProgress {
	pub fn percent(&self) -> f64 {
		percent(self.buckets_done as u64, self.buckets_total as u64)
	}

	/// Remaining time extrapolated from completed buckets
	pub fn eta(&self) -> Option<Duration> {
		eta(self.elapsed, self.buckets_done as f64, self.buckets_total as f64)
	}

	pub fn render(&self) -> String {
		let secs = self.elapsed.as_secs_f64().max(f64::EPSILON);
		format!(
			"Indexing {}: {}/{} buckets ({:.1}%), {} files ({:.1}/s), {} dirs ({:.1}/s), elapsed {}, ETA {}",
			self.side,
			self.buckets_done,
			self.buckets_total,
			self.percent(),
			self.files_seen,
			self.files_seen as f64 / secs,
			self.dirs_seen,
			self.dirs_seen as f64 / secs,
			format_duration(self.elapsed),
			render_eta(self.eta()),
		)
	}
}

/// Transfer pipeline progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
	pub files_done: usize,
	pub files_total: usize,
	pub bytes_done: u64,
	pub bytes_total: u64,
	pub in_flight: usize,
	pub elapsed: Duration,
}

impl TransferProgress {
	pub fn percent(&self) -> f64 {
		percent(self.files_done as u64, self.files_total as u64)
	}

	/// Remaining time extrapolated from bytes moved so far
	pub fn eta(&self) -> Option<Duration> {
		eta(self.elapsed, self.bytes_done as f64, self.bytes_total as f64)
	}

	pub fn render(&self) -> String {
		let secs = self.elapsed.as_secs_f64().max(f64::EPSILON);
		format!(
			"Transfer: {}/{} files ({:.1}%), {} of {}, {:.1} files/s, {}, ETA {}",
			self.files_done,
			self.files_total,
			self.percent(),
			format_bytes(self.bytes_done),
			format_bytes(self.bytes_total),
			self.files_done as f64 / secs,
			format_rate(self.bytes_done as f64 / secs),
			render_eta(self.eta()),
		)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressEvent {
	Indexing(IndexProgress),
	Transfer(TransferProgress),
}

impl ProgressEvent {
	pub fn render(&self) -> String {
		match self {
			ProgressEvent::Indexing(p) => p.render(),
			ProgressEvent::Transfer(p) => p.render(),
		}
	}
}

fn percent(done: u64, total: u64) -> f64 {
	if total == 0 {
		return 100.0;
	}
	done as f64 / total as f64 * 100.0
}

fn eta(elapsed: Duration, done: f64, total: f64) -> Option<Duration> {
	if done <= 0.0 || total <= done {
		return None;
	}
	let rate = done / elapsed.as_secs_f64().max(f64::EPSILON);
	Some(Duration::from_secs_f64((total - done) / rate))
}

fn render_eta(eta: Option<Duration>) -> String {
	match eta {
		Some(d) => format_duration(d),
		None => "calculating...".to_string(),
	}
}

/// Errors expected while connections are torn down after cancellation
pub fn is_teardown_noise(message: &str) -> bool {
	let lower = message.to_lowercase();
	["connection lost", "failed to read directory", "error scanning"]
		.iter()
		.any(|needle| lower.contains(needle))
}

/// Receiver of engine events
///
/// All methods default to no-ops so adapters implement only what they show.
pub trait EventSink: Send + Sync {
	fn on_log(&self, _event: &LogEvent) {}

	fn on_progress(&self, _event: &ProgressEvent) {}

	fn on_phase_change(&self, _phase: Phase) {}

	/// Current counters; sent with every progress tick and at run end
	fn on_stats(&self, _stats: &RunStatistics) {}
}

/// Sink that drops everything
pub struct NoopSink;

impl EventSink for NoopSink {}

/// Sink forwarding every event to several sinks
#[derive(Default)]
pub struct FanoutSink {
	sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sinks.push(sink);
		self
	}
}

impl EventSink for FanoutSink {
	fn on_log(&self, event: &LogEvent) {
		self.sinks.iter().for_each(|s| s.on_log(event));
	}

	fn on_progress(&self, event: &ProgressEvent) {
		self.sinks.iter().for_each(|s| s.on_progress(event));
	}

	fn on_phase_change(&self, phase: Phase) {
		self.sinks.iter().for_each(|s| s.on_phase_change(phase));
	}

	fn on_stats(&self, stats: &RunStatistics) {
		self.sinks.iter().for_each(|s| s.on_stats(stats));
	}
}

/// Builder for a sink made of closures
#[derive(Default)]
pub struct CallbackSinkBuilder {
	log: Option<Box<LogFn>>,
	progress: Option<Box<ProgressFn>>,
	phase: Option<Box<PhaseFn>>,
	stats: Option<Box<StatsFn>>,
}

impl CallbackSinkBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_log<F>(mut self, callback: F) -> Self
	where
		F: Fn(&LogEvent) + Send + Sync + 'static,
	{
		self.log = Some(Box::new(callback));
		self
	}

	pub fn on_progress<F>(mut self, callback: F) -> Self
	where
		F: Fn(&ProgressEvent) + Send + Sync + 'static,
	{
		self.progress = Some(Box::new(callback));
		self
	}

	pub fn on_phase_change<F>(mut self, callback: F) -> Self
	where
		F: Fn(Phase) + Send + Sync + 'static,
	{
		self.phase = Some(Box::new(callback));
		self
	}

	pub fn on_stats<F>(mut self, callback: F) -> Self
	where
		F: Fn(&RunStatistics) + Send + Sync + 'static,
	{
		self.stats = Some(Box::new(callback));
		self
	}

	pub fn build(self) -> Arc<dyn EventSink> {
		Arc::new(CallbackSink {
			log: self.log,
			progress: self.progress,
			phase: self.phase,
			stats: self.stats,
		})
	}
}

struct CallbackSink {
	log: Option<Box<LogFn>>,
	progress: Option<Box<ProgressFn>>,
	phase: Option<Box<PhaseFn>>,
	stats: Option<Box<StatsFn>>,
}

impl EventSink for CallbackSink {
	fn on_log(&self, event: &LogEvent) {
		if let Some(ref callback) = self.log {
			callback(event);
		}
	}

	fn on_progress(&self, event: &ProgressEvent) {
		if let Some(ref callback) = self.progress {
			callback(event);
		}
	}

	fn on_phase_change(&self, phase: Phase) {
		if let Some(ref callback) = self.phase {
			callback(phase);
		}
	}

	fn on_stats(&self, stats: &RunStatistics) {
		if let Some(ref callback) = self.stats {
			callback(stats);
		}
	}
}

/// Engine-side writer of the event stream
#[derive(Clone)]
pub struct Reporter {
	sink: Arc<dyn EventSink>,
	cancel: CancellationToken,
}

impl Reporter {
	pub fn new(sink: Arc<dyn EventSink>, cancel: CancellationToken) -> Self {
		Self { sink, cancel }
	}

	pub fn log(&self, level: LogLevel, message: impl Into<String>) {
		let message = message.into();
		if level >= LogLevel::Warn && self.cancel.is_cancelled() && is_teardown_noise(&message) {
			debug!("Suppressed after cancellation: {}", message);
			return;
		}
		match level {
			LogLevel::Debug => debug!("{}", message),
			LogLevel::Info => info!("{}", message),
			LogLevel::Warn => warn!("{}", message),
			LogLevel::Error => error!("{}", message),
		}
		self.sink.on_log(&LogEvent::new(level, message));
	}

	pub fn debug(&self, message: impl Into<String>) {
		self.log(LogLevel::Debug, message);
	}

	pub fn info(&self, message: impl Into<String>) {
		self.log(LogLevel::Info, message);
	}

	pub fn warn(&self, message: impl Into<String>) {
		self.log(LogLevel::Warn, message);
	}

	pub fn error(&self, message: impl Into<String>) {
		self.log(LogLevel::Error, message);
	}

	/// Forward a progress tick and render it as a log line
	pub fn progress(&self, event: ProgressEvent) {
		self.info(event.render());
		self.sink.on_progress(&event);
	}

	pub fn phase(&self, phase: Phase) {
		debug!("Phase: {}", phase);
		self.sink.on_phase_change(phase);
	}

	pub fn stats(&self, stats: &RunStatistics) {
		self.sink.on_stats(stats);
	}
}


// vim: ts=4
