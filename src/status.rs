//! Live, pollable run status
//!
//! [`StatusBoard`] is an [`EventSink`] that keeps the latest state of a run
//! for presenters that poll (web handlers, UI timers) instead of subscribing.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::events::{EventSink, IndexProgress, LogEvent, Phase, ProgressEvent, TransferProgress};
use crate::stats::RunStatistics;

/// Default number of log lines kept
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Point-in-time copy of the board
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
	pub phase: Phase,
	pub indexing: Option<IndexProgress>,
	pub transfer: Option<TransferProgress>,
	pub stats: Option<RunStatistics>,
	pub log: Vec<LogEvent>,
}

struct BoardState {
	phase: Phase,
	indexing: Option<IndexProgress>,
	transfer: Option<TransferProgress>,
	stats: Option<RunStatistics>,
	log: VecDeque<LogEvent>,
}

pub struct StatusBoard {
	state: Mutex<BoardState>,
	capacity: usize,
}

impl StatusBoard {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_LOG_CAPACITY)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			state: Mutex::new(BoardState {
				phase: Phase::Idle,
				indexing: None,
				transfer: None,
				stats: None,
				log: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
			}),
			capacity,
		}
	}

	pub fn snapshot(&self) -> StatusSnapshot {
		let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		StatusSnapshot {
			phase: state.phase,
			indexing: state.indexing.clone(),
			transfer: state.transfer.clone(),
			stats: state.stats.clone(),
			log: state.log.iter().cloned().collect(),
		}
	}

	/// The most recent `limit` log lines, oldest first
	pub fn recent_log(&self, limit: usize) -> Vec<LogEvent> {
		let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		let skip = state.log.len().saturating_sub(limit);
		state.log.iter().skip(skip).cloned().collect()
	}
}

impl Default for StatusBoard {
	fn default() -> Self {
		Self::new()
	}
}

impl EventSink for StatusBoard {
	fn on_log(&self, event: &LogEvent) {
		if self.capacity == 0 {
			return;
		}
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.log.len() >= self.capacity {
			state.log.pop_front();
		}
		state.log.push_back(event.clone());
	}

	fn on_progress(&self, event: &ProgressEvent) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		match event {
			ProgressEvent::Indexing(p) => state.indexing = Some(p.clone()),
			ProgressEvent::Transfer(p) => state.transfer = Some(p.clone()),
		}
	}

	fn on_phase_change(&self, phase: Phase) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if phase == Phase::Connecting {
			state.indexing = None;
			state.transfer = None;
			state.stats = None;
		}
		state.phase = phase;
	}

	fn on_stats(&self, stats: &RunStatistics) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.stats = Some(stats.clone());
	}
}


// vim: ts=4
