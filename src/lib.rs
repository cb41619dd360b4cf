//! # bucketsync - one-way mirroring of date-bucketed trees
//!
//! bucketsync copies new and changed files from a source endpoint to a
//! destination endpoint, restricted to a set of top-level "bucket"
//! directories (one per calendar day). Every file is written to a temporary
//! object, optionally verified, and renamed into place.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bucketsync::{Config, LocalSessionProvider, SyncEngine};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_validated("config.json".as_ref())?;
//!     let engine = SyncEngine::new(Arc::new(LocalSessionProvider::new()), config);
//!     let report = engine.run(CancellationToken::new()).await;
//!     println!("Transferred {} files", report.stats.transferred_files);
//!     Ok(())
//! }
//! ```
//!
//! ## Watching a run
//!
//! ```rust,ignore
//! use bucketsync::status::StatusBoard;
//!
//! let board = Arc::new(StatusBoard::new());
//! let engine = SyncEngine::new(provider, config).with_sink(board.clone());
//! // poll board.snapshot() from a web handler or UI timer
//! ```

pub mod bucket;
pub mod comparator;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exclusion;
pub mod indexer;
pub mod local;
pub mod logging;
pub mod session;
pub mod signal;
pub mod snapshot;
pub mod stats;
pub mod status;
pub mod transfer;
pub mod validation;

// Re-export commonly used types and functions
pub use config::{Config, EndpointConfig, SyncSettings};
pub use engine::{RunOutcome, RunReport, SyncEngine};
pub use error::{ConfigError, ConnectionError, ScanError, SyncError, TransferError};
pub use events::{EventSink, Phase};
pub use local::LocalSessionProvider;
pub use session::{DirEntry, RemoteSession, SessionProvider};
pub use stats::RunStatistics;

// vim: ts=4
