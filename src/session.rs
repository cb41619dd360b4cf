//! Remote session capability interface
//!
//! The engine only ever talks to an endpoint through [`RemoteSession`]. How a
//! session is authenticated, and which wire protocol it speaks, is the
//! business of the [`SessionProvider`] that created it.
//!
//! Remote paths are plain `/`-separated strings; the helpers at the bottom of
//! this module manipulate them without consulting the local platform's rules.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::EndpointConfig;
use crate::error::ConnectionError;

/// Boxed byte source returned by [`RemoteSession::open_read`]
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed byte sink returned by [`RemoteSession::create_write`]
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
	/// Base name (no directory part)
	pub name: String,
	pub is_dir: bool,
	pub size: u64,
	pub modified: SystemTime,
}

/// Authenticated handle to one endpoint
///
/// Implementations must be usable from many tasks at once; the indexer and
/// the transfer workers share one session per endpoint.
#[async_trait]
pub trait RemoteSession: Send + Sync {
	/// Label used in logs and errors (e.g. `user@host:22`)
	fn name(&self) -> &str;

	/// List the direct children of a directory
	async fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

	/// Open a file for sequential reading
	async fn open_read(&self, path: &str) -> io::Result<RemoteReader>;

	/// Create (or truncate) a file for sequential writing
	async fn create_write(&self, path: &str) -> io::Result<RemoteWriter>;

	/// Rename `from` to `to`, replacing `to` if it exists
	async fn rename(&self, from: &str, to: &str) -> io::Result<()>;

	/// Remove a file
	async fn remove(&self, path: &str) -> io::Result<()>;

	/// Create a directory and all missing parents
	async fn mkdir_all(&self, path: &str) -> io::Result<()>;

	/// Set access and modification times
	async fn set_times(&self, path: &str, modified: SystemTime) -> io::Result<()>;

	/// Tear the session down; later calls fail
	async fn close(&self) -> io::Result<()>;
}

/// Factory turning endpoint parameters into live sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
	/// Open a session; `label` names the role ("source", "destination")
	async fn connect(
		&self,
		label: &str,
		endpoint: &EndpointConfig,
	) -> Result<Arc<dyn RemoteSession>, ConnectionError>;
}

// === Path helpers ===

/// Join a remote directory and a child name
pub fn join(dir: &str, name: &str) -> String {
	if dir.is_empty() {
		return name.to_string();
	}
	if dir.ends_with('/') {
		format!("{}{}", dir, name)
	} else {
		format!("{}/{}", dir, name)
	}
}

/// Parent directory of a remote path (`/` for top-level entries)
pub fn parent(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(0) => "/",
		Some(idx) => &trimmed[..idx],
		None => "",
	}
}

/// Last segment of a remote path
pub fn basename(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(idx) => &trimmed[idx + 1..],
		None => trimmed,
	}
}

/// Path of `path` relative to `root`, or `None` when it lies outside
pub fn relative<'a>(root: &str, path: &'a str) -> Option<&'a str> {
	let root = root.trim_end_matches('/');
	if root.is_empty() {
		return Some(path.trim_start_matches('/'));
	}
	let rest = path.strip_prefix(root)?;
	if rest.is_empty() {
		Some("")
	} else {
		rest.strip_prefix('/')
	}
}


// vim: ts=4
