//! Shared helpers: scratch trees and fault-injecting sessions

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use bucketsync::config::{Config, EndpointConfig};
use bucketsync::error::ConnectionError;
use bucketsync::local::LocalSession;
use bucketsync::session::{DirEntry, RemoteReader, RemoteSession, RemoteWriter, SessionProvider};

pub const BUCKET: &str = "01012024";

/// Fixed mtime so change detection is deterministic
pub fn base_time() -> SystemTime {
	SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn create_file(root: &Path, rel: &str, content: &[u8], mtime: SystemTime) {
	let path = root.join(rel);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(&path, content).unwrap();
	let ft = filetime::FileTime::from_system_time(mtime);
	filetime::set_file_times(&path, ft, ft).unwrap();
}

pub fn path_str(path: &Path) -> String {
	path.to_string_lossy().into_owned()
}

/// Config for a local-to-local sync with fast retries
pub fn config(src: &Path, dst: &Path) -> Config {
	let mut config = Config::default();
	config.sync.source_path = path_str(src);
	config.sync.destination_path = path_str(dst);
	config.sync.retry_delay_secs = 0;
	config.sync.days_to_sync = 1;
	config.sync.grace_period_secs = 2;
	config
}

pub fn buckets(_days: usize) -> Vec<String> {
	vec![BUCKET.to_string()]
}

/// What a [`FaultySession`] should break
#[derive(Default)]
pub struct Faults {
	/// list_dir fails with PermissionDenied for paths containing this
	pub fail_list: Option<String>,

	/// open_read fails for paths containing this
	pub fail_open: Option<String>,

	/// Every written byte is flipped
	pub corrupt_writes: bool,

	/// open_read fails with NotConnected for paths containing this
	pub drop_on_open: Option<String>,

	/// Delay before open_read returns
	pub open_delay: Duration,

	/// Delay before list_dir returns
	pub list_delay: Duration,

	/// Every call fails as if the connection dropped
	pub disconnected: bool,
}

/// Counters observed by a [`FaultySession`]
#[derive(Default)]
pub struct Counters {
	pub list_calls: AtomicUsize,
	pub open_calls: AtomicUsize,
	pub open_readers: AtomicUsize,
	pub peak_open_readers: AtomicUsize,
	pub failed_opens: Mutex<Vec<String>>,
}

/// LocalSession wrapper injecting faults
pub struct FaultySession {
	inner: LocalSession,
	faults: Faults,
	pub counters: Arc<Counters>,
}

impl FaultySession {
	pub fn new(name: &str, faults: Faults) -> Arc<Self> {
		Arc::new(Self { inner: LocalSession::new(name), faults, counters: Arc::new(Counters::default()) })
	}

	fn check_connected(&self) -> io::Result<()> {
		if self.faults.disconnected {
			return Err(io::Error::new(io::ErrorKind::NotConnected, "connection lost"));
		}
		Ok(())
	}
}

#[async_trait]
impl RemoteSession for FaultySession {
	fn name(&self) -> &str {
		self.inner.name()
	}

	async fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
		self.check_connected()?;
		self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
		if !self.faults.list_delay.is_zero() {
			tokio::time::sleep(self.faults.list_delay).await;
		}
		if let Some(ref needle) = self.faults.fail_list {
			if path.contains(needle.as_str()) {
				return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
			}
		}
		self.inner.list_dir(path).await
	}

	async fn open_read(&self, path: &str) -> io::Result<RemoteReader> {
		self.check_connected()?;
		self.counters.open_calls.fetch_add(1, Ordering::SeqCst);
		if let Some(ref needle) = self.faults.fail_open {
			if path.contains(needle.as_str()) {
				self.counters.failed_opens.lock().unwrap().push(path.to_string());
				return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
			}
		}
		if let Some(ref needle) = self.faults.drop_on_open {
			if path.contains(needle.as_str()) {
				return Err(io::Error::new(io::ErrorKind::NotConnected, "connection lost"));
			}
		}
		let now = self.counters.open_readers.fetch_add(1, Ordering::SeqCst) + 1;
		self.counters.peak_open_readers.fetch_max(now, Ordering::SeqCst);
		if !self.faults.open_delay.is_zero() {
			tokio::time::sleep(self.faults.open_delay).await;
		}
		match self.inner.open_read(path).await {
			Ok(inner) => Ok(Box::new(CountingReader { inner, counters: self.counters.clone() })),
			Err(e) => {
				self.counters.open_readers.fetch_sub(1, Ordering::SeqCst);
				Err(e)
			}
		}
	}

	async fn create_write(&self, path: &str) -> io::Result<RemoteWriter> {
		self.check_connected()?;
		let inner = self.inner.create_write(path).await?;
		if self.faults.corrupt_writes {
			return Ok(Box::new(CorruptingWriter { inner }));
		}
		Ok(inner)
	}

	async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
		self.check_connected()?;
		self.inner.rename(from, to).await
	}

	async fn remove(&self, path: &str) -> io::Result<()> {
		self.inner.remove(path).await
	}

	async fn mkdir_all(&self, path: &str) -> io::Result<()> {
		self.check_connected()?;
		self.inner.mkdir_all(path).await
	}

	async fn set_times(&self, path: &str, modified: SystemTime) -> io::Result<()> {
		self.inner.set_times(path, modified).await
	}

	async fn close(&self) -> io::Result<()> {
		self.inner.close().await
	}
}

/// Reader that keeps the open-reader gauge up to date
struct CountingReader {
	inner: RemoteReader,
	counters: Arc<Counters>,
}

impl AsyncRead for CountingReader {
	fn poll_read(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

impl Drop for CountingReader {
	fn drop(&mut self) {
		self.counters.open_readers.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Writer that flips every byte it is handed
struct CorruptingWriter {
	inner: RemoteWriter,
}

impl AsyncWrite for CorruptingWriter {
	fn poll_write(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		let flipped: Vec<u8> = buf.iter().map(|b| !b).collect();
		Pin::new(&mut self.inner).poll_write(cx, &flipped)
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_shutdown(cx)
	}
}

/// Provider handing out fixed sessions by role
pub struct FixedProvider {
	pub source: Arc<dyn RemoteSession>,
	pub destination: Option<Arc<dyn RemoteSession>>,
}

#[async_trait]
impl SessionProvider for FixedProvider {
	async fn connect(
		&self,
		label: &str,
		endpoint: &EndpointConfig,
	) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
		match label {
			"source" => Ok(self.source.clone()),
			_ => self.destination.clone().ok_or_else(|| ConnectionError::Unreachable {
				endpoint: endpoint.label(),
				source: "connection refused".into(),
			}),
		}
	}
}

// vim: ts=4
