//! Filesystem-backed session
//!
//! Serves loopback endpoints by mapping remote paths straight onto the local
//! filesystem. Used by the CLI for local mirrors and by the test suite.

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::EndpointConfig;
use crate::error::ConnectionError;
use crate::logging::*;
use crate::session::{DirEntry, RemoteReader, RemoteSession, RemoteWriter, SessionProvider};
use crate::validation::is_local_host;

/// Session over the local filesystem
pub struct LocalSession {
	name: String,
	closed: AtomicBool,
}

impl LocalSession {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), closed: AtomicBool::new(false) }
	}

	fn ensure_open(&self) -> io::Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(io::Error::new(
				io::ErrorKind::NotConnected,
				format!("connection lost: session {} is closed", self.name),
			));
		}
		Ok(())
	}
}

#[async_trait]
impl RemoteSession for LocalSession {
	fn name(&self) -> &str {
		&self.name
	}

	async fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
		self.ensure_open()?;
		let mut reader = tokio::fs::read_dir(path).await?;
		let mut entries = Vec::new();
		while let Some(entry) = reader.next_entry().await? {
			let is_link = entry.file_type().await.map(|t| t.is_symlink()).unwrap_or(false);
			// File links are followed; directory links are never descended
			let metadata = match tokio::fs::metadata(entry.path()).await {
				Ok(m) if is_link && m.is_dir() => {
					debug!("Skipping directory link {}", entry.path().display());
					continue;
				}
				Ok(m) => m,
				Err(e) => {
					debug!("Skipping {}: {}", entry.path().display(), e);
					continue;
				}
			};
			entries.push(DirEntry {
				name: entry.file_name().to_string_lossy().into_owned(),
				is_dir: metadata.is_dir(),
				size: metadata.len(),
				modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
			});
		}
		Ok(entries)
	}

	async fn open_read(&self, path: &str) -> io::Result<RemoteReader> {
		self.ensure_open()?;
		let file = tokio::fs::File::open(path).await?;
		Ok(Box::new(file))
	}

	async fn create_write(&self, path: &str) -> io::Result<RemoteWriter> {
		self.ensure_open()?;
		let file = tokio::fs::File::create(path).await?;
		Ok(Box::new(file))
	}

	async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
		self.ensure_open()?;
		tokio::fs::rename(from, to).await
	}

	async fn remove(&self, path: &str) -> io::Result<()> {
		self.ensure_open()?;
		tokio::fs::remove_file(path).await
	}

	async fn mkdir_all(&self, path: &str) -> io::Result<()> {
		self.ensure_open()?;
		tokio::fs::create_dir_all(path).await
	}

	async fn set_times(&self, path: &str, modified: SystemTime) -> io::Result<()> {
		self.ensure_open()?;
		let path = path.to_string();
		let mtime = filetime::FileTime::from_system_time(modified);
		tokio::task::spawn_blocking(move || filetime::set_file_times(&path, mtime, mtime))
			.await
			.map_err(io::Error::other)?
	}

	async fn close(&self) -> io::Result<()> {
		self.closed.store(true, Ordering::Release);
		Ok(())
	}
}

/// Provider for loopback endpoints
#[derive(Debug, Default, Clone)]
pub struct LocalSessionProvider;

impl LocalSessionProvider {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
	async fn connect(
		&self,
		label: &str,
		endpoint: &EndpointConfig,
	) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
		if !is_local_host(&endpoint.host) {
			return Err(ConnectionError::Unsupported {
				endpoint: endpoint.label(),
				message: "only local endpoints are served by the filesystem provider".to_string(),
			});
		}
		debug!("Opening local {} session", label);
		Ok(Arc::new(LocalSession::new(format!("{} ({})", label, endpoint.label()))))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	#[tokio::test]
	async fn test_write_rename_read() {
		let dir = tempfile::TempDir::new().unwrap();
		let root = dir.path().to_string_lossy().into_owned();
		let session = LocalSession::new("test");

		let nested = format!("{}/a/b", root);
		session.mkdir_all(&nested).await.unwrap();
		session.mkdir_all(&nested).await.unwrap();

		let tmp = format!("{}/file.tmp", nested);
		let dst = format!("{}/file.txt", nested);
		let mut writer = session.create_write(&tmp).await.unwrap();
		writer.write_all(b"hello").await.unwrap();
		writer.shutdown().await.unwrap();
		drop(writer);
		session.rename(&tmp, &dst).await.unwrap();

		let mut reader = session.open_read(&dst).await.unwrap();
		let mut buf = String::new();
		reader.read_to_string(&mut buf).await.unwrap();
		assert_eq!(buf, "hello");

		let listing = session.list_dir(&nested).await.unwrap();
		assert_eq!(listing.len(), 1);
		assert_eq!(listing[0].name, "file.txt");
		assert_eq!(listing[0].size, 5);
		assert!(!listing[0].is_dir);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_directory_links_are_not_listed() {
		let dir = tempfile::TempDir::new().unwrap();
		let root = dir.path();
		std::fs::create_dir(root.join("real")).unwrap();
		std::fs::write(root.join("real/data"), b"1234").unwrap();
		std::os::unix::fs::symlink(root, root.join("real/loop")).unwrap();
		std::os::unix::fs::symlink(root.join("real/data"), root.join("real/alias")).unwrap();

		let session = LocalSession::new("test");
		let mut listing = session.list_dir(&root.join("real").to_string_lossy()).await.unwrap();
		listing.sort_by(|a, b| a.name.cmp(&b.name));
		let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, vec!["alias", "data"]);
		assert!(listing.iter().all(|e| !e.is_dir && e.size == 4));
	}

	#[tokio::test]
	async fn test_set_times() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("f");
		std::fs::write(&path, b"x").unwrap();
		let session = LocalSession::new("test");
		let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
		session.set_times(&path.to_string_lossy(), when).await.unwrap();
		assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), when);
	}

	#[tokio::test]
	async fn test_closed_session_refuses_calls() {
		let dir = tempfile::TempDir::new().unwrap();
		let session = LocalSession::new("test");
		session.close().await.unwrap();
		let err = session.list_dir(&dir.path().to_string_lossy()).await.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotConnected);
	}

	#[tokio::test]
	async fn test_provider_refuses_remote_hosts() {
		let provider = LocalSessionProvider::new();
		let local = EndpointConfig::default();
		assert!(provider.connect("source", &local).await.is_ok());

		let remote = EndpointConfig { host: "sftp.example.com".to_string(), ..Default::default() };
		match provider.connect("source", &remote).await {
			Err(ConnectionError::Unsupported { endpoint, .. }) => {
				assert_eq!(endpoint, "sftp.example.com:22")
			}
			_ => panic!("expected Unsupported"),
		}
	}
}

// vim: ts=4
