//! Signal handlers for graceful termination

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancel `cancel` on the first SIGINT/SIGTERM; exit on the second
///
/// The first signal lets the engine unwind and report; a second one means the
/// operator does not want to wait.
pub fn setup_signal_handlers(cancel: CancellationToken) {
	tokio::spawn(async move {
		wait_for_signal().await;
		warn!("Interrupt received, cancelling sync (press Ctrl-C again to abort)");
		cancel.cancel();

		wait_for_signal().await;
		debug!("Second interrupt, exiting immediately");
		std::process::exit(130); // 128 + SIGINT(2)
	});
}

#[cfg(unix)]
async fn wait_for_signal() {
	use tokio::signal;

	let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Only Ctrl-C will cancel.", e);
			let _ = signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => debug!("Received SIGTERM"),
		_ = signal::ctrl_c() => debug!("Received SIGINT"),
	}
}

#[cfg(not(unix))]
async fn wait_for_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!("Failed to listen for Ctrl-C: {}", e);
		std::future::pending::<()>().await;
	}
}

// vim: ts=4
