use std::{sync::Arc, time::Duration};

use tokio::time;

use cutover_legacy::RtdbClient;

use crate::{Reconciler, Result};

/// Follows the legacy change stream forever, reconnecting after `stream_reconnect_ms` whenever
/// the connection ends.
pub async fn run_stream(
	reconciler: Arc<Reconciler>,
	client: RtdbClient,
	cfg: cutover_config::Reconciliation,
) {
	let backoff = Duration::from_millis(cfg.stream_reconnect_ms);

	loop {
		match follow(&reconciler, &client, &cfg.stream_path).await {
			Ok(()) => {
				tracing::info!(path = %cfg.stream_path, "Legacy stream closed by the server.");
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					path = %cfg.stream_path,
					"Legacy stream disconnected."
				);
			},
		}

		tracing::info!(
			wait_ms = cfg.stream_reconnect_ms,
			"Waiting before reconnecting legacy stream."
		);

		time::sleep(backoff).await;
	}
}

async fn follow(reconciler: &Reconciler, client: &RtdbClient, root: &str) -> Result<()> {
	let mut events = client.open_stream(root).await?;

	tracing::info!(path = root, "Legacy stream connected.");

	while let Some(event) = events.next_event().await? {
		match reconciler.apply_event(root, &event).await {
			Ok(0) => {},
			Ok(applied) => tracing::debug!(applied, "Applied legacy delta."),
			// One bad delta must not drop the connection; the next poll pass converges it.
			Err(err) => tracing::error!(error = %err, ?event, "Failed to apply legacy delta."),
		}
	}

	Ok(())
}
