//! Reconciliation worker: keeps the canonical store converged with the legacy tree.
//!
//! A poll loop copies full snapshots on a fixed interval. An optional stream loop applies the
//! legacy store's live deltas as they arrive. Both append the same change events the API
//! appends for its own writes.

pub mod delta;
pub mod stream;
pub mod worker;

mod error;

use std::{sync::Arc, time::Duration};

use color_eyre::eyre;

use cutover_legacy::{RtdbClient, TreeReader, TreeStore};
use cutover_storage::{CanonicalStore, db::Db};

pub use cutover_cli::Args;
pub use error::{Error, Result};
pub use worker::{PassReport, Reconciler};

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cutover_config::load(&args.config)?;

	cutover_cli::init_tracing(&config.service.log_level);

	let Some(legacy) = config.legacy.as_ref() else {
		return Err(eyre::eyre!("The reconciliation worker requires a [legacy] section."));
	};
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let store: Arc<dyn CanonicalStore> = Arc::new(db);
	let client = RtdbClient::new(legacy)?;
	let tree: Arc<dyn TreeStore> = Arc::new(client.clone());
	let reconciler = Arc::new(Reconciler::new(store, Arc::new(TreeReader::new(tree))));

	if config.sync.stream_enabled {
		tokio::spawn(stream::run_stream(reconciler.clone(), client, config.sync.clone()));
	}

	worker::run_poll(reconciler, Duration::from_millis(config.sync.poll_interval_ms)).await;

	Ok(())
}
