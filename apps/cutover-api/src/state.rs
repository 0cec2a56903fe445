use std::sync::Arc;

use cutover_legacy::{RtdbClient, TreeReader, TreeStore, TreeWriter};
use cutover_service::{ChangeFeed, CutoverService};
use cutover_storage::{CanonicalStore, db::Db};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<CutoverService>,
	pub feed: ChangeFeed,
}
impl AppState {
	pub async fn new(config: cutover_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let store: Arc<dyn CanonicalStore> = Arc::new(db);
		let mut service = CutoverService::new(config.feature, store.clone());

		if let Some(legacy) = config.legacy.as_ref() {
			let tree: Arc<dyn TreeStore> = Arc::new(RtdbClient::new(legacy)?);

			service = service.with_legacy_reader(Arc::new(TreeReader::new(tree.clone())));

			if legacy.mirror_writes {
				service = service.with_legacy_writer(Arc::new(TreeWriter::new(tree)));
			} else {
				tracing::warn!("Legacy mirroring is disabled; writes reach only the canonical store.");
			}
		}

		let feed = ChangeFeed::new(store, config.feed);

		Ok(Self::from_parts(service, feed))
	}

	pub fn from_parts(service: CutoverService, feed: ChangeFeed) -> Self {
		Self { service: Arc::new(service), feed }
	}
}
