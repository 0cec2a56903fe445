use cutover_domain::{EntityType, clock};

use crate::{CutoverService, Error, Result};

impl CutoverService {
	/// Erases the user's canonical data and, when asked, the legacy subtree. Appends one
	/// `user` delete event after the erased log.
	pub async fn delete_user(&self, user_id: &str, erase_legacy: bool) -> Result<()> {
		crate::require("user_id", user_id)?;
		crate::check_id("user_id", user_id)?;

		let deleted_at = clock::now_ms();

		self.store.delete_user(user_id, deleted_at).await?;

		if erase_legacy && let Some(writer) = self.legacy_writer.as_ref() {
			writer.delete_user_data(user_id).await.map_err(Error::mirror)?;
		}

		tracing::info!(user_id, erase_legacy, "User data erased.");

		self.notify_delete(user_id, EntityType::User, user_id, deleted_at).await;

		Ok(())
	}
}
