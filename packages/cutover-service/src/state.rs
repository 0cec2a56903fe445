use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cutover_domain::{EntityType, UserState, clock, quickes};

use crate::{CutoverService, Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateStateRequest {
	#[serde(default)]
	pub inited: Option<bool>,
	#[serde(default)]
	pub quickes: Option<Vec<String>>,
	#[serde(default)]
	pub preferences: Option<Map<String, Value>>,
}

impl CutoverService {
	/// The user's state with normalized quick phrases. Users with no stored state get the
	/// defaults.
	pub async fn get_user_state(&self, user_id: &str) -> Result<UserState> {
		crate::require("user_id", user_id)?;

		let state = if self.use_canonical(user_id) {
			match self.store.get_user_state(user_id).await? {
				Some(state) => Some(state),
				None => self.seed_state_from_legacy(user_id).await?,
			}
		} else if let Some(reader) = self.legacy_reader.as_ref() {
			reader.get_user_state(user_id).await?
		} else {
			self.store.get_user_state(user_id).await?
		};
		let mut state = state.unwrap_or_else(|| UserState {
			inited: false,
			quickes: quickes::defaults(),
			preferences: Map::new(),
			updated_at: 0,
		});

		state.quickes = quickes::normalize(&state.quickes);

		Ok(state)
	}

	pub async fn update_user_state(
		&self,
		user_id: &str,
		req: UpdateStateRequest,
	) -> Result<UserState> {
		let mut state = self.get_user_state(user_id).await?;

		if let Some(inited) = req.inited {
			state.inited = inited;
		}
		if let Some(slots) = req.quickes {
			state.quickes = quickes::normalize(&slots);
		}
		if let Some(preferences) = req.preferences {
			state.preferences = preferences;
		}

		state.updated_at = clock::next_after(state.updated_at);

		let written = self.store.set_user_state(user_id, &state).await?;

		if let Some(writer) = self.legacy_writer.as_ref() {
			writer.set_user_state(user_id, &written.stored).await.map_err(Error::mirror)?;
		}
		if written.is_applied() {
			self.notify_upsert(
				user_id,
				EntityType::UserState,
				user_id,
				&written.stored,
				written.stored.updated_at,
			)
			.await;
		}

		Ok(written.stored)
	}

	/// Replaces the quick-phrase slots and returns them normalized.
	pub async fn set_quickes(&self, user_id: &str, slots: &[String]) -> Result<Vec<String>> {
		let current = self.get_user_state(user_id).await?;
		let updated_at = clock::next_after(current.updated_at);
		let written = self.store.set_quickes(user_id, &quickes::normalize(slots), updated_at).await?;

		if let Some(writer) = self.legacy_writer.as_ref() {
			writer.set_quickes(user_id, &written.stored, updated_at).await.map_err(Error::mirror)?;
		}
		if written.is_applied() {
			self.notify_upsert(user_id, EntityType::Quickes, user_id, &written.stored, updated_at)
				.await;
		}

		Ok(written.stored)
	}

	async fn seed_state_from_legacy(&self, user_id: &str) -> Result<Option<UserState>> {
		let Some(reader) = self.legacy_reader.as_ref() else {
			return Ok(None);
		};
		let Some(mut state) = reader.get_user_state(user_id).await? else {
			return Ok(None);
		};

		state.quickes = quickes::normalize(&state.quickes);

		Ok(Some(self.seed_user_state(user_id, state).await))
	}
}
