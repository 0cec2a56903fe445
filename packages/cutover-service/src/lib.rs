//! Orchestrates reads and writes across the canonical and legacy stores.
//!
//! Reads go to whichever store the feature router picks for the user. A canonical read that
//! comes back empty falls back to the legacy snapshot and seeds the canonical store with it.
//! Writes commit to the canonical store, are mirrored into the legacy tree, and then append one
//! change event per applied mutation.

pub mod catalog;
pub mod categories;
pub mod feed;
pub mod state;
pub mod statements;
pub mod users;

mod error;

use std::sync::Arc;

use serde::Serialize;

use cutover_config::Feature;
use cutover_domain::{Category, ChangeEvent, EntityType, NewChange, Statement, UserState, routing};
use cutover_legacy::{LegacyReader, LegacyWriter, UserData, paths};
use cutover_storage::CanonicalStore;

pub use catalog::ImportStatus;
pub use categories::{CreateCategoryRequest, UpdateCategoryRequest};
pub use error::{Error, Result};
pub use feed::{ChangeFeed, ChangesResponse, PushFrame, PushSession};
pub use state::UpdateStateRequest;
pub use statements::{CreateStatementRequest, UpdateStatementRequest};

pub struct CutoverService {
	pub feature: Feature,
	pub store: Arc<dyn CanonicalStore>,
	pub legacy_reader: Option<Arc<dyn LegacyReader>>,
	pub legacy_writer: Option<Arc<dyn LegacyWriter>>,
}
impl CutoverService {
	pub fn new(feature: Feature, store: Arc<dyn CanonicalStore>) -> Self {
		Self { feature, store, legacy_reader: None, legacy_writer: None }
	}

	pub fn with_legacy_reader(mut self, reader: Arc<dyn LegacyReader>) -> Self {
		self.legacy_reader = Some(reader);

		self
	}

	pub fn with_legacy_writer(mut self, writer: Arc<dyn LegacyWriter>) -> Self {
		self.legacy_writer = Some(writer);

		self
	}

	pub fn use_canonical(&self, user_id: &str) -> bool {
		routing::use_canonical(user_id, &self.feature)
	}

	/// Appends a change event. Failures are logged; the entity write already committed.
	pub(crate) async fn notify(&self, user_id: &str, change: NewChange) -> Option<ChangeEvent> {
		match self.store.append_change(user_id, &change).await {
			Ok(event) => Some(event),
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id,
					entity_type = change.entity_type.as_str(),
					entity_id = %change.entity_id,
					"Failed to append change event."
				);

				None
			},
		}
	}

	pub(crate) async fn notify_upsert<T>(
		&self,
		user_id: &str,
		entity_type: EntityType,
		entity_id: &str,
		snapshot: &T,
		updated_at: i64,
	) where
		T: Serialize,
	{
		match NewChange::upsert(entity_type, entity_id, snapshot, updated_at) {
			Ok(change) => {
				self.notify(user_id, change).await;
			},
			Err(err) => {
				tracing::warn!(error = %err, user_id, entity_id, "Failed to encode change payload.");
			},
		}
	}

	pub(crate) async fn notify_delete(
		&self,
		user_id: &str,
		entity_type: EntityType,
		entity_id: &str,
		updated_at: i64,
	) {
		self.notify(user_id, NewChange::delete(entity_type, entity_id, updated_at)).await;
	}

	/// Seeds the canonical store from the legacy snapshot when it has no live rows for the
	/// user, then serves what the canonical store holds. Seeding appends no events. Stale legacy
	/// rows, such as ones deleted canonically while the mirror was down, stay deleted. When
	/// seeding fails the legacy snapshot is served as is.
	pub(crate) async fn seed_from_legacy(&self, user_id: &str) -> Result<Option<UserData>> {
		let Some(reader) = self.legacy_reader.as_ref() else {
			return Ok(None);
		};
		let data = reader.fetch_user_data(user_id).await?;

		if data.is_empty() {
			return Ok(None);
		}
		if let Err(err) = self.seed_user_data(user_id, &data).await {
			tracing::warn!(error = %err, user_id, "Failed to seed canonical store from legacy.");

			return Ok(Some(data));
		}

		Ok(Some(UserData {
			categories: self.store.list_categories(user_id).await?,
			statements: self.store.list_all_statements(user_id).await?,
		}))
	}

	async fn seed_user_data(&self, user_id: &str, data: &UserData) -> Result<()> {
		for category in &data.categories {
			self.store.upsert_category(user_id, category).await?;
		}

		for statement in &data.statements {
			match self.store.upsert_statement(user_id, statement).await {
				Ok(_) => {},
				// Legacy trees can hold statements whose category node is gone.
				Err(cutover_storage::Error::Conflict(message)) => {
					tracing::warn!(
						user_id,
						statement_id = %statement.id,
						%message,
						"Skipping orphan legacy statement."
					);
				},
				Err(err) => return Err(err.into()),
			}
		}

		tracing::info!(
			user_id,
			categories = data.categories.len(),
			statements = data.statements.len(),
			"Seeded canonical store from legacy."
		);

		Ok(())
	}

	/// Seeds the user state and returns what the canonical store holds afterwards.
	pub(crate) async fn seed_user_state(&self, user_id: &str, state: UserState) -> UserState {
		match self.store.set_user_state(user_id, &state).await {
			Ok(written) => written.stored,
			Err(err) => {
				tracing::warn!(error = %err, user_id, "Failed to seed user state from legacy.");

				state
			},
		}
	}

	pub(crate) async fn mirror_category(&self, user_id: &str, category: &Category) -> Result<()> {
		if let Some(writer) = self.legacy_writer.as_ref() {
			writer.upsert_category(user_id, category).await.map_err(Error::mirror)?;
		}

		Ok(())
	}

	pub(crate) async fn mirror_statement(&self, user_id: &str, statement: &Statement) -> Result<()> {
		if let Some(writer) = self.legacy_writer.as_ref() {
			writer.upsert_statement(user_id, statement).await.map_err(Error::mirror)?;
		}

		Ok(())
	}
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(Error::invalid(format!("{field} is required.")));
	}

	Ok(())
}

/// Ids become legacy tree keys, so they must be valid path segments.
pub(crate) fn check_id(field: &str, value: &str) -> Result<()> {
	paths::segment(value)
		.map_err(|_| Error::invalid(format!("{field} {value:?} is not a valid id.")))?;

	Ok(())
}
