use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
	time::{Duration, Instant},
};

use serde::Serialize;
use tokio::time;

use cutover_domain::{Category, EntityType, NewChange, Statement, UserState, clock};
use cutover_legacy::LegacyReader;
use cutover_storage::CanonicalStore;

use crate::Result;

/// Counts of one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
	pub users: usize,
	pub failed_users: usize,
	pub events: usize,
	pub global_categories: usize,
}

/// Applies legacy data to the canonical store and records a change event per applied write.
pub struct Reconciler {
	pub(crate) store: Arc<dyn CanonicalStore>,
	pub(crate) reader: Arc<dyn LegacyReader>,
}
impl Reconciler {
	pub fn new(store: Arc<dyn CanonicalStore>, reader: Arc<dyn LegacyReader>) -> Self {
		Self { store, reader }
	}

	/// One full snapshot pass: admins, templates, the global catalog, then every user.
	/// A failing user is logged and skipped.
	pub async fn poll_once(&self) -> Result<PassReport> {
		let started = Instant::now();
		let mut report = PassReport::default();

		tracing::info!("Reconciliation pass started.");

		let admins = self.reader.list_admins().await?;

		self.store.replace_admins(&admins).await?;

		let templates = self.reader.list_templates().await?;

		self.store.replace_templates(&templates).await?;

		report.global_categories = self.sync_global_catalog().await?;

		for user_id in self.reader.list_user_ids().await? {
			match self.sync_user(&user_id).await {
				Ok(events) => {
					report.users += 1;
					report.events += events;
				},
				Err(err) => {
					report.failed_users += 1;

					tracing::error!(error = %err, user_id, "Failed to reconcile user.");
				},
			}
		}

		tracing::info!(
			users = report.users,
			failed_users = report.failed_users,
			events = report.events,
			admins = admins.len(),
			templates = templates.len(),
			global_categories = report.global_categories,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Reconciliation pass finished."
		);

		Ok(report)
	}

	/// Copies one user's categories, statements and state. Returns the number of events
	/// appended.
	pub async fn sync_user(&self, user_id: &str) -> Result<usize> {
		let data = self.reader.fetch_user_data(user_id).await?;
		let mut events = 0;

		for category in &data.categories {
			events += self.apply_category(user_id, category).await?;
		}
		for statement in &data.statements {
			events += self.apply_statement(user_id, statement).await?;
		}
		if let Some(state) = self.reader.get_user_state(user_id).await? {
			events += self.apply_state(user_id, &state).await?;
		}

		Ok(events)
	}

	async fn sync_global_catalog(&self) -> Result<usize> {
		let now = clock::now_ms();
		let legacy = self.reader.list_global_categories().await?;
		let mut live = HashMap::with_capacity(legacy.len());

		for category in &legacy {
			self.store.upsert_global_category(category).await?;

			let mut statement_ids = HashSet::with_capacity(category.statements.len());

			for statement in &category.statements {
				let statement = Statement { category_id: category.id.clone(), ..statement.clone() };

				self.store.upsert_global_statement(&statement).await?;
				statement_ids.insert(statement.id);
			}

			live.insert(category.id.clone(), statement_ids);
		}

		// An empty snapshot is treated as a failed read, not as an emptied catalog.
		if legacy.is_empty() {
			return Ok(0);
		}

		for canonical in self.store.list_global_categories(true).await? {
			let Some(statement_ids) = live.get(&canonical.id) else {
				self.store.delete_global_category(&canonical.id, now).await?;

				tracing::info!(
					category_id = %canonical.id,
					"Removed global category absent from legacy."
				);

				continue;
			};

			for statement in canonical.statements {
				if statement_ids.contains(&statement.id) {
					continue;
				}

				self.store.delete_global_statement(&canonical.id, &statement.id, now).await?;
			}
		}

		Ok(legacy.len())
	}

	pub(crate) async fn apply_category(&self, user_id: &str, category: &Category) -> Result<usize> {
		let written = self.store.upsert_category(user_id, category).await?;

		if !written.is_applied() {
			return Ok(0);
		}

		Ok(self
			.record_upsert(
				user_id,
				EntityType::Category,
				&written.stored.id,
				&written.stored,
				written.stored.updated_at,
			)
			.await)
	}

	pub(crate) async fn apply_statement(
		&self,
		user_id: &str,
		statement: &Statement,
	) -> Result<usize> {
		let written = match self.store.upsert_statement(user_id, statement).await {
			Ok(written) => written,
			// Legacy trees can hold statements whose category node is gone.
			Err(cutover_storage::Error::Conflict(message)) => {
				tracing::warn!(
					user_id,
					statement_id = %statement.id,
					%message,
					"Skipping orphan legacy statement."
				);

				return Ok(0);
			},
			Err(err) => return Err(err.into()),
		};

		if !written.is_applied() {
			return Ok(0);
		}

		Ok(self
			.record_upsert(
				user_id,
				EntityType::Statement,
				&written.stored.id,
				&written.stored,
				written.stored.updated_at,
			)
			.await)
	}

	pub(crate) async fn apply_state(&self, user_id: &str, state: &UserState) -> Result<usize> {
		let written = self.store.set_user_state(user_id, state).await?;

		if !written.is_applied() {
			return Ok(0);
		}

		Ok(self
			.record_upsert(
				user_id,
				EntityType::UserState,
				user_id,
				&written.stored,
				written.stored.updated_at,
			)
			.await)
	}

	pub(crate) async fn remove_category(
		&self,
		user_id: &str,
		category_id: &str,
		deleted_at: i64,
	) -> Result<usize> {
		let deletion = self.store.delete_category(user_id, category_id, deleted_at).await?;

		if !deletion.deleted {
			return Ok(0);
		}

		let mut events = self
			.record(user_id, NewChange::delete(EntityType::Category, category_id, deleted_at))
			.await;

		for statement_id in &deletion.statement_ids {
			events += self
				.record(user_id, NewChange::delete(EntityType::Statement, statement_id, deleted_at))
				.await;
		}

		Ok(events)
	}

	pub(crate) async fn remove_statement(
		&self,
		user_id: &str,
		statement_id: &str,
		deleted_at: i64,
	) -> Result<usize> {
		if !self.store.delete_statement(user_id, statement_id, deleted_at).await? {
			return Ok(0);
		}

		Ok(self
			.record(user_id, NewChange::delete(EntityType::Statement, statement_id, deleted_at))
			.await)
	}

	pub(crate) async fn remove_user(&self, user_id: &str, deleted_at: i64) -> Result<usize> {
		self.store.delete_user(user_id, deleted_at).await?;

		tracing::info!(user_id, "Legacy user removed; canonical data erased.");

		Ok(self.record(user_id, NewChange::delete(EntityType::User, user_id, deleted_at)).await)
	}

	async fn record_upsert<T>(
		&self,
		user_id: &str,
		entity_type: EntityType,
		entity_id: &str,
		snapshot: &T,
		updated_at: i64,
	) -> usize
	where
		T: Serialize,
	{
		match NewChange::upsert(entity_type, entity_id, snapshot, updated_at) {
			Ok(change) => self.record(user_id, change).await,
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id,
					entity_id,
					"Failed to encode change payload."
				);

				0
			},
		}
	}

	/// Appends a change event. A failed append is logged; the write it describes stands.
	async fn record(&self, user_id: &str, change: NewChange) -> usize {
		match self.store.append_change(user_id, &change).await {
			Ok(_) => 1,
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id,
					entity_type = change.entity_type.as_str(),
					entity_id = %change.entity_id,
					"Failed to append change event."
				);

				0
			},
		}
	}
}

pub async fn run_poll(reconciler: Arc<Reconciler>, interval: Duration) {
	loop {
		if let Err(err) = reconciler.poll_once().await {
			tracing::error!(error = %err, "Reconciliation pass failed.");
		}

		time::sleep(interval).await;
	}
}
