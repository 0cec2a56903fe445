use serde::{Deserialize, Serialize};

use cutover_domain::{EntityType, GlobalCategory, Statement, clock};
use cutover_storage::ImportResult;

use crate::{CutoverService, Error, Result};

/// Outcome of importing a catalog category into a user's own categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
	Ok,
	/// The user already has a live category with that id and `force` was not set.
	Exists,
	/// Neither catalog has a category with that id.
	NotFound,
}

impl CutoverService {
	/// The shared catalog. Falls back to the legacy catalog while the canonical one is empty.
	pub async fn list_global_categories(
		&self,
		include_statements: bool,
	) -> Result<Vec<GlobalCategory>> {
		let categories = self.store.list_global_categories(include_statements).await?;

		if !categories.is_empty() {
			return Ok(categories);
		}

		let Some(reader) = self.legacy_reader.as_ref() else {
			return Ok(categories);
		};
		let mut categories = reader.list_global_categories().await?;

		if !include_statements {
			for category in &mut categories {
				category.statements.clear();
			}
		}

		Ok(categories)
	}

	pub async fn list_global_statements(&self, category_id: &str) -> Result<Vec<Statement>> {
		Ok(self.store.list_global_statements(category_id).await?)
	}

	pub async fn import_global_category(
		&self,
		user_id: &str,
		category_id: &str,
		force: bool,
	) -> Result<ImportStatus> {
		crate::require("user_id", user_id)?;
		crate::require("category_id", category_id)?;

		let updated_at = clock::now_ms();
		let (category, statements) = match self
			.store
			.import_global_category(user_id, category_id, force, updated_at)
			.await?
		{
			ImportResult::Imported { category, statements } => (category, statements),
			ImportResult::Exists => return Ok(ImportStatus::Exists),
			ImportResult::NotFound => {
				match self.import_from_legacy(user_id, category_id, force, updated_at).await? {
					ImportResult::Imported { category, statements } => (category, statements),
					ImportResult::Exists => return Ok(ImportStatus::Exists),
					ImportResult::NotFound => return Ok(ImportStatus::NotFound),
				}
			},
		};

		if let Some(writer) = self.legacy_writer.as_ref() {
			writer
				.import_global_category(user_id, &category, &statements)
				.await
				.map_err(Error::mirror)?;
		}

		self.notify_upsert(user_id, EntityType::Category, &category.id, &category, updated_at)
			.await;

		for statement in &statements {
			self.notify_upsert(user_id, EntityType::Statement, &statement.id, statement, updated_at)
				.await;
		}

		Ok(ImportStatus::Ok)
	}

	/// Admin in the canonical store, or else in the legacy tree.
	pub async fn is_admin(&self, user_id: &str) -> Result<bool> {
		crate::require("user_id", user_id)?;

		if self.store.is_admin(user_id).await? {
			return Ok(true);
		}

		match self.legacy_reader.as_ref() {
			Some(reader) => Ok(reader.is_admin(user_id).await?),
			None => Ok(false),
		}
	}

	// The canonical catalog may not be synced yet; copy the category out of the legacy one.
	async fn import_from_legacy(
		&self,
		user_id: &str,
		category_id: &str,
		force: bool,
		updated_at: i64,
	) -> Result<ImportResult> {
		let Some(reader) = self.legacy_reader.as_ref() else {
			return Ok(ImportResult::NotFound);
		};

		if !force {
			match self.find_category(user_id, category_id).await {
				Ok(_) => return Ok(ImportResult::Exists),
				Err(Error::NotFound { .. }) => {},
				Err(err) => return Err(err),
			}
		}

		let Some(global) = reader
			.list_global_categories()
			.await?
			.into_iter()
			.find(|category| category.id == category_id)
		else {
			return Ok(ImportResult::NotFound);
		};
		let category = self
			.store
			.upsert_category(user_id, &global.to_user_category(updated_at))
			.await?
			.stored;
		let mut statements = Vec::with_capacity(global.statements.len());

		for statement in &global.statements {
			let statement = Statement {
				category_id: category.id.clone(),
				updated_at,
				..statement.clone()
			};

			statements.push(self.store.upsert_statement(user_id, &statement).await?.stored);
		}

		Ok(ImportResult::Imported { category, statements })
	}
}
