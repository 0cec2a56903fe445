use serde::{Deserialize, Serialize};

use cutover_domain::{Category, EntityType, clock, ids};

use crate::{CutoverService, Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
	#[serde(default)]
	pub id: Option<String>,
	pub label: String,
	#[serde(default)]
	pub created: Option<i64>,
	#[serde(default)]
	pub default: Option<bool>,
	#[serde(rename = "aiUse", default)]
	pub ai_use: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateCategoryRequest {
	#[serde(default)]
	pub label: Option<String>,
	#[serde(default)]
	pub default: Option<bool>,
	#[serde(rename = "aiUse", default)]
	pub ai_use: Option<bool>,
}

impl CutoverService {
	pub async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
		crate::require("user_id", user_id)?;

		if !self.use_canonical(user_id) {
			if let Some(reader) = self.legacy_reader.as_ref() {
				return Ok(reader.fetch_user_data(user_id).await?.categories);
			}

			return Ok(self.store.list_categories(user_id).await?);
		}

		let categories = self.store.list_categories(user_id).await?;

		if !categories.is_empty() {
			return Ok(categories);
		}

		Ok(self.seed_from_legacy(user_id).await?.map(|data| data.categories).unwrap_or_default())
	}

	/// Looks the category up in the same source `list_categories` reads.
	pub async fn find_category(&self, user_id: &str, category_id: &str) -> Result<Category> {
		self.list_categories(user_id)
			.await?
			.into_iter()
			.find(|category| category.id == category_id)
			.ok_or_else(|| Error::not_found(format!("Category {category_id:?} not found.")))
	}

	pub async fn create_category(
		&self,
		user_id: &str,
		req: CreateCategoryRequest,
	) -> Result<Category> {
		crate::require("user_id", user_id)?;
		crate::require("label", &req.label)?;

		let id = req.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(ids::new_short_id);

		crate::check_id("id", &id)?;

		let now = clock::now_ms();
		let category = Category {
			id,
			label: req.label.trim().to_string(),
			created: req.created.filter(|created| *created > 0).unwrap_or(now),
			default: req.default,
			ai_use: req.ai_use,
			updated_at: now,
		};

		self.write_category(user_id, &category).await
	}

	pub async fn update_category(
		&self,
		user_id: &str,
		category_id: &str,
		req: UpdateCategoryRequest,
	) -> Result<Category> {
		let mut category = self.find_category(user_id, category_id).await?;

		if let Some(label) = req.label {
			crate::require("label", &label)?;

			category.label = label.trim().to_string();
		}
		if let Some(default) = req.default {
			category.default = Some(default);
		}
		if let Some(ai_use) = req.ai_use {
			category.ai_use = ai_use;
		}

		category.updated_at = clock::next_after(category.updated_at);

		self.write_category(user_id, &category).await
	}

	/// Soft-deletes the category and its statements. Emits one delete event for the category
	/// and one per statement.
	pub async fn delete_category(&self, user_id: &str, category_id: &str) -> Result<()> {
		let category = self.find_category(user_id, category_id).await?;
		let listed = self.list_statements(user_id, category_id).await?;
		let deleted_at = listed
			.iter()
			.map(|statement| statement.updated_at)
			.fold(clock::next_after(category.updated_at), |at, updated_at| at.max(updated_at));
		let deletion = self.store.delete_category(user_id, category_id, deleted_at).await?;

		if let Some(writer) = self.legacy_writer.as_ref() {
			writer.delete_category(user_id, category_id).await.map_err(Error::mirror)?;
		}

		let mut statement_ids = deletion.statement_ids;

		statement_ids.extend(listed.into_iter().map(|statement| statement.id));
		statement_ids.sort();
		statement_ids.dedup();

		self.notify_delete(user_id, EntityType::Category, category_id, deleted_at).await;

		for statement_id in &statement_ids {
			self.notify_delete(user_id, EntityType::Statement, statement_id, deleted_at).await;
		}

		Ok(())
	}

	async fn write_category(&self, user_id: &str, category: &Category) -> Result<Category> {
		let written = self.store.upsert_category(user_id, category).await?;

		self.mirror_category(user_id, &written.stored).await?;

		if written.is_applied() {
			self.notify_upsert(
				user_id,
				EntityType::Category,
				&written.stored.id,
				&written.stored,
				written.stored.updated_at,
			)
			.await;
		}

		Ok(written.stored)
	}
}
