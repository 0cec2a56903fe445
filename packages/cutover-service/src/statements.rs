use serde::{Deserialize, Serialize};

use cutover_domain::{EntityType, Statement, clock, ids};

use crate::{CutoverService, Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateStatementRequest {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(rename = "categoryId")]
	pub category_id: String,
	pub text: String,
	#[serde(default)]
	pub created: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateStatementRequest {
	#[serde(default)]
	pub text: Option<String>,
}

impl CutoverService {
	pub async fn list_statements(&self, user_id: &str, category_id: &str) -> Result<Vec<Statement>> {
		crate::require("user_id", user_id)?;

		if self.use_canonical(user_id) {
			let statements = self.store.list_statements(user_id, category_id).await?;

			if !statements.is_empty() {
				return Ok(statements);
			}
		}

		Ok(self
			.list_all_statements(user_id)
			.await?
			.into_iter()
			.filter(|statement| statement.category_id == category_id)
			.collect())
	}

	/// Every live statement of the user, from the same source `list_categories` reads.
	pub async fn list_all_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
		crate::require("user_id", user_id)?;

		if !self.use_canonical(user_id) {
			if let Some(reader) = self.legacy_reader.as_ref() {
				return Ok(reader.fetch_user_data(user_id).await?.statements);
			}

			return Ok(self.store.list_all_statements(user_id).await?);
		}

		let statements = self.store.list_all_statements(user_id).await?;

		// A user with canonical categories has been seeded; empty categories stay empty.
		if !statements.is_empty() || !self.store.list_categories(user_id).await?.is_empty() {
			return Ok(statements);
		}

		Ok(self.seed_from_legacy(user_id).await?.map(|data| data.statements).unwrap_or_default())
	}

	pub async fn find_statement(&self, user_id: &str, statement_id: &str) -> Result<Statement> {
		self.list_all_statements(user_id)
			.await?
			.into_iter()
			.find(|statement| statement.id == statement_id)
			.ok_or_else(|| Error::not_found(format!("Statement {statement_id:?} not found.")))
	}

	pub async fn create_statement(
		&self,
		user_id: &str,
		req: CreateStatementRequest,
	) -> Result<Statement> {
		crate::require("user_id", user_id)?;
		crate::require("categoryId", &req.category_id)?;
		crate::require("text", &req.text)?;

		let id = req.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(ids::new_short_id);

		crate::check_id("id", &id)?;

		let category = match self.find_category(user_id, &req.category_id).await {
			Ok(category) => category,
			Err(Error::NotFound { message }) => return Err(Error::InvalidRequest { message }),
			Err(err) => return Err(err),
		};

		// Legacy-routed users may not have the category in the canonical store yet.
		if !self.use_canonical(user_id) {
			self.store.upsert_category(user_id, &category).await?;
		}

		let now = clock::now_ms();
		let statement = Statement {
			id,
			category_id: category.id,
			text: req.text,
			created: req.created.filter(|created| *created > 0).unwrap_or(now),
			updated_at: now,
		};

		self.write_statement(user_id, &statement).await
	}

	pub async fn update_statement(
		&self,
		user_id: &str,
		statement_id: &str,
		req: UpdateStatementRequest,
	) -> Result<Statement> {
		let mut statement = self.find_statement(user_id, statement_id).await?;

		if let Some(text) = req.text {
			crate::require("text", &text)?;

			statement.text = text;
		}

		statement.updated_at = clock::next_after(statement.updated_at);

		if !self.use_canonical(user_id) {
			let category = self.find_category(user_id, &statement.category_id).await?;

			self.store.upsert_category(user_id, &category).await?;
		}

		self.write_statement(user_id, &statement).await
	}

	pub async fn delete_statement(&self, user_id: &str, statement_id: &str) -> Result<()> {
		let statement = self.find_statement(user_id, statement_id).await?;
		let deleted_at = clock::next_after(statement.updated_at);

		self.store.delete_statement(user_id, statement_id, deleted_at).await?;

		if let Some(writer) = self.legacy_writer.as_ref() {
			writer
				.delete_statement(user_id, &statement.category_id, statement_id)
				.await
				.map_err(Error::mirror)?;
		}

		self.notify_delete(user_id, EntityType::Statement, statement_id, deleted_at).await;

		Ok(())
	}

	async fn write_statement(&self, user_id: &str, statement: &Statement) -> Result<Statement> {
		let written = self.store.upsert_statement(user_id, statement).await?;

		self.mirror_statement(user_id, &written.stored).await?;

		if written.is_applied() {
			self.notify_upsert(
				user_id,
				EntityType::Statement,
				&written.stored.id,
				&written.stored,
				written.stored.updated_at,
			)
			.await;
		}

		Ok(written.stored)
	}
}
