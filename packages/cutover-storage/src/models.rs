use serde_json::{Map, Value};

use cutover_domain::{Category, ChangeEvent, ChangeOp, EntityType, GlobalCategory, Statement, Template};

use crate::cursor;

/// Outcome of a timestamp-guarded upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
	/// The incoming write was newer, or as new with different content, and replaced the row.
	Applied,
	/// The stored row already carries the same timestamp and content.
	Unchanged,
	/// The stored row is newer; the incoming write was discarded.
	Stale,
}

/// Result of an upsert together with the entity as it is stored after the call.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert<T> {
	pub status: UpsertStatus,
	pub stored: T,
}
impl<T> Upsert<T> {
	pub fn applied(stored: T) -> Self {
		Self { status: UpsertStatus::Applied, stored }
	}

	/// Classifies a write that did not replace `stored`.
	pub fn skipped(stored: T, stored_updated_at: i64, incoming_updated_at: i64) -> Self {
		let status = if stored_updated_at == incoming_updated_at {
			UpsertStatus::Unchanged
		} else {
			UpsertStatus::Stale
		};

		Self { status, stored }
	}

	pub fn is_applied(&self) -> bool {
		self.status == UpsertStatus::Applied
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Upsert<U> {
		Upsert { status: self.status, stored: f(self.stored) }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDeletion {
	/// False when the category was missing, already deleted, or newer than the delete.
	pub deleted: bool,
	/// Live statements that were soft-deleted along with the category.
	pub statement_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
	Imported { category: Category, statements: Vec<Statement> },
	/// The user already owns a live category with that id and `force` was not set.
	Exists,
	/// The catalog has no live category with that id.
	NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangePage {
	pub next_cursor: String,
	pub changes: Vec<ChangeEvent>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CategoryRow {
	pub category_id: String,
	pub label: String,
	pub created_at: i64,
	pub is_default: Option<bool>,
	pub ai_use: bool,
	pub updated_at: i64,
}
impl CategoryRow {
	pub fn into_category(self) -> Category {
		Category {
			id: self.category_id,
			label: self.label,
			created: self.created_at,
			default: self.is_default,
			ai_use: self.ai_use,
			updated_at: self.updated_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatementRow {
	pub statement_id: String,
	pub category_id: String,
	pub text: String,
	pub created_at: i64,
	pub updated_at: i64,
}
impl StatementRow {
	pub fn into_statement(self) -> Statement {
		Statement {
			id: self.statement_id,
			category_id: self.category_id,
			text: self.text,
			created: self.created_at,
			updated_at: self.updated_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GlobalCategoryRow {
	pub category_id: String,
	pub label: String,
	pub created_at: i64,
	pub is_default: Option<bool>,
	pub updated_at: i64,
}
impl GlobalCategoryRow {
	pub fn into_global(self) -> GlobalCategory {
		GlobalCategory {
			id: self.category_id,
			label: self.label,
			created: self.created_at,
			default: self.is_default,
			updated_at: self.updated_at,
			statements: Vec::new(),
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
	pub inited: bool,
	pub preferences: Value,
	pub updated_at: i64,
}
impl UserRow {
	pub fn preferences(&self) -> Map<String, Value> {
		self.preferences.as_object().cloned().unwrap_or_default()
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TemplateRow {
	pub template_id: String,
	pub label: String,
	pub phrases: Value,
	pub category: String,
	pub kind: String,
	pub order_index: i64,
}
impl TemplateRow {
	pub fn into_template(self) -> Template {
		let phrases = self
			.phrases
			.as_array()
			.map(|items| items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect())
			.unwrap_or_default();

		Template {
			id: self.template_id,
			label: self.label,
			phrases,
			category: self.category,
			kind: self.kind,
			order_index: self.order_index,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ChangeRow {
	pub seq: i64,
	pub entity_type: String,
	pub entity_id: String,
	pub op: String,
	pub payload: Value,
	pub updated_at: i64,
}
impl ChangeRow {
	/// Rows with an unknown entity type or op are skipped rather than failing the page.
	pub fn into_event(self) -> Option<ChangeEvent> {
		Some(ChangeEvent {
			cursor: cursor::format(self.seq),
			entity_type: EntityType::parse(&self.entity_type)?,
			entity_id: self.entity_id,
			op: ChangeOp::parse(&self.op)?,
			payload: self.payload,
			updated_at: self.updated_at,
		})
	}
}
