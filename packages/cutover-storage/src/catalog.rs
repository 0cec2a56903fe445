use std::collections::HashMap;

use serde_json::Value;
use sqlx::PgConnection;

use cutover_domain::{GlobalCategory, Statement, Template};

use crate::{
	Error, Result, categories,
	db::Db,
	models::{GlobalCategoryRow, ImportResult, StatementRow, TemplateRow, Upsert},
	statements,
};

pub(crate) async fn list_categories(
	db: &Db,
	include_statements: bool,
) -> Result<Vec<GlobalCategory>> {
	let rows: Vec<GlobalCategoryRow> = sqlx::query_as(
		"\
SELECT category_id, label, created_at, is_default, updated_at
FROM global_categories
WHERE deleted_at IS NULL
ORDER BY created_at, category_id",
	)
	.fetch_all(&db.pool)
	.await?;
	let mut categories = rows.into_iter().map(GlobalCategoryRow::into_global).collect::<Vec<_>>();

	if !include_statements {
		return Ok(categories);
	}

	let rows: Vec<StatementRow> = sqlx::query_as(
		"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM global_statements
WHERE deleted_at IS NULL
ORDER BY created_at, statement_id",
	)
	.fetch_all(&db.pool)
	.await?;
	let mut by_category: HashMap<String, Vec<Statement>> = HashMap::new();

	for row in rows {
		by_category.entry(row.category_id.clone()).or_default().push(row.into_statement());
	}
	for category in &mut categories {
		category.statements = by_category.remove(&category.id).unwrap_or_default();
	}

	Ok(categories)
}

pub(crate) async fn list_statements(db: &Db, category_id: &str) -> Result<Vec<Statement>> {
	let mut conn = db.pool.acquire().await?;

	list_statements_on(&mut conn, category_id).await
}

pub(crate) async fn upsert_category(
	db: &Db,
	category: &GlobalCategory,
) -> Result<Upsert<GlobalCategory>> {
	let applied: Option<GlobalCategoryRow> = sqlx::query_as(
		"\
INSERT INTO global_categories (category_id, label, created_at, is_default, updated_at, deleted_at)
VALUES ($1, $2, $3, $4, $5, NULL)
ON CONFLICT (category_id) DO UPDATE
SET
	label = EXCLUDED.label,
	created_at = CASE
		WHEN global_categories.deleted_at IS NULL THEN global_categories.created_at
		ELSE EXCLUDED.created_at
	END,
	is_default = EXCLUDED.is_default,
	updated_at = EXCLUDED.updated_at,
	deleted_at = NULL
WHERE global_categories.updated_at < EXCLUDED.updated_at
	OR (
		global_categories.updated_at = EXCLUDED.updated_at
		AND (
			global_categories.label,
			global_categories.is_default,
			global_categories.deleted_at
		) IS DISTINCT FROM (
			EXCLUDED.label,
			EXCLUDED.is_default,
			EXCLUDED.deleted_at
		)
	)
RETURNING category_id, label, created_at, is_default, updated_at",
	)
	.bind(category.id.as_str())
	.bind(category.label.as_str())
	.bind(category.created)
	.bind(category.default)
	.bind(category.updated_at)
	.fetch_optional(&db.pool)
	.await?;

	if let Some(row) = applied {
		return Ok(Upsert::applied(row.into_global()));
	}

	let row: GlobalCategoryRow = sqlx::query_as(
		"\
SELECT category_id, label, created_at, is_default, updated_at
FROM global_categories
WHERE category_id = $1",
	)
	.bind(category.id.as_str())
	.fetch_one(&db.pool)
	.await?;
	let stored_updated_at = row.updated_at;

	Ok(Upsert::skipped(row.into_global(), stored_updated_at, category.updated_at))
}

pub(crate) async fn delete_category(db: &Db, category_id: &str, deleted_at: i64) -> Result<bool> {
	let mut tx = db.pool.begin().await?;
	let deleted: Option<String> = sqlx::query_scalar(
		"\
UPDATE global_categories
SET deleted_at = $2, updated_at = $2
WHERE category_id = $1 AND deleted_at IS NULL AND updated_at <= $2
RETURNING category_id",
	)
	.bind(category_id)
	.bind(deleted_at)
	.fetch_optional(&mut *tx)
	.await?;

	if deleted.is_some() {
		sqlx::query(
			"\
UPDATE global_statements
SET deleted_at = $2, updated_at = GREATEST(updated_at, $2)
WHERE category_id = $1 AND deleted_at IS NULL",
		)
		.bind(category_id)
		.bind(deleted_at)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(deleted.is_some())
}

pub(crate) async fn upsert_statement(db: &Db, statement: &Statement) -> Result<Upsert<Statement>> {
	let mut tx = db.pool.begin().await?;
	let parent: Option<String> = sqlx::query_scalar(
		"\
SELECT category_id
FROM global_categories
WHERE category_id = $1 AND deleted_at IS NULL
FOR SHARE",
	)
	.bind(statement.category_id.as_str())
	.fetch_optional(&mut *tx)
	.await?;

	if parent.is_none() {
		return Err(Error::NotFound(format!("Global category {:?}.", statement.category_id)));
	}

	let applied: Option<StatementRow> = sqlx::query_as(
		"\
INSERT INTO global_statements (category_id, statement_id, text, created_at, updated_at, deleted_at)
VALUES ($1, $2, $3, $4, $5, NULL)
ON CONFLICT (category_id, statement_id) DO UPDATE
SET
	text = EXCLUDED.text,
	created_at = CASE
		WHEN global_statements.deleted_at IS NULL THEN global_statements.created_at
		ELSE EXCLUDED.created_at
	END,
	updated_at = EXCLUDED.updated_at,
	deleted_at = NULL
WHERE global_statements.updated_at < EXCLUDED.updated_at
	OR (
		global_statements.updated_at = EXCLUDED.updated_at
		AND (global_statements.text, global_statements.deleted_at)
			IS DISTINCT FROM (EXCLUDED.text, EXCLUDED.deleted_at)
	)
RETURNING statement_id, category_id, text, created_at, updated_at",
	)
	.bind(statement.category_id.as_str())
	.bind(statement.id.as_str())
	.bind(statement.text.as_str())
	.bind(statement.created)
	.bind(statement.updated_at)
	.fetch_optional(&mut *tx)
	.await?;
	let result = match applied {
		Some(row) => Upsert::applied(row.into_statement()),
		None => {
			let row: StatementRow = sqlx::query_as(
				"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM global_statements
WHERE category_id = $1 AND statement_id = $2",
			)
			.bind(statement.category_id.as_str())
			.bind(statement.id.as_str())
			.fetch_one(&mut *tx)
			.await?;
			let stored_updated_at = row.updated_at;

			Upsert::skipped(row.into_statement(), stored_updated_at, statement.updated_at)
		},
	};

	tx.commit().await?;

	Ok(result)
}

pub(crate) async fn delete_statement(
	db: &Db,
	category_id: &str,
	statement_id: &str,
	deleted_at: i64,
) -> Result<bool> {
	let deleted: Option<String> = sqlx::query_scalar(
		"\
UPDATE global_statements
SET deleted_at = $3, updated_at = $3
WHERE category_id = $1
	AND statement_id = $2
	AND deleted_at IS NULL
	AND updated_at <= $3
RETURNING statement_id",
	)
	.bind(category_id)
	.bind(statement_id)
	.bind(deleted_at)
	.fetch_optional(&db.pool)
	.await?;

	Ok(deleted.is_some())
}

pub(crate) async fn import_category(
	db: &Db,
	user_id: &str,
	category_id: &str,
	force: bool,
	updated_at: i64,
) -> Result<ImportResult> {
	let mut tx = db.pool.begin().await?;

	if !force && categories::is_live(&mut tx, user_id, category_id).await? {
		tx.rollback().await?;

		return Ok(ImportResult::Exists);
	}

	let global: Option<GlobalCategoryRow> = sqlx::query_as(
		"\
SELECT category_id, label, created_at, is_default, updated_at
FROM global_categories
WHERE category_id = $1 AND deleted_at IS NULL",
	)
	.bind(category_id)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(global) = global else {
		tx.rollback().await?;

		return Ok(ImportResult::NotFound);
	};
	let category = global.into_global().to_user_category(updated_at);
	let category = categories::upsert_on(&mut tx, user_id, &category).await?.stored;
	let mut imported = Vec::new();

	for statement in list_statements_on(&mut tx, category_id).await? {
		let statement = Statement { updated_at, ..statement };

		imported.push(statements::upsert_on(&mut tx, user_id, &statement).await?.stored);
	}

	tx.commit().await?;

	Ok(ImportResult::Imported { category, statements: imported })
}

pub(crate) async fn list_templates(db: &Db) -> Result<Vec<Template>> {
	let rows: Vec<TemplateRow> = sqlx::query_as(
		"\
SELECT template_id, label, phrases, category, kind, order_index
FROM templates
ORDER BY order_index, template_id",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(TemplateRow::into_template).collect())
}

pub(crate) async fn replace_templates(db: &Db, templates: &[Template]) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query("DELETE FROM templates").execute(&mut *tx).await?;

	for template in templates {
		sqlx::query(
			"\
INSERT INTO templates (template_id, label, phrases, category, kind, order_index)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (template_id) DO UPDATE
SET
	label = EXCLUDED.label,
	phrases = EXCLUDED.phrases,
	category = EXCLUDED.category,
	kind = EXCLUDED.kind,
	order_index = EXCLUDED.order_index",
		)
		.bind(template.id.as_str())
		.bind(template.label.as_str())
		.bind(Value::from(template.phrases.clone()))
		.bind(template.category.as_str())
		.bind(template.kind.as_str())
		.bind(template.order_index)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

async fn list_statements_on(conn: &mut PgConnection, category_id: &str) -> Result<Vec<Statement>> {
	let rows: Vec<StatementRow> = sqlx::query_as(
		"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM global_statements
WHERE category_id = $1 AND deleted_at IS NULL
ORDER BY created_at, statement_id",
	)
	.bind(category_id)
	.fetch_all(&mut *conn)
	.await?;

	Ok(rows.into_iter().map(StatementRow::into_statement).collect())
}
