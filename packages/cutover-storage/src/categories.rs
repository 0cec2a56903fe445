use sqlx::PgConnection;

use cutover_domain::Category;

use crate::{
	Result,
	db::Db,
	models::{CategoryDeletion, CategoryRow, Upsert},
};

pub(crate) async fn list(db: &Db, user_id: &str) -> Result<Vec<Category>> {
	let rows: Vec<CategoryRow> = sqlx::query_as(
		"\
SELECT category_id, label, created_at, is_default, ai_use, updated_at
FROM categories
WHERE user_id = $1 AND deleted_at IS NULL
ORDER BY created_at, category_id",
	)
	.bind(user_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(CategoryRow::into_category).collect())
}

pub(crate) async fn upsert(db: &Db, user_id: &str, category: &Category) -> Result<Upsert<Category>> {
	let mut conn = db.pool.acquire().await?;

	upsert_on(&mut conn, user_id, category).await
}

pub(crate) async fn upsert_on(
	conn: &mut PgConnection,
	user_id: &str,
	category: &Category,
) -> Result<Upsert<Category>> {
	let applied: Option<CategoryRow> = sqlx::query_as(
		"\
INSERT INTO categories (
	user_id,
	category_id,
	label,
	created_at,
	is_default,
	ai_use,
	updated_at,
	deleted_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
ON CONFLICT (user_id, category_id) DO UPDATE
SET
	label = EXCLUDED.label,
	created_at = CASE
		WHEN categories.deleted_at IS NULL THEN categories.created_at
		ELSE EXCLUDED.created_at
	END,
	is_default = EXCLUDED.is_default,
	ai_use = EXCLUDED.ai_use,
	updated_at = EXCLUDED.updated_at,
	deleted_at = NULL
WHERE categories.updated_at < EXCLUDED.updated_at
	OR (
		categories.updated_at = EXCLUDED.updated_at
		AND (
			categories.label,
			categories.is_default,
			categories.ai_use,
			categories.deleted_at
		) IS DISTINCT FROM (
			EXCLUDED.label,
			EXCLUDED.is_default,
			EXCLUDED.ai_use,
			EXCLUDED.deleted_at
		)
	)
RETURNING category_id, label, created_at, is_default, ai_use, updated_at",
	)
	.bind(user_id)
	.bind(category.id.as_str())
	.bind(category.label.as_str())
	.bind(category.created)
	.bind(category.default)
	.bind(category.ai_use)
	.bind(category.updated_at)
	.fetch_optional(&mut *conn)
	.await?;

	if let Some(row) = applied {
		return Ok(Upsert::applied(row.into_category()));
	}

	let row: CategoryRow = sqlx::query_as(
		"\
SELECT category_id, label, created_at, is_default, ai_use, updated_at
FROM categories
WHERE user_id = $1 AND category_id = $2",
	)
	.bind(user_id)
	.bind(category.id.as_str())
	.fetch_one(&mut *conn)
	.await?;
	let stored_updated_at = row.updated_at;

	Ok(Upsert::skipped(row.into_category(), stored_updated_at, category.updated_at))
}

pub(crate) async fn delete(
	db: &Db,
	user_id: &str,
	category_id: &str,
	deleted_at: i64,
) -> Result<CategoryDeletion> {
	let mut tx = db.pool.begin().await?;
	let deleted: Option<String> = sqlx::query_scalar(
		"\
UPDATE categories
SET deleted_at = $3, updated_at = $3
WHERE user_id = $1
	AND category_id = $2
	AND deleted_at IS NULL
	AND updated_at <= $3
RETURNING category_id",
	)
	.bind(user_id)
	.bind(category_id)
	.bind(deleted_at)
	.fetch_optional(&mut *tx)
	.await?;

	if deleted.is_none() {
		tx.rollback().await?;

		return Ok(CategoryDeletion::default());
	}

	let mut statement_ids: Vec<String> = sqlx::query_scalar(
		"\
UPDATE statements
SET deleted_at = $3, updated_at = GREATEST(updated_at, $3)
WHERE user_id = $1 AND category_id = $2 AND deleted_at IS NULL
RETURNING statement_id",
	)
	.bind(user_id)
	.bind(category_id)
	.bind(deleted_at)
	.fetch_all(&mut *tx)
	.await?;

	tx.commit().await?;

	statement_ids.sort();

	Ok(CategoryDeletion { deleted: true, statement_ids })
}

pub(crate) async fn is_live(conn: &mut PgConnection, user_id: &str, category_id: &str) -> Result<bool> {
	let found: Option<String> = sqlx::query_scalar(
		"\
SELECT category_id
FROM categories
WHERE user_id = $1 AND category_id = $2 AND deleted_at IS NULL
FOR SHARE",
	)
	.bind(user_id)
	.bind(category_id)
	.fetch_optional(&mut *conn)
	.await?;

	Ok(found.is_some())
}
