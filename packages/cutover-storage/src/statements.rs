use sqlx::PgConnection;

use cutover_domain::Statement;

use crate::{
	Error, Result, categories,
	db::Db,
	models::{StatementRow, Upsert},
};

pub(crate) async fn list(db: &Db, user_id: &str, category_id: &str) -> Result<Vec<Statement>> {
	let rows: Vec<StatementRow> = sqlx::query_as(
		"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM statements
WHERE user_id = $1 AND category_id = $2 AND deleted_at IS NULL
ORDER BY created_at, statement_id",
	)
	.bind(user_id)
	.bind(category_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(StatementRow::into_statement).collect())
}

pub(crate) async fn list_all(db: &Db, user_id: &str) -> Result<Vec<Statement>> {
	let rows: Vec<StatementRow> = sqlx::query_as(
		"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM statements
WHERE user_id = $1 AND deleted_at IS NULL
ORDER BY created_at, statement_id",
	)
	.bind(user_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(StatementRow::into_statement).collect())
}

pub(crate) async fn upsert(
	db: &Db,
	user_id: &str,
	statement: &Statement,
) -> Result<Upsert<Statement>> {
	let mut tx = db.pool.begin().await?;
	let result = upsert_on(&mut tx, user_id, statement).await?;

	tx.commit().await?;

	Ok(result)
}

/// Must run inside a transaction so the category row stays share-locked until commit.
pub(crate) async fn upsert_on(
	conn: &mut PgConnection,
	user_id: &str,
	statement: &Statement,
) -> Result<Upsert<Statement>> {
	if !categories::is_live(conn, user_id, statement.category_id.as_str()).await? {
		return Err(Error::Conflict(format!(
			"Category {:?} does not exist for statement {:?}.",
			statement.category_id, statement.id
		)));
	}

	let applied: Option<StatementRow> = sqlx::query_as(
		"\
INSERT INTO statements (
	user_id,
	statement_id,
	category_id,
	text,
	created_at,
	updated_at,
	deleted_at
)
VALUES ($1, $2, $3, $4, $5, $6, NULL)
ON CONFLICT (user_id, statement_id) DO UPDATE
SET
	category_id = EXCLUDED.category_id,
	text = EXCLUDED.text,
	created_at = CASE
		WHEN statements.deleted_at IS NULL THEN statements.created_at
		ELSE EXCLUDED.created_at
	END,
	updated_at = EXCLUDED.updated_at,
	deleted_at = NULL
WHERE statements.updated_at < EXCLUDED.updated_at
	OR (
		statements.updated_at = EXCLUDED.updated_at
		AND (
			statements.category_id,
			statements.text,
			statements.deleted_at
		) IS DISTINCT FROM (
			EXCLUDED.category_id,
			EXCLUDED.text,
			EXCLUDED.deleted_at
		)
	)
RETURNING statement_id, category_id, text, created_at, updated_at",
	)
	.bind(user_id)
	.bind(statement.id.as_str())
	.bind(statement.category_id.as_str())
	.bind(statement.text.as_str())
	.bind(statement.created)
	.bind(statement.updated_at)
	.fetch_optional(&mut *conn)
	.await?;

	if let Some(row) = applied {
		return Ok(Upsert::applied(row.into_statement()));
	}

	let row: StatementRow = sqlx::query_as(
		"\
SELECT statement_id, category_id, text, created_at, updated_at
FROM statements
WHERE user_id = $1 AND statement_id = $2",
	)
	.bind(user_id)
	.bind(statement.id.as_str())
	.fetch_one(&mut *conn)
	.await?;
	let stored_updated_at = row.updated_at;

	Ok(Upsert::skipped(row.into_statement(), stored_updated_at, statement.updated_at))
}

pub(crate) async fn delete(
	db: &Db,
	user_id: &str,
	statement_id: &str,
	deleted_at: i64,
) -> Result<bool> {
	let deleted: Option<String> = sqlx::query_scalar(
		"\
UPDATE statements
SET deleted_at = $3, updated_at = $3
WHERE user_id = $1
	AND statement_id = $2
	AND deleted_at IS NULL
	AND updated_at <= $3
RETURNING statement_id",
	)
	.bind(user_id)
	.bind(statement_id)
	.bind(deleted_at)
	.fetch_optional(&db.pool)
	.await?;

	Ok(deleted.is_some())
}
