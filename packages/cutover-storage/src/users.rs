use sqlx::PgConnection;

use cutover_domain::{UserState, quickes};

use crate::{
	Result,
	db::Db,
	models::{Upsert, UserRow},
};

pub(crate) async fn get_state(db: &Db, user_id: &str) -> Result<Option<UserState>> {
	let mut conn = db.pool.acquire().await?;

	read_state(&mut conn, user_id).await
}

pub(crate) async fn set_state(
	db: &Db,
	user_id: &str,
	state: &UserState,
) -> Result<Upsert<UserState>> {
	let mut tx = db.pool.begin().await?;

	lock_user(&mut tx, user_id).await?;

	let incoming = UserState { quickes: quickes::normalize(&state.quickes), ..state.clone() };

	if let Some(current) = read_state(&mut tx, user_id).await?
		&& (current.updated_at > incoming.updated_at
			|| (current.updated_at == incoming.updated_at && current.same_content(&incoming)))
	{
		tx.rollback().await?;

		let current_updated_at = current.updated_at;

		return Ok(Upsert::skipped(current, current_updated_at, incoming.updated_at));
	}

	sqlx::query(
		"\
INSERT INTO users (user_id, inited, preferences, created_at, updated_at)
VALUES ($1, $2, $3, $4, $4)
ON CONFLICT (user_id) DO UPDATE
SET
	inited = EXCLUDED.inited,
	preferences = EXCLUDED.preferences,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(user_id)
	.bind(incoming.inited)
	.bind(serde_json::Value::Object(incoming.preferences.clone()))
	.bind(incoming.updated_at)
	.execute(&mut *tx)
	.await?;

	write_slots(&mut tx, user_id, &incoming.quickes, incoming.updated_at).await?;

	tx.commit().await?;

	Ok(Upsert::applied(incoming))
}

pub(crate) async fn set_quickes(
	db: &Db,
	user_id: &str,
	slots: &[String],
	updated_at: i64,
) -> Result<Upsert<Vec<String>>> {
	let mut tx = db.pool.begin().await?;

	lock_user(&mut tx, user_id).await?;

	let incoming = quickes::normalize(slots);
	let current = read_slots(&mut tx, user_id).await?;

	if let Some((current_updated_at, current)) = current
		&& (current_updated_at > updated_at
			|| (current_updated_at == updated_at && current == incoming))
	{
		tx.rollback().await?;

		return Ok(Upsert::skipped(current, current_updated_at, updated_at));
	}

	write_slots(&mut tx, user_id, &incoming, updated_at).await?;

	tx.commit().await?;

	Ok(Upsert::applied(incoming))
}

pub(crate) async fn delete_user(db: &Db, user_id: &str, deleted_at: i64) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	lock_user(&mut tx, user_id).await?;

	for sql in [
		"DELETE FROM users WHERE user_id = $1",
		"DELETE FROM quickes WHERE user_id = $1",
		"DELETE FROM changes WHERE user_id = $1",
	] {
		sqlx::query(sql).bind(user_id).execute(&mut *tx).await?;
	}

	sqlx::query(
		"\
UPDATE statements
SET deleted_at = $2, updated_at = GREATEST(updated_at, $2)
WHERE user_id = $1 AND deleted_at IS NULL",
	)
	.bind(user_id)
	.bind(deleted_at)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"\
UPDATE categories
SET deleted_at = $2, updated_at = GREATEST(updated_at, $2)
WHERE user_id = $1 AND deleted_at IS NULL",
	)
	.bind(user_id)
	.bind(deleted_at)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

pub(crate) async fn is_admin(db: &Db, user_id: &str) -> Result<bool> {
	let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM admins WHERE user_id = $1)")
		.bind(user_id)
		.fetch_one(&db.pool)
		.await?;

	Ok(found)
}

pub(crate) async fn replace_admins(db: &Db, user_ids: &[String]) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query("DELETE FROM admins").execute(&mut *tx).await?;
	sqlx::query(
		"\
INSERT INTO admins (user_id)
SELECT DISTINCT user_id
FROM UNNEST($1::text[]) AS input(user_id)
ON CONFLICT (user_id) DO NOTHING",
	)
	.bind(user_ids)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

// State and quick-phrase writes read before they write; serialize them per user.
async fn lock_user(conn: &mut PgConnection, user_id: &str) -> Result<()> {
	sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
		.bind(user_id)
		.execute(&mut *conn)
		.await?;

	Ok(())
}

async fn read_state(conn: &mut PgConnection, user_id: &str) -> Result<Option<UserState>> {
	let row: Option<UserRow> =
		sqlx::query_as("SELECT inited, preferences, updated_at FROM users WHERE user_id = $1")
			.bind(user_id)
			.fetch_optional(&mut *conn)
			.await?;
	let slots = read_slots(conn, user_id).await?;

	if row.is_none() && slots.is_none() {
		return Ok(None);
	}

	let (slots_updated_at, slots) = slots.unwrap_or_else(|| (0, quickes::defaults()));
	let mut state = UserState { quickes: slots, updated_at: slots_updated_at, ..Default::default() };

	if let Some(row) = row {
		state.inited = row.inited;
		state.preferences = row.preferences();
		state.updated_at = state.updated_at.max(row.updated_at);
	}

	Ok(Some(state))
}

/// Normalized slots with their newest timestamp, or `None` when the user has no slots.
async fn read_slots(conn: &mut PgConnection, user_id: &str) -> Result<Option<(i64, Vec<String>)>> {
	let rows: Vec<(i32, String, i64)> = sqlx::query_as(
		"SELECT slot, text, updated_at FROM quickes WHERE user_id = $1 ORDER BY slot",
	)
	.bind(user_id)
	.fetch_all(&mut *conn)
	.await?;

	if rows.is_empty() {
		return Ok(None);
	}

	let mut slots = vec![String::new(); quickes::DEFAULT_QUICKES.len()];
	let mut updated_at = 0;

	for (slot, text, slot_updated_at) in rows {
		if let Some(target) = usize::try_from(slot).ok().and_then(|idx| slots.get_mut(idx)) {
			*target = text;
		}

		updated_at = updated_at.max(slot_updated_at);
	}

	Ok(Some((updated_at, quickes::normalize(&slots))))
}

async fn write_slots(
	conn: &mut PgConnection,
	user_id: &str,
	slots: &[String],
	updated_at: i64,
) -> Result<()> {
	let indexes = (0..slots.len() as i32).collect::<Vec<_>>();

	sqlx::query("DELETE FROM quickes WHERE user_id = $1")
		.bind(user_id)
		.execute(&mut *conn)
		.await?;
	sqlx::query(
		"\
INSERT INTO quickes (user_id, slot, text, updated_at)
SELECT $1, input.slot, input.text, $4
FROM UNNEST($2::int4[], $3::text[]) AS input(slot, text)",
	)
	.bind(user_id)
	.bind(indexes)
	.bind(slots)
	.bind(updated_at)
	.execute(&mut *conn)
	.await?;

	Ok(())
}
