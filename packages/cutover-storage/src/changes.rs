use cutover_domain::{ChangeEvent, NewChange};

use crate::{
	Result, cursor,
	db::Db,
	models::{ChangePage, ChangeRow},
};

pub(crate) async fn append(db: &Db, user_id: &str, change: &NewChange) -> Result<ChangeEvent> {
	let mut tx = db.pool.begin().await?;
	// The head row stays locked until commit, so sequence order is also commit order.
	let seq: i64 = sqlx::query_scalar(
		"\
INSERT INTO change_heads (user_id, last_seq)
VALUES ($1, 1)
ON CONFLICT (user_id) DO UPDATE
SET last_seq = change_heads.last_seq + 1
RETURNING last_seq",
	)
	.bind(user_id)
	.fetch_one(&mut *tx)
	.await?;

	sqlx::query(
		"\
INSERT INTO changes (user_id, seq, entity_type, entity_id, op, payload, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(user_id)
	.bind(seq)
	.bind(change.entity_type.as_str())
	.bind(change.entity_id.as_str())
	.bind(change.op.as_str())
	.bind(&change.payload)
	.bind(change.updated_at)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(ChangeEvent::from_new(cursor::format(seq), change.clone()))
}

pub(crate) async fn list(db: &Db, user_id: &str, after: &str, limit: u32) -> Result<ChangePage> {
	let after_seq = cursor::parse(after)?;
	let rows: Vec<ChangeRow> = sqlx::query_as(
		"\
SELECT seq, entity_type, entity_id, op, payload, updated_at
FROM changes
WHERE user_id = $1 AND seq > $2
ORDER BY seq
LIMIT $3",
	)
	.bind(user_id)
	.bind(after_seq)
	.bind(i64::from(limit.max(1)))
	.fetch_all(&db.pool)
	.await?;
	let next_cursor = match rows.last() {
		Some(row) => cursor::format(row.seq),
		None => after.to_string(),
	};
	let changes = rows.into_iter().filter_map(ChangeRow::into_event).collect();

	Ok(ChangePage { next_cursor, changes })
}
