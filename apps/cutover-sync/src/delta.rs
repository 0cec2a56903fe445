//! Interpretation of legacy stream events as canonical mutations.
//!
//! Stream paths are relative to the subscription root. Joined with the root they address the
//! legacy layout, `users/{uid}/Category/{cid}/statements/{sid}`; anything outside `users` is
//! ignored. Whole nodes are applied from the event payload. A change to a single field of a
//! node re-reads that node from the legacy store instead.

use std::collections::HashSet;

use serde_json::Value;

use cutover_domain::{Category, Statement, clock};
use cutover_legacy::{StreamEvent, paths, shape};

use crate::{Reconciler, Result};

const UPDATED_AT: &str = "updatedAt";
const STATE_FIELDS: [&str; 4] =
	[paths::INITED, paths::QUICKES, paths::PREFERENCES, paths::STATE_UPDATED_AT];

/// One structural change under `users`. `Value::Null` data means the node was removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
	User { user_id: String, data: Value },
	Categories { user_id: String, data: Value },
	Category { user_id: String, category_id: String, data: Value },
	Statements { user_id: String, category_id: String, data: Value },
	Statement { user_id: String, category_id: String, statement_id: String, data: Value },
	CategoryField { user_id: String, category_id: String, stamp: Option<i64> },
	StatementField {
		user_id: String,
		category_id: String,
		statement_id: String,
		stamp: Option<i64>,
	},
	StateField { user_id: String, stamp: Option<i64> },
}

/// Deltas carried by one stream event, in order.
///
/// A `put` is one delta. A `patch` is one delta per child key; field changes that re-read the
/// same node collapse into one. The initial snapshot, a `put` at the subscription root, yields
/// nothing.
pub fn deltas(root: &str, event: &StreamEvent) -> Vec<Delta> {
	let mut deltas = match event {
		StreamEvent::Put { path, data } => match user_segments(root, path) {
			Some(segments) if !segments.is_empty() => {
				match_path(&segments, data.clone(), None).into_iter().collect()
			},
			_ => Vec::new(),
		},
		StreamEvent::Patch { path, data } => {
			let (Some(segments), Some(children)) = (user_segments(root, path), data.as_object())
			else {
				return Vec::new();
			};
			let stamp = patch_stamp(data);

			children
				.iter()
				.filter_map(|(key, value)| {
					let mut child = segments.clone();

					child.extend(key.split('/').filter(|s| !s.is_empty()).map(str::to_string));

					match_path(&child, value.clone(), stamp)
				})
				.collect()
		},
		StreamEvent::Snapshot { .. } | StreamEvent::KeepAlive => Vec::new(),
	};

	deltas.dedup();

	deltas
}

/// Segments below `users`, or `None` when the path lies outside it.
fn user_segments(root: &str, path: &str) -> Option<Vec<String>> {
	let mut segments = root
		.split('/')
		.chain(path.split('/'))
		.filter(|segment| !segment.is_empty())
		.map(str::to_string)
		.collect::<Vec<_>>();

	if segments.first().map(String::as_str) != Some(paths::USERS) {
		return None;
	}

	segments.remove(0);

	Some(segments)
}

fn match_path(segments: &[String], data: Value, stamp: Option<i64>) -> Option<Delta> {
	let segments = segments.iter().map(String::as_str).collect::<Vec<_>>();
	let data_ms = as_millis(&data);
	// A field that is the node's own timestamp stamps the re-read with its value.
	let own = |field: &str, key: &str| if field == key { data_ms } else { stamp };

	Some(match segments.as_slice() {
		[uid] => Delta::User { user_id: uid.to_string(), data },
		[uid, paths::CATEGORY] => Delta::Categories { user_id: uid.to_string(), data },
		[uid, paths::CATEGORY, cid] => {
			Delta::Category { user_id: uid.to_string(), category_id: cid.to_string(), data }
		},
		[uid, paths::CATEGORY, cid, paths::STATEMENTS] => {
			Delta::Statements { user_id: uid.to_string(), category_id: cid.to_string(), data }
		},
		[uid, paths::CATEGORY, cid, paths::STATEMENTS, sid] => Delta::Statement {
			user_id: uid.to_string(),
			category_id: cid.to_string(),
			statement_id: sid.to_string(),
			data,
		},
		[uid, paths::CATEGORY, cid, paths::STATEMENTS, sid, field, rest @ ..] => {
			Delta::StatementField {
				user_id: uid.to_string(),
				category_id: cid.to_string(),
				statement_id: sid.to_string(),
				stamp: if rest.is_empty() { own(*field, UPDATED_AT) } else { stamp },
			}
		},
		[uid, paths::CATEGORY, cid, field, rest @ ..] => Delta::CategoryField {
			user_id: uid.to_string(),
			category_id: cid.to_string(),
			stamp: if rest.is_empty() { own(*field, UPDATED_AT) } else { stamp },
		},
		[uid, field, rest @ ..] if STATE_FIELDS.contains(field) => Delta::StateField {
			user_id: uid.to_string(),
			stamp: if rest.is_empty() { own(*field, paths::STATE_UPDATED_AT) } else { stamp },
		},
		_ => return None,
	})
}

fn patch_stamp(data: &Value) -> Option<i64> {
	data.get(UPDATED_AT).or_else(|| data.get(paths::STATE_UPDATED_AT)).and_then(as_millis)
}

fn node_stamp(node: &Value) -> Option<i64> {
	node.get(UPDATED_AT).and_then(as_millis)
}

// The tree stores numbers as JSON doubles.
fn as_millis(value: &Value) -> Option<i64> {
	value.as_i64().or_else(|| value.as_f64().map(|number| number as i64)).filter(|ms| *ms > 0)
}

fn category_at(category_id: &str, node: &Value, now: i64) -> Option<Category> {
	let mut category = shape::category_from(category_id, node, now)?;

	category.id = category_id.to_string();
	category.updated_at = node_stamp(node).unwrap_or(now);

	Some(category)
}

fn statement_at(
	category_id: &str,
	statement_id: &str,
	node: &Value,
	now: i64,
) -> Option<Statement> {
	let mut statement = shape::statement_from(statement_id, category_id, node, now)?;

	statement.id = statement_id.to_string();
	statement.category_id = category_id.to_string();
	statement.updated_at = node_stamp(node).unwrap_or(now);

	Some(statement)
}

impl Reconciler {
	/// Applies every delta of a stream event. Returns the number of change events appended.
	pub async fn apply_event(&self, root: &str, event: &StreamEvent) -> Result<usize> {
		let mut events = 0;

		for delta in deltas(root, event) {
			events += self.apply_delta(&delta).await?;
		}

		Ok(events)
	}

	pub async fn apply_delta(&self, delta: &Delta) -> Result<usize> {
		let now = clock::now_ms();

		match delta {
			Delta::User { user_id, data } if data.is_null() => self.remove_user(user_id, now).await,
			Delta::User { user_id, data } => {
				let categories = data.get(paths::CATEGORY).cloned().unwrap_or(Value::Null);
				let mut events = self.replace_categories(user_id, &categories, now).await?;

				if let Some(mut state) = shape::user_state_from(data) {
					if state.updated_at == 0 {
						state.updated_at = now;
					}

					events += self.apply_state(user_id, &state).await?;
				}

				Ok(events)
			},
			Delta::Categories { user_id, data } => {
				self.replace_categories(user_id, data, now).await
			},
			Delta::Category { user_id, category_id, data } if data.is_null() => {
				self.remove_category(user_id, category_id, now).await
			},
			Delta::Category { user_id, category_id, data } => {
				self.put_category(user_id, category_id, data, now).await
			},
			Delta::Statements { user_id, category_id, data } => {
				self.replace_statements(user_id, category_id, data, now).await
			},
			Delta::Statement { user_id, statement_id, data, .. } if data.is_null() => {
				self.remove_statement(user_id, statement_id, now).await
			},
			Delta::Statement { user_id, category_id, statement_id, data } => {
				match statement_at(category_id, statement_id, data, now) {
					Some(statement) => self.apply_statement(user_id, &statement).await,
					None => Ok(0),
				}
			},
			Delta::CategoryField { user_id, category_id, stamp } => {
				let data = self.reader.fetch_user_data(user_id).await?;
				let Some(mut category) =
					data.categories.into_iter().find(|category| &category.id == category_id)
				else {
					return Ok(0);
				};

				category.updated_at = stamp.unwrap_or(now);

				self.apply_category(user_id, &category).await
			},
			Delta::StatementField { user_id, statement_id, stamp, .. } => {
				let data = self.reader.fetch_user_data(user_id).await?;
				let Some(mut statement) =
					data.statements.into_iter().find(|statement| &statement.id == statement_id)
				else {
					return Ok(0);
				};

				statement.updated_at = stamp.unwrap_or(now);

				self.apply_statement(user_id, &statement).await
			},
			Delta::StateField { user_id, stamp } => {
				let Some(mut state) = self.reader.get_user_state(user_id).await? else {
					return Ok(0);
				};

				state.updated_at = stamp.unwrap_or(now);

				self.apply_state(user_id, &state).await
			},
		}
	}

	/// The category map was replaced: apply every category and remove the ones it no longer
	/// holds.
	async fn replace_categories(&self, user_id: &str, node: &Value, now: i64) -> Result<usize> {
		let mut events = 0;
		let mut present = HashSet::new();

		if let Some(map) = node.as_object() {
			for (category_id, node) in map {
				if node.is_object() {
					events += self.put_category(user_id, category_id, node, now).await?;

					present.insert(category_id.clone());
				}
			}
		}

		for category in self.store.list_categories(user_id).await? {
			if !present.contains(&category.id) {
				events += self.remove_category(user_id, &category.id, now).await?;
			}
		}

		Ok(events)
	}

	/// The category node was replaced, nested statements included.
	async fn put_category(
		&self,
		user_id: &str,
		category_id: &str,
		node: &Value,
		now: i64,
	) -> Result<usize> {
		let Some(category) = category_at(category_id, node, now) else {
			return Ok(0);
		};
		let mut events = self.apply_category(user_id, &category).await?;

		events += self
			.replace_statements(
				user_id,
				category_id,
				node.get(paths::STATEMENTS).unwrap_or(&Value::Null),
				now,
			)
			.await?;

		Ok(events)
	}

	async fn replace_statements(
		&self,
		user_id: &str,
		category_id: &str,
		node: &Value,
		now: i64,
	) -> Result<usize> {
		let mut events = 0;
		let mut present = HashSet::new();

		if let Some(map) = node.as_object() {
			for (statement_id, node) in map {
				if let Some(statement) = statement_at(category_id, statement_id, node, now) {
					events += self.apply_statement(user_id, &statement).await?;

					present.insert(statement.id);
				}
			}
		}

		for statement in self.store.list_statements(user_id, category_id).await? {
			if !present.contains(&statement.id) {
				events += self.remove_statement(user_id, &statement.id, now).await?;
			}
		}

		Ok(events)
	}
}
