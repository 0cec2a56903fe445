//! Conversions between legacy tree nodes and domain entities.
//!
//! Reads are lenient: a missing id falls back to the node key, a missing `created` to the
//! caller's clock. A missing `updatedAt` falls back to the stored `created`, or to `0` when that
//! is missing too, so a repaired node never reads as newer than its last copy. Nodes that are
//! not objects are skipped.

use serde_json::{Map, Value, json};

use cutover_domain::{Category, GlobalCategory, Statement, Template, UserState, quickes};

use crate::paths;

const ID: &str = "id";
const LABEL: &str = "label";
const CREATED: &str = "created";
const DEFAULT: &str = "default";
const AI_USE: &str = "aiUse";
const CATEGORY_ID: &str = "categoryId";
const TEXT: &str = "text";
const UPDATED_AT: &str = "updatedAt";

pub fn category_from(key: &str, node: &Value, now: i64) -> Option<Category> {
	let node = node.as_object()?;
	let created = int_field(node, CREATED);

	Some(Category {
		id: str_field(node, ID).unwrap_or(key).to_string(),
		label: str_field(node, LABEL).unwrap_or_default().to_string(),
		created: created.unwrap_or(now),
		default: node.get(DEFAULT).and_then(Value::as_bool),
		ai_use: node.get(AI_USE).and_then(Value::as_bool).unwrap_or(false),
		updated_at: int_field(node, UPDATED_AT).or(created).unwrap_or(0),
	})
}

pub fn statement_from(key: &str, category_id: &str, node: &Value, now: i64) -> Option<Statement> {
	let node = node.as_object()?;
	let created = int_field(node, CREATED);

	Some(Statement {
		id: str_field(node, ID).unwrap_or(key).to_string(),
		category_id: str_field(node, CATEGORY_ID).unwrap_or(category_id).to_string(),
		text: str_field(node, TEXT).unwrap_or_default().to_string(),
		created: created.unwrap_or(now),
		updated_at: int_field(node, UPDATED_AT).or(created).unwrap_or(0),
	})
}

/// Statements nested under a category node's `statements` map.
pub fn nested_statements(category_id: &str, node: &Value, now: i64) -> Vec<Statement> {
	statements_from_map(category_id, node.get(paths::STATEMENTS).unwrap_or(&Value::Null), now)
}

/// Statements of a `statements` map keyed by statement id.
pub fn statements_from_map(category_id: &str, node: &Value, now: i64) -> Vec<Statement> {
	let Some(map) = node.as_object() else {
		return Vec::new();
	};

	map.iter().filter_map(|(key, node)| statement_from(key, category_id, node, now)).collect()
}

pub fn global_category_from(key: &str, node: &Value, now: i64) -> Option<GlobalCategory> {
	let category = category_from(key, node, now)?;
	let statements = nested_statements(&category.id, node, now);

	Some(GlobalCategory {
		id: category.id,
		label: category.label,
		created: category.created,
		default: category.default,
		updated_at: category.updated_at,
		statements,
	})
}

/// State stored on a user node. `None` when the node carries neither `inited` nor quick phrases.
pub fn user_state_from(node: &Value) -> Option<UserState> {
	let node = node.as_object()?;
	let inited = node.get(paths::INITED).and_then(Value::as_bool);
	let slots = node.get(paths::QUICKES).map(quickes::from_json);

	if inited.is_none() && slots.is_none() {
		return None;
	}

	Some(UserState {
		inited: inited.unwrap_or(false),
		quickes: quickes::normalize(&slots.unwrap_or_default()),
		preferences: node.get(paths::PREFERENCES).and_then(Value::as_object).cloned().unwrap_or_default(),
		updated_at: int_field(node, paths::STATE_UPDATED_AT).unwrap_or(0),
	})
}

/// Onboarding templates, stored either as an array or as a map keyed by template id.
pub fn templates_from(node: &Value) -> Vec<Template> {
	let mut templates = match node {
		Value::Array(items) => items
			.iter()
			.enumerate()
			.filter_map(|(idx, item)| template_from(&idx.to_string(), idx as i64, item))
			.collect::<Vec<_>>(),
		Value::Object(map) => map
			.iter()
			.enumerate()
			.filter_map(|(idx, (key, item))| template_from(key, idx as i64, item))
			.collect(),
		_ => Vec::new(),
	};

	templates.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));

	templates
}

/// Keys of an object node. Used for maps whose values are flags, such as `admins`.
pub fn keys_of(node: &Value) -> Vec<String> {
	let mut keys = node
		.as_object()
		.map(|map| {
			map.iter()
				.filter(|(_, value)| !matches!(value, Value::Null | Value::Bool(false)))
				.map(|(key, _)| key.clone())
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	keys.sort();

	keys
}

pub fn category_node(category: &Category) -> Value {
	let mut node = json!({
		ID: category.id,
		LABEL: category.label,
		CREATED: category.created,
		AI_USE: category.ai_use,
		UPDATED_AT: category.updated_at,
	});

	if let (Some(default), Some(map)) = (category.default, node.as_object_mut()) {
		map.insert(DEFAULT.to_string(), Value::Bool(default));
	}

	node
}

pub fn statement_node(statement: &Statement) -> Value {
	json!({
		ID: statement.id,
		CATEGORY_ID: statement.category_id,
		TEXT: statement.text,
		CREATED: statement.created,
		UPDATED_AT: statement.updated_at,
	})
}

/// A category node with its statements nested the way the legacy clients expect.
pub fn category_tree(category: &Category, statements: &[Statement]) -> Value {
	let mut node = category_node(category);
	let nested = statements
		.iter()
		.map(|statement| (statement.id.clone(), statement_node(statement)))
		.collect::<Map<_, _>>();

	if let Some(map) = node.as_object_mut()
		&& !nested.is_empty()
	{
		map.insert(paths::STATEMENTS.to_string(), Value::Object(nested));
	}

	node
}

fn template_from(key: &str, position: i64, node: &Value) -> Option<Template> {
	let node = node.as_object()?;
	let id = str_field(node, "uid").or_else(|| str_field(node, ID)).unwrap_or(key);
	let order_index = int_field(node, "order_index")
		.filter(|idx| *idx != 0)
		.or_else(|| int_field(node, "orderIndex"))
		.unwrap_or(position);
	let phrases = node
		.get("phrases")
		.and_then(Value::as_array)
		.map(|items| items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect())
		.unwrap_or_default();

	Some(Template {
		id: id.to_string(),
		label: str_field(node, LABEL).unwrap_or_default().to_string(),
		phrases,
		category: str_field(node, "category").unwrap_or_default().to_string(),
		kind: str_field(node, "type").unwrap_or_default().to_string(),
		order_index,
	})
}

fn str_field<'a>(node: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
	node.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}

// The tree stores numbers as JSON doubles; accept both representations.
fn int_field(node: &Map<String, Value>, key: &str) -> Option<i64> {
	let value = node.get(key)?;

	value.as_i64().or_else(|| value.as_f64().map(|number| number as i64)).filter(|number| *number != 0)
}
