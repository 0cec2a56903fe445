use std::sync::Arc;

use serde_json::json;

use cutover_domain::{Category, Statement, UserState, quickes};
use cutover_legacy::{LegacyReader, LegacyWriter, TreeReader, TreeWriter};
use cutover_testkit::MemoryTree;

fn adapters(root: serde_json::Value) -> (Arc<MemoryTree>, TreeReader, TreeWriter) {
	let tree = Arc::new(MemoryTree::with_root(root));

	(tree.clone(), TreeReader::new(tree.clone()), TreeWriter::new(tree))
}

fn category(id: &str, updated_at: i64) -> Category {
	Category {
		id: id.to_string(),
		label: "Food".to_string(),
		created: 1_000,
		default: None,
		ai_use: true,
		updated_at,
	}
}

fn statement(id: &str, category_id: &str, created: i64) -> Statement {
	Statement {
		id: id.to_string(),
		category_id: category_id.to_string(),
		text: format!("text {id}"),
		created,
		updated_at: created,
	}
}

#[tokio::test]
async fn written_entities_read_back_unchanged() {
	let (_, reader, writer) = adapters(json!({}));
	let cat = category("c1", 2_000);
	let first = statement("s1", "c1", 1_100);
	let second = statement("s2", "c1", 1_200);

	writer.upsert_category("u1", &cat).await.expect("Write.");
	writer.upsert_statement("u1", &second).await.expect("Write.");
	writer.upsert_statement("u1", &first).await.expect("Write.");

	let data = reader.fetch_user_data("u1").await.expect("Read.");

	assert_eq!(data.categories, vec![cat]);
	assert_eq!(data.statements, vec![first, second]);
}

#[tokio::test]
async fn category_update_keeps_nested_statements() {
	let (tree, _, writer) = adapters(json!({}));
	let mut cat = category("c1", 2_000);

	cat.default = Some(true);

	writer.upsert_category("u1", &cat).await.expect("Write.");
	writer.upsert_statement("u1", &statement("s1", "c1", 1_100)).await.expect("Write.");

	cat.default = None;
	cat.label = "Meals".to_string();

	writer.upsert_category("u1", &cat).await.expect("Write.");

	let node = tree.peek("users/u1/Category/c1");

	assert_eq!(node["label"], "Meals");
	assert!(node.get("default").is_none());
	assert!(node["statements"]["s1"].is_object());
}

#[tokio::test]
async fn deleting_a_category_removes_its_subtree() {
	let (tree, reader, writer) = adapters(json!({
		"users": { "u1": { "inited": true, "Category": { "c1": {
			"label": "Food",
			"created": 1000,
			"statements": { "s1": { "text": "Bread", "created": 1000 } }
		} } } }
	}));

	writer.delete_category("u1", "c1").await.expect("Delete.");

	assert!(reader.fetch_user_data("u1").await.expect("Read.").is_empty());
	assert_eq!(tree.peek("users/u1/inited"), json!(true));
}

#[tokio::test]
async fn user_state_mirrors_timestamp() {
	let (tree, reader, writer) = adapters(json!({}));
	let state = UserState {
		inited: true,
		quickes: quickes::defaults(),
		preferences: serde_json::Map::new(),
		updated_at: 3_000,
	};

	writer.set_user_state("u1", &state).await.expect("Write.");

	assert_eq!(reader.get_user_state("u1").await.expect("Read."), Some(state));

	writer.set_quickes("u1", &["One".to_string()], 4_000).await.expect("Write.");

	let read = reader.get_user_state("u1").await.expect("Read.").expect("State exists.");

	assert_eq!(read.quickes[0], "One");
	assert_eq!(read.quickes.len(), quickes::DEFAULT_QUICKES.len());
	assert_eq!(read.updated_at, 4_000);
	assert_eq!(tree.peek("users/u1/stateUpdatedAt"), json!(4_000));
}

#[tokio::test]
async fn import_writes_one_subtree() {
	let (_, reader, writer) = adapters(json!({}));
	let cat = category("g1", 5_000);
	let statements = vec![statement("gs1", "g1", 1_000), statement("gs2", "g1", 1_001)];

	writer.import_global_category("u1", &cat, &statements).await.expect("Import.");

	let data = reader.fetch_user_data("u1").await.expect("Read.");

	assert_eq!(data.categories.len(), 1);
	assert_eq!(data.statements, statements);
}

#[tokio::test]
async fn catalog_admins_and_users_are_listed() {
	let (_, reader, writer) = adapters(json!({
		"admins": { "a1": true, "a2": false },
		"global": { "Category": { "g1": {
			"label": "Greetings",
			"created": 1000,
			"statements": { "gs1": { "text": "Hello", "created": 1000 } }
		} } },
		"factory": { "questions": [ { "label": "Q", "phrases": ["a", "b"] } ] },
		"users": { "u2": { "inited": true }, "u1": { "inited": false } }
	}));

	assert_eq!(reader.list_admins().await.expect("Read."), vec!["a1"]);
	assert!(reader.is_admin("a1").await.expect("Read."));
	assert!(!reader.is_admin("a2").await.expect("Read."));
	assert_eq!(reader.list_user_ids().await.expect("Read."), vec!["u1", "u2"]);

	let catalog = reader.list_global_categories().await.expect("Read.");

	assert_eq!(catalog.len(), 1);
	assert_eq!(catalog[0].statements.len(), 1);
	assert_eq!(catalog[0].statements[0].category_id, "g1");

	let templates = reader.list_templates().await.expect("Read.");

	assert_eq!(templates[0].phrases, vec!["a", "b"]);

	writer.delete_user_data("u1").await.expect("Delete.");

	assert_eq!(reader.list_user_ids().await.expect("Read."), vec!["u2"]);
}

#[tokio::test]
async fn invalid_ids_are_rejected_before_any_write() {
	let (tree, _, writer) = adapters(json!({}));

	assert!(writer.upsert_category("u/1", &category("c1", 1_000)).await.is_err());
	assert_eq!(tree.snapshot(), json!({}));
}
