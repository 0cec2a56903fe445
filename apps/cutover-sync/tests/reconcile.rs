use std::sync::Arc;

use serde_json::{Value, json};

use cutover_domain::{ChangeOp, EntityType};
use cutover_legacy::{StreamEvent, TreeReader};
use cutover_storage::{CanonicalStore, cursor};
use cutover_sync::Reconciler;
use cutover_testkit::{MemoryStore, MemoryTree};

fn reconciler(root: Value) -> (Arc<MemoryStore>, Arc<MemoryTree>, Reconciler) {
	let store = Arc::new(MemoryStore::new());
	let tree = Arc::new(MemoryTree::with_root(root));
	let reconciler = Reconciler::new(store.clone(), Arc::new(TreeReader::new(tree.clone())));

	(store, tree, reconciler)
}

fn put(path: &str, data: Value) -> StreamEvent {
	StreamEvent::Put { path: path.to_string(), data }
}

fn legacy_tree() -> Value {
	json!({
		"admins": { "a1": true, "a2": false },
		"factory": { "questions": [
			{ "uid": "t1", "label": "Name?", "phrases": ["Ann"], "category": "me", "type": "text" }
		]},
		"global": { "Category": {
			"g1": { "id": "g1", "label": "Greetings", "created": 500, "updatedAt": 500,
				"statements": { "gs1": { "text": "Hello", "created": 600, "updatedAt": 600 } } },
			"g2": { "id": "g2", "label": "Farewells", "created": 700, "updatedAt": 700 }
		}},
		"users": {
			"u1": {
				"inited": true,
				"quickes": ["Yes"],
				"stateUpdatedAt": 900,
				"Category": { "c1": {
					"id": "c1", "label": "Food", "created": 1000, "updatedAt": 1000,
					"statements": {
						"s1": { "id": "s1", "categoryId": "c1", "text": "Water", "created": 1100, "updatedAt": 1100 },
						"s2": { "id": "s2", "categoryId": "c1", "text": "Bread", "created": 1200, "updatedAt": 1200 }
					}
				}}
			},
			"u2": { "inited": false }
		}
	})
}

async fn events(store: &MemoryStore, user_id: &str) -> Vec<(EntityType, String, ChangeOp)> {
	store
		.list_changes(user_id, cursor::START, 100)
		.await
		.expect("Changes.")
		.changes
		.into_iter()
		.map(|event| (event.entity_type, event.entity_id, event.op))
		.collect()
}

#[tokio::test]
async fn stream_category_put_creates_one_category_and_one_event() {
	let (store, _, reconciler) = reconciler(json!({}));
	let applied = reconciler
		.apply_event(
			"users",
			&put("/u1/Category/c1", json!({ "id": "c1", "label": "Groceries", "created": 1000 })),
		)
		.await
		.expect("Apply.");
	let categories = store.list_categories("u1").await.expect("Read.");

	assert_eq!(applied, 1);
	assert_eq!(categories.len(), 1);
	assert_eq!(categories[0].label, "Groceries");
	assert_eq!(
		events(&store, "u1").await,
		vec![(EntityType::Category, "c1".to_string(), ChangeOp::Upsert)]
	);
}

#[tokio::test]
async fn tree_root_subscription_strips_users_segment() {
	let (store, _, reconciler) = reconciler(json!({}));

	reconciler
		.apply_event(
			"",
			&put("/users/u1/Category/c1", json!({ "label": "Groceries", "created": 1000 })),
		)
		.await
		.expect("Apply.");

	assert_eq!(store.list_categories("u1").await.expect("Read.")[0].id, "c1");
}

#[tokio::test]
async fn initial_root_put_is_ignored() {
	let (store, _, reconciler) = reconciler(json!({}));
	let applied = reconciler
		.apply_event("users", &put("/", legacy_tree()["users"].clone()))
		.await
		.expect("Apply.");

	assert_eq!(applied, 0);
	assert!(store.list_categories("u1").await.expect("Read.").is_empty());
}

#[tokio::test]
async fn stream_category_delete_cascades_events() {
	let (store, _, reconciler) = reconciler(json!({}));
	let node = legacy_tree()["users"]["u1"]["Category"]["c1"].clone();

	reconciler.apply_event("users", &put("/u1/Category/c1", node)).await.expect("Apply.");

	let before = store.list_changes("u1", cursor::START, 100).await.expect("Changes.");

	assert_eq!(before.changes.len(), 3);

	let applied =
		reconciler.apply_event("users", &put("/u1/Category/c1", Value::Null)).await.expect("Apply.");
	let after = store.list_changes("u1", &before.next_cursor, 100).await.expect("Changes.");
	let deletes = after
		.changes
		.iter()
		.map(|event| (event.entity_type, event.entity_id.as_str(), event.op))
		.collect::<Vec<_>>();

	assert_eq!(applied, 3);
	assert_eq!(
		deletes,
		vec![
			(EntityType::Category, "c1", ChangeOp::Delete),
			(EntityType::Statement, "s1", ChangeOp::Delete),
			(EntityType::Statement, "s2", ChangeOp::Delete),
		]
	);
	assert!(store.list_statements("u1", "c1").await.expect("Read.").is_empty());
}

#[tokio::test]
async fn replayed_and_stale_deltas_append_nothing() {
	let (store, _, reconciler) = reconciler(json!({}));
	let node = json!({ "label": "Food", "created": 1000, "updatedAt": 2000 });

	assert_eq!(
		reconciler.apply_event("users", &put("/u1/Category/c1", node.clone())).await.expect("Apply."),
		1
	);
	assert_eq!(
		reconciler.apply_event("users", &put("/u1/Category/c1", node)).await.expect("Apply."),
		0
	);

	let stale = json!({ "label": "Old", "created": 1000, "updatedAt": 1500 });

	assert_eq!(
		reconciler.apply_event("users", &put("/u1/Category/c1", stale)).await.expect("Apply."),
		0
	);
	assert_eq!(store.list_categories("u1").await.expect("Read.")[0].label, "Food");
}

#[tokio::test]
async fn field_patch_rereads_the_node_once() {
	let (store, tree, reconciler) = reconciler(legacy_tree());

	reconciler.sync_user("u1").await.expect("Sync.");

	let seeded = store.append_count();
	let mut root = tree.snapshot();

	root["users"]["u1"]["Category"]["c1"]["label"] = json!("Meals");

	let tree = Arc::new(MemoryTree::with_root(root));
	let reconciler = Reconciler::new(store.clone(), Arc::new(TreeReader::new(tree)));
	let patch = StreamEvent::Patch {
		path: "/u1/Category/c1".to_string(),
		data: json!({ "label": "Meals", "aiUse": false }),
	};
	let applied = reconciler.apply_event("users", &patch).await.expect("Apply.");

	assert_eq!(applied, 1);
	assert_eq!(store.append_count(), seeded + 1);
	assert_eq!(store.list_categories("u1").await.expect("Read.")[0].label, "Meals");
}

#[tokio::test]
async fn echoed_mirror_patch_is_unchanged() {
	let (store, _, reconciler) = reconciler(legacy_tree());

	reconciler.sync_user("u1").await.expect("Sync.");

	let seeded = store.append_count();
	let patch = StreamEvent::Patch {
		path: "/u1/Category/c1".to_string(),
		data: json!({ "id": "c1", "label": "Food", "created": 1000, "aiUse": false, "updatedAt": 1000 }),
	};

	assert_eq!(reconciler.apply_event("users", &patch).await.expect("Apply."), 0);
	assert_eq!(store.append_count(), seeded);
}

#[tokio::test]
async fn statements_patch_applies_each_child() {
	let (store, _, reconciler) = reconciler(json!({}));

	reconciler
		.apply_event("users", &put("/u1/Category/c1", json!({ "label": "Food", "created": 1000 })))
		.await
		.expect("Apply.");

	let patch = StreamEvent::Patch {
		path: "/u1/Category/c1/statements".to_string(),
		data: json!({
			"s1": { "text": "Water", "created": 1100 },
			"s2": { "text": "Bread", "created": 1200 }
		}),
	};

	assert_eq!(reconciler.apply_event("users", &patch).await.expect("Apply."), 2);
	assert_eq!(store.list_statements("u1", "c1").await.expect("Read.").len(), 2);
}

#[tokio::test]
async fn state_field_put_updates_state() {
	let (store, _, reconciler) = reconciler(legacy_tree());

	reconciler.sync_user("u1").await.expect("Sync.");

	let applied =
		reconciler.apply_event("users", &put("/u1/inited", json!(false))).await.expect("Apply.");

	// The reader still sees `inited: true`; only the stamp moved forward.
	assert_eq!(applied, 1);

	let state = store.get_user_state("u1").await.expect("Read.").expect("State.");

	assert!(state.updated_at > 900);
}

#[tokio::test]
async fn user_removal_erases_canonical_data() {
	let (store, _, reconciler) = reconciler(legacy_tree());

	reconciler.sync_user("u1").await.expect("Sync.");
	reconciler.apply_event("users", &put("/u1", Value::Null)).await.expect("Apply.");

	assert!(store.list_categories("u1").await.expect("Read.").is_empty());
	assert_eq!(
		events(&store, "u1").await,
		vec![(EntityType::User, "u1".to_string(), ChangeOp::Delete)]
	);
}

#[tokio::test]
async fn poll_pass_converges_and_is_idempotent() {
	let (store, tree, reconciler) = reconciler(legacy_tree());
	let report = reconciler.poll_once().await.expect("Poll.");

	assert_eq!(report.users, 2);
	assert_eq!(report.failed_users, 0);
	assert_eq!(report.global_categories, 2);
	// u1: one category, two statements, one state. u2: one state.
	assert_eq!(report.events, 5);
	assert!(store.is_admin("a1").await.expect("Read."));
	assert!(!store.is_admin("a2").await.expect("Read."));
	assert_eq!(store.list_templates().await.expect("Read.")[0].id, "t1");
	assert_eq!(store.list_global_statements("g1").await.expect("Read.")[0].text, "Hello");

	let again = reconciler.poll_once().await.expect("Poll.");

	assert_eq!(again.events, 0);

	let mut root = tree.snapshot();

	if let Some(catalog) = root["global"]["Category"].as_object_mut() {
		catalog.remove("g2");
	}

	let tree = Arc::new(MemoryTree::with_root(root));
	let reconciler = Reconciler::new(store.clone(), Arc::new(TreeReader::new(tree)));

	reconciler.poll_once().await.expect("Poll.");

	let ids = store
		.list_global_categories(false)
		.await
		.expect("Read.")
		.into_iter()
		.map(|category| category.id)
		.collect::<Vec<_>>();

	assert_eq!(ids, vec!["g1".to_string()]);
}

#[tokio::test]
async fn poll_never_regresses_newer_canonical_writes() {
	let (store, _, reconciler) = reconciler(legacy_tree());

	reconciler.poll_once().await.expect("Poll.");

	let mut newer = store.list_categories("u1").await.expect("Read.")[0].clone();

	newer.label = "Meals".to_string();
	newer.updated_at = 5_000;

	store.upsert_category("u1", &newer).await.expect("Write.");
	reconciler.poll_once().await.expect("Poll.");

	assert_eq!(store.list_categories("u1").await.expect("Read.")[0].label, "Meals");
}

#[tokio::test]
async fn poll_over_undated_nodes_appends_once() {
	let (store, _, reconciler) = reconciler(json!({
		"users": { "u1": { "Category": { "c1": {
			"label": "Food",
			"statements": { "s1": { "text": "Water" } }
		}}}}
	}));
	let first = reconciler.poll_once().await.expect("Poll.");
	let created = store.list_categories("u1").await.expect("Read.")[0].created;
	let second = reconciler.poll_once().await.expect("Poll.");
	let third = reconciler.poll_once().await.expect("Poll.");

	assert_eq!(first.events, 2);
	assert_eq!(second.events, 0);
	assert_eq!(third.events, 0);
	assert_eq!(store.list_changes("u1", cursor::START, 100).await.expect("Changes.").changes.len(), 2);
	assert_eq!(store.list_categories("u1").await.expect("Read.")[0].created, created);
}

#[tokio::test]
async fn newer_stream_put_keeps_the_first_created() {
	let (store, _, reconciler) = reconciler(json!({}));

	reconciler
		.apply_event(
			"users",
			&put("/u1/Category/c1", json!({ "label": "Food", "created": 1000, "updatedAt": 1000 })),
		)
		.await
		.expect("Apply.");
	reconciler
		.apply_event(
			"users",
			&put("/u1/Category/c1", json!({ "label": "Meals", "created": 4000, "updatedAt": 5000 })),
		)
		.await
		.expect("Apply.");

	let category = store.list_categories("u1").await.expect("Read.")[0].clone();

	assert_eq!(category.label, "Meals");
	assert_eq!(category.created, 1000);
}
