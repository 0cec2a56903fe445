use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::{Duration, Instant},
};

use serde_json::json;

use cutover_config::{Feature, ReadSource};
use cutover_domain::{ChangeOp, EntityType, GlobalCategory, Statement, Template, UserState};
use cutover_legacy::{BoxFuture, LegacyReader, TreeReader, TreeWriter, UserData};
use cutover_service::{
	ChangeFeed, CreateCategoryRequest, CreateStatementRequest, CutoverService, Error,
	ImportStatus, PushFrame, UpdateCategoryRequest, UpdateStateRequest,
};
use cutover_storage::{CanonicalStore, cursor};
use cutover_testkit::{MemoryStore, MemoryTree};

const CANONICAL: Feature = Feature { read_source: ReadSource::CanonicalPrimary, cohort_percent: 0 };

/// Delegates to a tree reader until armed, then panics on any user snapshot read.
struct TripwireReader {
	inner: TreeReader,
	armed: AtomicBool,
}
impl TripwireReader {
	fn check(&self) {
		assert!(!self.armed.load(Ordering::SeqCst), "Legacy reader was called after seeding.");
	}
}
impl LegacyReader for TripwireReader {
	fn fetch_user_data<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, cutover_legacy::Result<UserData>> {
		self.check();

		self.inner.fetch_user_data(user_id)
	}

	fn get_user_state<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, cutover_legacy::Result<Option<UserState>>> {
		self.check();

		self.inner.get_user_state(user_id)
	}

	fn list_global_categories(&self) -> BoxFuture<'_, cutover_legacy::Result<Vec<GlobalCategory>>> {
		self.inner.list_global_categories()
	}

	fn list_templates(&self) -> BoxFuture<'_, cutover_legacy::Result<Vec<Template>>> {
		self.inner.list_templates()
	}

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, cutover_legacy::Result<bool>> {
		self.inner.is_admin(user_id)
	}

	fn list_admins(&self) -> BoxFuture<'_, cutover_legacy::Result<Vec<String>>> {
		self.inner.list_admins()
	}

	fn list_user_ids(&self) -> BoxFuture<'_, cutover_legacy::Result<Vec<String>>> {
		self.inner.list_user_ids()
	}
}

struct Harness {
	store: Arc<MemoryStore>,
	tree: Arc<MemoryTree>,
	service: CutoverService,
}

fn harness(feature: Feature, root: serde_json::Value) -> Harness {
	let store = Arc::new(MemoryStore::new());
	let tree = Arc::new(MemoryTree::with_root(root));
	let service = CutoverService::new(feature, store.clone())
		.with_legacy_reader(Arc::new(TreeReader::new(tree.clone())))
		.with_legacy_writer(Arc::new(TreeWriter::new(tree.clone())));

	Harness { store, tree, service }
}

fn legacy_user() -> serde_json::Value {
	json!({
		"users": { "u1": {
			"inited": true,
			"Category": {
				"c1": {
					"id": "c1",
					"label": "Food",
					"created": 1000,
					"statements": {
						"s1": { "id": "s1", "categoryId": "c1", "text": "Water", "created": 1100 },
						"s2": { "id": "s2", "categoryId": "c1", "text": "Bread", "created": 1200 }
					}
				}
			}
		}},
		"global": { "Category": { "g1": {
			"id": "g1",
			"label": "Greetings",
			"created": 500,
			"statements": { "gs1": { "id": "gs1", "categoryId": "g1", "text": "Hello", "created": 600 } }
		}}}
	})
}

fn new_category(id: &str, label: &str) -> CreateCategoryRequest {
	CreateCategoryRequest { id: Some(id.to_string()), label: label.to_string(), ..Default::default() }
}

fn new_statement(id: &str, category_id: &str, text: &str) -> CreateStatementRequest {
	CreateStatementRequest {
		id: Some(id.to_string()),
		category_id: category_id.to_string(),
		text: text.to_string(),
		created: None,
	}
}

#[tokio::test]
async fn seed_on_read_populates_canonical_and_stops_reading_legacy() {
	let store = Arc::new(MemoryStore::new());
	let tree = Arc::new(MemoryTree::with_root(legacy_user()));
	let reader =
		Arc::new(TripwireReader { inner: TreeReader::new(tree.clone()), armed: AtomicBool::new(false) });
	let service = CutoverService::new(CANONICAL, store.clone()).with_legacy_reader(reader.clone());
	let first = service.list_categories("u1").await.expect("First read.");

	assert_eq!(first.len(), 1);
	assert_eq!(first[0].label, "Food");
	assert_eq!(store.list_categories("u1").await.expect("Canonical read."), first);
	assert_eq!(store.list_all_statements("u1").await.expect("Canonical read.").len(), 2);

	reader.armed.store(true, Ordering::SeqCst);

	let second = service.list_categories("u1").await.expect("Second read.");
	let statements = service.list_statements("u1", "c1").await.expect("Statements.");

	assert_eq!(second, first);
	assert_eq!(
		statements.iter().map(|statement| statement.text.as_str()).collect::<Vec<_>>(),
		vec!["Water", "Bread"]
	);
	// Seeding is not a client-visible change.
	assert_eq!(store.append_count(), 0);
}

#[tokio::test]
async fn events_follow_mutation_order() {
	let h = harness(CANONICAL, json!({}));

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");
	h.service.create_statement("u1", new_statement("s1", "c1", "Water")).await.expect("Create.");
	h.service.create_statement("u1", new_statement("s2", "c1", "Bread")).await.expect("Create.");
	h.service
		.update_category(
			"u1",
			"c1",
			UpdateCategoryRequest { label: Some("Meals".to_string()), ..Default::default() },
		)
		.await
		.expect("Update.");

	let page = h.store.list_changes("u1", cursor::START, 100).await.expect("Changes.");
	let ids = page.changes.iter().map(|event| event.entity_id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["c1", "s1", "s2", "c1"]);
	assert!(page.changes.iter().all(|event| event.op == ChangeOp::Upsert));
	assert_eq!(page.changes[3].payload["label"], "Meals");

	let after_second = h
		.store
		.list_changes("u1", &page.changes[1].cursor, 100)
		.await
		.expect("Changes.");

	assert_eq!(after_second.changes, page.changes[2..].to_vec());
	assert_eq!(after_second.next_cursor, page.next_cursor);
}

#[tokio::test]
async fn mirror_failure_fails_the_call_but_keeps_the_canonical_write() {
	let h = harness(CANONICAL, json!({}));

	h.tree.fail_writes(true);

	let err = h
		.service
		.create_category("u1", new_category("c1", "Food"))
		.await
		.expect_err("Mirror failure must surface.");

	assert!(matches!(err, Error::MirrorFailed { .. }), "Unexpected error: {err:?}");

	let canonical = h.store.list_categories("u1").await.expect("Canonical read.");

	assert_eq!(canonical.len(), 1);
	assert_eq!(canonical[0].id, "c1");
	assert_eq!(h.store.append_count(), 0);

	// A retry with the same content repairs the mirror.
	h.tree.fail_writes(false);
	h.service
		.update_category("u1", "c1", UpdateCategoryRequest::default())
		.await
		.expect("Retry.");

	assert_eq!(h.tree.peek("users/u1/Category/c1")["label"], "Food");
}

#[tokio::test]
async fn delete_with_failed_mirror_stays_deleted_on_later_reads() {
	let h = harness(CANONICAL, legacy_user());

	h.service.list_categories("u1").await.expect("Seed.");
	h.tree.fail_writes(true);

	let err = h.service.delete_category("u1", "c1").await.expect_err("Mirror failure must surface.");

	assert!(matches!(err, Error::MirrorFailed { .. }), "Unexpected error: {err:?}");

	h.tree.fail_writes(false);

	// The legacy tree still holds the category; the canonical tombstone wins.
	assert_eq!(h.tree.peek("users/u1/Category/c1")["label"], "Food");
	assert!(h.service.list_categories("u1").await.expect("Read.").is_empty());
	assert!(h.service.list_all_statements("u1").await.expect("Read.").is_empty());

	let update = UpdateCategoryRequest { label: Some("Meals".to_string()), ..Default::default() };
	let err = h
		.service
		.update_category("u1", "c1", update)
		.await
		.expect_err("A deleted category must not be updated.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err:?}");
	assert!(h.store.list_categories("u1").await.expect("Canonical read.").is_empty());
}

#[tokio::test]
async fn category_delete_emits_cascade_events() {
	let h = harness(CANONICAL, json!({}));

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");
	h.service.create_statement("u1", new_statement("s1", "c1", "Water")).await.expect("Create.");
	h.service.create_statement("u1", new_statement("s2", "c1", "Bread")).await.expect("Create.");

	let before = h.store.list_changes("u1", cursor::START, 100).await.expect("Changes.");

	h.service.delete_category("u1", "c1").await.expect("Delete.");

	let page = h.store.list_changes("u1", &before.next_cursor, 100).await.expect("Changes.");
	let deletes = page
		.changes
		.iter()
		.map(|event| (event.entity_type, event.entity_id.as_str(), event.op))
		.collect::<Vec<_>>();

	assert_eq!(
		deletes,
		vec![
			(EntityType::Category, "c1", ChangeOp::Delete),
			(EntityType::Statement, "s1", ChangeOp::Delete),
			(EntityType::Statement, "s2", ChangeOp::Delete),
		]
	);
	assert!(h.service.list_statements("u1", "c1").await.expect("Statements.").is_empty());
	assert!(h.tree.peek("users/u1/Category/c1").is_null());
}

#[tokio::test]
async fn notify_failure_does_not_fail_the_write() {
	let h = harness(CANONICAL, json!({}));

	h.store.fail_appends(true);

	let category =
		h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");

	assert_eq!(category.label, "Food");
	assert_eq!(h.store.list_categories("u1").await.expect("Canonical read.").len(), 1);
	assert_eq!(h.tree.peek("users/u1/Category/c1")["label"], "Food");
	assert_eq!(h.store.append_count(), 0);
}

#[tokio::test]
async fn validation_rejects_before_touching_stores() {
	let h = harness(CANONICAL, json!({}));
	let err = h
		.service
		.create_category("u1", new_category("c1", "  "))
		.await
		.expect_err("Blank label.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let err = h
		.service
		.create_statement("u1", new_statement("s1", "missing", "Water"))
		.await
		.expect_err("Unknown category.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(h.store.list_categories("u1").await.expect("Read.").is_empty());
	assert!(h.tree.snapshot().get("users").is_none());
}

#[tokio::test]
async fn long_poll_times_out_with_cursor_unchanged() {
	let h = harness(CANONICAL, json!({}));

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");

	let current = h.store.list_changes("u1", cursor::START, 100).await.expect("Changes.").next_cursor;
	let feed = ChangeFeed::new(h.store.clone(), cutover_config::Feed::default());
	let started = Instant::now();
	let response = feed
		.long_poll("u1", &current, 100, Duration::from_millis(200))
		.await
		.expect("Long poll.");
	let elapsed = started.elapsed();

	assert!(response.changes.is_empty());
	assert_eq!(response.cursor, current);
	assert!(elapsed >= Duration::from_millis(200), "Returned early: {elapsed:?}");
	assert!(elapsed < Duration::from_millis(1_500), "Returned late: {elapsed:?}");
}

#[tokio::test]
async fn long_poll_returns_pending_changes_without_event_cursors() {
	let h = harness(CANONICAL, json!({}));

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");

	let feed = ChangeFeed::new(h.store.clone(), cutover_config::Feed::default());
	let response =
		feed.long_poll("u1", cursor::START, 100, Duration::from_secs(5)).await.expect("Poll.");

	assert_eq!(response.changes.len(), 1);
	assert!(response.changes[0].cursor.is_empty());
	assert_eq!(response.cursor, cursor::format(1));

	let body = serde_json::to_value(&response).expect("Serialize.");

	assert!(body["changes"][0].get("cursor").is_none());
}

#[tokio::test]
async fn push_session_sends_changes_then_heartbeats() {
	let h = harness(CANONICAL, json!({}));
	let cfg = cutover_config::Feed { heartbeat_interval_ms: 50, ..Default::default() };
	let feed = ChangeFeed::new(h.store.clone(), cfg);
	let mut session = feed.push_session("u1", cursor::START, 100);

	assert_eq!(session.poll().await.expect("Poll."), None);

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");

	let Some(PushFrame::Changes { cursor: pushed, changes }) =
		session.poll().await.expect("Poll.")
	else {
		panic!("Expected a changes frame.");
	};

	assert_eq!(changes.len(), 1);
	assert_eq!(session.cursor(), pushed);

	tokio::time::sleep(Duration::from_millis(80)).await;

	assert_eq!(
		session.poll().await.expect("Poll."),
		Some(PushFrame::Heartbeat { cursor: pushed.clone() })
	);

	let frame = serde_json::to_value(PushFrame::Heartbeat { cursor: pushed }).expect("Serialize.");

	assert_eq!(frame["type"], "heartbeat");
}

#[test]
fn feed_clamps_limits_and_timeouts() {
	let feed = ChangeFeed::new(Arc::new(MemoryStore::new()), cutover_config::Feed::default());

	assert_eq!(feed.limit(None), 100);
	assert_eq!(feed.limit(Some(-3)), 100);
	assert_eq!(feed.limit(Some(20)), 20);
	assert_eq!(feed.limit(Some(10_000)), 500);
	assert_eq!(feed.timeout(None), Duration::from_secs(25));
	assert_eq!(feed.timeout(Some(Duration::ZERO)), Duration::from_secs(25));
	assert_eq!(feed.timeout(Some(Duration::from_secs(600))), Duration::from_secs(60));
}

#[tokio::test]
async fn import_reports_ok_exists_and_not_found() {
	let h = harness(CANONICAL, legacy_user());

	// The canonical catalog is empty, so the import copies out of the legacy catalog.
	assert_eq!(
		h.service.import_global_category("u2", "g1", false).await.expect("Import."),
		ImportStatus::Ok
	);
	assert_eq!(
		h.service.import_global_category("u2", "g1", false).await.expect("Import."),
		ImportStatus::Exists
	);
	assert_eq!(
		h.service.import_global_category("u2", "g1", true).await.expect("Import."),
		ImportStatus::Ok
	);
	assert_eq!(
		h.service.import_global_category("u2", "nope", false).await.expect("Import."),
		ImportStatus::NotFound
	);

	let statements = h.store.list_statements("u2", "g1").await.expect("Canonical read.");

	assert_eq!(statements.len(), 1);
	assert_eq!(statements[0].text, "Hello");
	assert_eq!(h.tree.peek("users/u2/Category/g1/statements/gs1")["text"], "Hello");
}

#[tokio::test]
async fn legacy_only_routing_reads_the_tree() {
	let h = harness(Feature { read_source: ReadSource::LegacyOnly, cohort_percent: 0 }, legacy_user());
	let categories = h.service.list_categories("u1").await.expect("Read.");

	assert_eq!(categories.len(), 1);
	// Legacy-routed reads never seed.
	assert!(h.store.list_categories("u1").await.expect("Canonical read.").is_empty());

	// Writes still go canonical first, then the mirror.
	let statement = h
		.service
		.create_statement("u1", new_statement("s3", "c1", "Juice"))
		.await
		.expect("Create.");

	assert_eq!(statement.category_id, "c1");
	assert_eq!(h.store.list_statements("u1", "c1").await.expect("Canonical read.").len(), 1);
	assert_eq!(h.tree.peek("users/u1/Category/c1/statements/s3")["text"], "Juice");
	assert!(h.tree.read_count() > 0);
}

#[tokio::test]
async fn user_state_normalizes_quickes_and_emits_events() {
	let h = harness(CANONICAL, json!({}));
	let state = h.service.get_user_state("u1").await.expect("Defaults.");

	assert!(!state.inited);
	assert_eq!(state.quickes, cutover_domain::quickes::defaults());

	let state = h
		.service
		.update_user_state(
			"u1",
			UpdateStateRequest {
				inited: Some(true),
				quickes: Some(vec!["Yes".to_string(), " ".to_string()]),
				preferences: None,
			},
		)
		.await
		.expect("Update.");

	assert!(state.inited);
	assert_eq!(state.quickes[0], "Yes");
	assert_eq!(state.quickes[1], cutover_domain::quickes::defaults()[1]);

	let slots = h.service.set_quickes("u1", &["No".to_string()]).await.expect("Quickes.");

	assert_eq!(slots[0], "No");
	assert_eq!(h.tree.peek("users/u1/inited"), json!(true));

	let page = h.store.list_changes("u1", cursor::START, 100).await.expect("Changes.");
	let kinds = page.changes.iter().map(|event| event.entity_type).collect::<Vec<_>>();

	assert_eq!(kinds, vec![EntityType::UserState, EntityType::Quickes]);
}

#[tokio::test]
async fn deleting_a_user_erases_both_stores() {
	let h = harness(CANONICAL, legacy_user());

	h.service.list_categories("u1").await.expect("Seed.");
	h.service.create_category("u1", new_category("c2", "Drinks")).await.expect("Create.");
	h.service.delete_user("u1", true).await.expect("Delete.");

	assert!(h.store.list_categories("u1").await.expect("Read.").is_empty());
	assert!(h.tree.peek("users/u1").is_null());

	let page = h.store.list_changes("u1", cursor::START, 100).await.expect("Changes.");

	assert_eq!(page.changes.len(), 1);
	assert_eq!(page.changes[0].entity_type, EntityType::User);
	assert_eq!(page.changes[0].op, ChangeOp::Delete);
}

#[tokio::test]
async fn stale_statement_update_is_not_regressed() {
	let h = harness(CANONICAL, json!({}));

	h.service.create_category("u1", new_category("c1", "Food")).await.expect("Create.");

	let created =
		h.service.create_statement("u1", new_statement("s1", "c1", "Water")).await.expect("Create.");
	let older = Statement { text: "Old".to_string(), updated_at: created.updated_at - 1, ..created.clone() };
	let written = h.store.upsert_statement("u1", &older).await.expect("Upsert.");

	assert!(!written.is_applied());
	assert_eq!(written.stored.text, "Water");
}
