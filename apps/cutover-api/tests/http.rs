use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use cutover_api::{routes, state::AppState};
use cutover_config::{Feature, ReadSource};
use cutover_legacy::{TreeReader, TreeWriter};
use cutover_service::{ChangeFeed, CutoverService};
use cutover_testkit::{MemoryStore, MemoryTree};

fn test_app(root: Value) -> (Router, Arc<MemoryTree>) {
	let store = Arc::new(MemoryStore::new());
	let tree = Arc::new(MemoryTree::with_root(root));
	let feature = Feature { read_source: ReadSource::CanonicalPrimary, cohort_percent: 0 };
	let service = CutoverService::new(feature, store.clone())
		.with_legacy_reader(Arc::new(TreeReader::new(tree.clone())))
		.with_legacy_writer(Arc::new(TreeWriter::new(tree.clone())));
	let feed = ChangeFeed::new(store, cutover_config::Feed::default());

	(routes::router(AppState::from_parts(service, feed)), tree)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
	let builder = Request::builder().method(method).uri(uri).header(routes::USER_ID_HEADER, "u1");

	match body {
		Some(body) => builder
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.expect("Failed to build request."),
		None => builder.body(Body::empty()).expect("Failed to build request."),
	}
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
	let response = app.clone().oneshot(req).await.expect("Failed to call router.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let (app, _) = test_app(json!({}));
	let response = app
		.oneshot(Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."))
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_user_id_is_unauthorized() {
	let (app, _) = test_app(json!({}));
	let req = Request::builder().uri("/v1/categories").body(Body::empty()).expect("Failed to build request.");
	let (status, body) = call(&app, req).await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn category_and_statement_crud() {
	let (app, tree) = test_app(json!({}));
	let (status, created) = call(
		&app,
		request("POST", "/v1/categories", Some(json!({ "id": "c1", "label": "Food", "aiUse": true }))),
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(created["label"], "Food");
	assert_eq!(created["aiUse"], true);

	let (status, _) = call(
		&app,
		request(
			"POST",
			"/v1/statements",
			Some(json!({ "id": "s1", "categoryId": "c1", "text": "Water" })),
		),
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);

	let (status, updated) = call(
		&app,
		request("PATCH", "/v1/statements/s1", Some(json!({ "text": "Sparkling water" }))),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(updated["text"], "Sparkling water");

	let (_, listed) = call(&app, request("GET", "/v1/categories/c1/statements", None)).await;

	assert_eq!(listed["statements"][0]["categoryId"], "c1");
	assert_eq!(tree.peek("users/u1/Category/c1/statements/s1")["text"], "Sparkling water");

	let (status, _) = call(&app, request("DELETE", "/v1/categories/c1", None)).await;

	assert_eq!(status, StatusCode::NO_CONTENT);

	let (_, listed) = call(&app, request("GET", "/v1/categories", None)).await;

	assert_eq!(listed["categories"], json!([]));
}

#[tokio::test]
async fn single_category_and_statement_reads() {
	let (app, _) = test_app(json!({ "users": { "u1": { "Category": { "c1": {
		"label": "Food",
		"created": 1000,
		"statements": { "s1": { "text": "Water", "created": 1100 } }
	}}}}}));
	let (status, category) = call(&app, request("GET", "/v1/categories/c1", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(category["id"], "c1");
	assert_eq!(category["label"], "Food");

	let (status, statement) = call(&app, request("GET", "/v1/statements/s1", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(statement["text"], "Water");
	assert_eq!(statement["categoryId"], "c1");

	let (status, body) = call(&app, request("GET", "/v1/categories/missing", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error_code"], "not_found");

	let (status, _) = call(&app, request("GET", "/v1/statements/missing", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn service_errors_map_to_status_codes() {
	let (app, tree) = test_app(json!({}));
	let (status, body) =
		call(&app, request("POST", "/v1/categories", Some(json!({ "label": "" })))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "invalid_request");

	let (status, body) =
		call(&app, request("PATCH", "/v1/categories/missing", Some(json!({ "label": "X" })))).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error_code"], "not_found");

	tree.fail_writes(true);

	let (status, body) =
		call(&app, request("POST", "/v1/categories", Some(json!({ "label": "Food" })))).await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body["error_code"], "internal_error");
	assert!(!body["message"].as_str().unwrap_or_default().to_lowercase().contains("legacy"));
}

#[tokio::test]
async fn changes_long_poll_returns_events_then_times_out() {
	let (app, _) = test_app(json!({}));

	call(&app, request("POST", "/v1/categories", Some(json!({ "id": "c1", "label": "Food" })))).await;

	let (status, page) = call(&app, request("GET", "/v1/changes?timeout=1s", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(page["changes"][0]["entity_type"], "category");
	assert_eq!(page["changes"][0]["op"], "upsert");
	assert!(page["changes"][0].get("cursor").is_none());

	let cursor = page["cursor"].as_str().expect("Cursor.").to_string();
	let (status, page) = call(
		&app,
		request("GET", &format!("/v1/changes?cursor={cursor}&timeout=200ms&limit=oops"), None),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(page["changes"], json!([]));
	assert_eq!(page["cursor"], cursor);
}

#[tokio::test]
async fn malformed_cursor_is_a_bad_request() {
	let (app, _) = test_app(json!({}));
	let (status, body) = call(&app, request("GET", "/v1/changes?cursor=abc&timeout=50", None)).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn import_reports_status_codes() {
	let (app, _) = test_app(json!({
		"global": { "Category": { "g1": { "id": "g1", "label": "Greetings", "created": 500 } } }
	}));
	let (status, body) =
		call(&app, request("POST", "/v1/global/categories/g1/import", None)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "ok");

	let (status, body) =
		call(&app, request("POST", "/v1/global/categories/g1/import", None)).await;

	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["status"], "exists");

	let (status, _) =
		call(&app, request("POST", "/v1/global/categories/g1/import?force=true", None)).await;

	assert_eq!(status, StatusCode::OK);

	let (status, body) =
		call(&app, request("POST", "/v1/global/categories/zz/import", None)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn quickes_are_normalized() {
	let (app, _) = test_app(json!({}));
	let (status, body) =
		call(&app, request("PUT", "/v1/quickes", Some(json!({ "quickes": ["Yes", ""] })))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["quickes"].as_array().map(Vec::len), Some(6));
	assert_eq!(body["quickes"][0], "Yes");

	let (_, state) = call(&app, request("GET", "/v1/state", None)).await;

	assert_eq!(state["quickes"][0], "Yes");
}
