use std::time::Duration;

use axum::{
	Json, Router,
	extract::{
		FromRequestParts, Path, Query, State,
		ws::{Message, WebSocket, WebSocketUpgrade},
	},
	http::{StatusCode, request::Parts},
	response::{IntoResponse, Response},
	routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::time;

use cutover_domain::{Category, GlobalCategory, Statement};
use cutover_service::{
	CreateCategoryRequest, CreateStatementRequest, Error as ServiceError, ImportStatus,
	PushSession, UpdateCategoryRequest, UpdateStateRequest, UpdateStatementRequest,
};

use crate::state::AppState;

/// Header carrying the authenticated user id, set by the gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/categories", get(list_categories).post(create_category))
		.route(
			"/v1/categories/{category_id}",
			get(get_category).patch(update_category).delete(delete_category),
		)
		.route("/v1/categories/{category_id}/statements", get(list_statements))
		.route("/v1/statements", post(create_statement))
		.route(
			"/v1/statements/{statement_id}",
			get(get_statement).patch(update_statement).delete(delete_statement),
		)
		.route("/v1/state", get(get_state).patch(update_state))
		.route("/v1/quickes", put(set_quickes))
		.route("/v1/global/categories", get(list_global_categories))
		.route("/v1/global/categories/{category_id}/import", post(import_global_category))
		.route("/v1/admin", get(is_admin))
		.route("/v1/user", delete(delete_user))
		.route("/v1/changes", get(changes))
		.route("/v1/stream", get(stream))
		.with_state(state)
}

/// The caller's user id from [`USER_ID_HEADER`].
pub struct UserId(pub String);
impl<S> FromRequestParts<S> for UserId
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let user_id = parts
			.headers
			.get(USER_ID_HEADER)
			.and_then(|value| value.to_str().ok())
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.ok_or_else(|| {
				json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Missing user id.")
			})?;

		Ok(Self(user_id.to_string()))
	}
}

#[derive(Debug, Serialize)]
struct CategoriesResponse {
	categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
struct StatementsResponse {
	statements: Vec<Statement>,
}

#[derive(Debug, Serialize)]
struct GlobalCategoriesResponse {
	categories: Vec<GlobalCategory>,
}

#[derive(Debug, Deserialize, Serialize)]
struct QuickesBody {
	quickes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ImportResponse {
	status: ImportStatus,
}

#[derive(Debug, Serialize)]
struct AdminResponse {
	admin: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalCategoriesQuery {
	#[serde(default)]
	include_statements: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportQuery {
	#[serde(default)]
	force: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteUserQuery {
	#[serde(default)]
	erase_legacy: Option<bool>,
}

/// Kept as raw strings so a malformed value falls back to the default instead of a 400.
#[derive(Debug, Default, Deserialize)]
struct ChangesQuery {
	#[serde(default)]
	cursor: Option<String>,
	#[serde(default)]
	timeout: Option<String>,
	#[serde(default)]
	limit: Option<String>,
}
impl ChangesQuery {
	fn cursor(&self) -> &str {
		self.cursor.as_deref().map(str::trim).unwrap_or_default()
	}

	fn limit(&self) -> Option<i64> {
		self.limit.as_deref().and_then(|raw| raw.trim().parse().ok())
	}

	fn timeout(&self) -> Option<Duration> {
		self.timeout.as_deref().and_then(parse_duration)
	}
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn list_categories(
	State(state): State<AppState>,
	UserId(user_id): UserId,
) -> Result<Json<CategoriesResponse>, ApiError> {
	let categories = state.service.list_categories(&user_id).await?;
	Ok(Json(CategoriesResponse { categories }))
}

async fn create_category(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
	let category = state.service.create_category(&user_id, payload).await?;
	Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(category_id): Path<String>,
) -> Result<Json<Category>, ApiError> {
	let category = state.service.find_category(&user_id, &category_id).await?;
	Ok(Json(category))
}

async fn update_category(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(category_id): Path<String>,
	Json(payload): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
	let category = state.service.update_category(&user_id, &category_id, payload).await?;
	Ok(Json(category))
}

async fn delete_category(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(category_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_category(&user_id, &category_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn list_statements(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(category_id): Path<String>,
) -> Result<Json<StatementsResponse>, ApiError> {
	let statements = state.service.list_statements(&user_id, &category_id).await?;
	Ok(Json(StatementsResponse { statements }))
}

async fn create_statement(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Json(payload): Json<CreateStatementRequest>,
) -> Result<impl IntoResponse, ApiError> {
	let statement = state.service.create_statement(&user_id, payload).await?;
	Ok((StatusCode::CREATED, Json(statement)))
}

async fn get_statement(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(statement_id): Path<String>,
) -> Result<Json<Statement>, ApiError> {
	let statement = state.service.find_statement(&user_id, &statement_id).await?;
	Ok(Json(statement))
}

async fn update_statement(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(statement_id): Path<String>,
	Json(payload): Json<UpdateStatementRequest>,
) -> Result<impl IntoResponse, ApiError> {
	let statement = state.service.update_statement(&user_id, &statement_id, payload).await?;
	Ok(Json(statement))
}

async fn delete_statement(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(statement_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_statement(&user_id, &statement_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn get_state(
	State(state): State<AppState>,
	UserId(user_id): UserId,
) -> Result<impl IntoResponse, ApiError> {
	let user_state = state.service.get_user_state(&user_id).await?;
	Ok(Json(user_state))
}

async fn update_state(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Json(payload): Json<UpdateStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
	let user_state = state.service.update_user_state(&user_id, payload).await?;
	Ok(Json(user_state))
}

async fn set_quickes(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Json(payload): Json<QuickesBody>,
) -> Result<Json<QuickesBody>, ApiError> {
	let quickes = state.service.set_quickes(&user_id, &payload.quickes).await?;
	Ok(Json(QuickesBody { quickes }))
}

async fn list_global_categories(
	State(state): State<AppState>,
	UserId(_): UserId,
	Query(query): Query<GlobalCategoriesQuery>,
) -> Result<Json<GlobalCategoriesResponse>, ApiError> {
	let include_statements = query.include_statements.unwrap_or(true);
	let categories = state.service.list_global_categories(include_statements).await?;
	Ok(Json(GlobalCategoriesResponse { categories }))
}

async fn import_global_category(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Path(category_id): Path<String>,
	Query(query): Query<ImportQuery>,
) -> Result<Response, ApiError> {
	let status = state
		.service
		.import_global_category(&user_id, &category_id, query.force.unwrap_or(false))
		.await?;
	let code = match status {
		ImportStatus::Ok => StatusCode::OK,
		ImportStatus::Exists => StatusCode::CONFLICT,
		ImportStatus::NotFound => StatusCode::NOT_FOUND,
	};
	Ok((code, Json(ImportResponse { status })).into_response())
}

async fn is_admin(
	State(state): State<AppState>,
	UserId(user_id): UserId,
) -> Result<Json<AdminResponse>, ApiError> {
	let admin = state.service.is_admin(&user_id).await?;
	Ok(Json(AdminResponse { admin }))
}

async fn delete_user(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Query(query): Query<DeleteUserQuery>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_user(&user_id, query.erase_legacy.unwrap_or(false)).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn changes(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Query(query): Query<ChangesQuery>,
) -> Result<impl IntoResponse, ApiError> {
	let limit = state.feed.limit(query.limit());
	let timeout = state.feed.timeout(query.timeout());
	let response = state.feed.long_poll(&user_id, query.cursor(), limit, timeout).await?;
	Ok(Json(response))
}

async fn stream(
	State(state): State<AppState>,
	UserId(user_id): UserId,
	Query(query): Query<ChangesQuery>,
	ws: WebSocketUpgrade,
) -> Response {
	let limit = state.feed.limit(query.limit());
	let session = state.feed.push_session(&user_id, query.cursor(), limit);

	ws.on_upgrade(move |socket| push_changes(socket, session))
}

async fn push_changes(mut socket: WebSocket, mut session: PushSession) {
	let mut ticker = time::interval(session.interval());

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let frame = match session.poll().await {
					Ok(Some(frame)) => frame,
					Ok(None) => continue,
					Err(err) => {
						tracing::warn!(error = %err, "Push session failed to read changes.");

						break;
					},
				};
				let text = match serde_json::to_string(&frame) {
					Ok(text) => text,
					Err(err) => {
						tracing::warn!(error = %err, "Failed to encode push frame.");

						break;
					},
				};

				if socket.send(Message::Text(text.into())).await.is_err() {
					break;
				}
			},
			incoming = socket.recv() => match incoming {
				Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
				Some(Ok(_)) => {},
			},
		}
	}

	tracing::debug!(cursor = session.cursor(), "Push session closed.");
}

/// Parses `250ms`, `5s`, `2m` or bare milliseconds. Zero, negative and malformed values yield
/// `None`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
	let raw = raw.trim();
	let (digits, unit_ms) = if let Some(rest) = raw.strip_suffix("ms") {
		(rest, 1)
	} else if let Some(rest) = raw.strip_suffix('s') {
		(rest, 1_000)
	} else if let Some(rest) = raw.strip_suffix('m') {
		(rest, 60_000)
	} else {
		(raw, 1)
	};
	let value = digits.trim().parse::<u64>().ok().filter(|value| *value > 0)?;

	Some(Duration::from_millis(value.checked_mul(unit_ms)?))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } => {
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message)
			},
			ServiceError::NotFound { message } => {
				json_error(StatusCode::NOT_FOUND, "not_found", message)
			},
			other => {
				tracing::error!(error = %other, "Request failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal error.")
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };
		(self.status, Json(body)).into_response()
	}
}
