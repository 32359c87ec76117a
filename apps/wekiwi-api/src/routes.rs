use std::{sync::Arc, time::Instant};

use axum::{
	Json, Router,
	extract::{Request, State},
	http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{delete, get, post, put},
};
use serde_json::Value;

use wekiwi_batch::BatchScheduler;
use wekiwi_service::{
	ContentMessage, CreateContentRequest, EmbedRequest, EmbedResponse, Error as ServiceError,
	RerankRequest, RerankResponse, SearchRequest, SearchResponse, UpdateContentRequest,
};

use crate::state::AppState;

pub const HEADER_PROCESS_TIME: &str = "x-process-time";

pub fn router(state: AppState) -> Router {
	let authenticated = Router::new()
		.route("/v1/content/search", post(search))
		.route("/v1/content/create", post(create_content))
		.route("/v1/content/update", put(update_content))
		.route("/v1/content/delete", delete(delete_contents))
		.route("/v1/content/rebuild", delete(rebuild))
		.route("/v1/text/rerank", post(rerank))
		.route("/v1/text/embed", post(embed))
		.route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

	Router::new()
		.route("/health", get(health))
		.merge(authenticated)
		.layer(middleware::from_fn(log_middleware))
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
	let models = &state.service.models;
	let mut statuses = vec![model_status("embedding", &models.embedding)];

	if let Some(rerank) = &models.rerank {
		statuses.push(model_status("rerank", rerank));
	}

	Json(serde_json::json!({ "status": "healthy", "models": statuses }))
}

fn model_status(role: &str, scheduler: &BatchScheduler) -> Value {
	serde_json::json!({
		"role": role,
		"resource": scheduler.resource(),
		"busy": scheduler.is_busy(),
	})
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn create_content(
	State(state): State<AppState>,
	Json(payload): Json<CreateContentRequest>,
) -> Result<Json<ContentMessage>, ApiError> {
	let response = state.service.create_content(payload).await?;

	Ok(Json(response))
}

async fn update_content(
	State(state): State<AppState>,
	Json(payload): Json<UpdateContentRequest>,
) -> Result<Json<ContentMessage>, ApiError> {
	let response = state.service.update_content(payload).await?;

	Ok(Json(response))
}

async fn delete_contents(
	State(state): State<AppState>,
	Json(content_ids): Json<Vec<u32>>,
) -> Result<Json<ContentMessage>, ApiError> {
	let response = state.service.delete_contents(&content_ids).await?;

	Ok(Json(response))
}

/// Starts a full index rebuild in the background and answers at once.
async fn rebuild(State(state): State<AppState>) -> (StatusCode, Json<ContentMessage>) {
	let service = Arc::clone(&state.service);

	state.spawn_throttled(move || async move {
		if let Err(err) = service.rebuild().await {
			tracing::error!(error = %err, "Index rebuild failed.");
		}
	});

	(StatusCode::ACCEPTED, Json(ContentMessage::new("Rebuild started.")))
}

async fn rerank(
	State(state): State<AppState>,
	Json(payload): Json<RerankRequest>,
) -> Result<Json<RerankResponse>, ApiError> {
	let response = state.service.rerank(payload).await?;

	Ok(Json(response))
}

async fn embed(
	State(state): State<AppState>,
	Json(payload): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
	let response = state.service.embed(payload).await?;

	Ok(Json(response))
}

async fn auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
	let authorized =
		read_bearer_token(req.headers()).is_some_and(|token| state.is_authorized(token));

	if !authorized {
		return ApiError::new(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid Bearer token is required.",
		)
		.into_response();
	}

	next.run(req).await
}

async fn log_middleware(req: Request, next: Next) -> Response {
	let method = req.method().clone();
	let path = req.uri().path().to_string();
	let started = Instant::now();

	tracing::debug!(%method, path = %path, "Request received.");

	let mut response = next.run(req).await;
	let elapsed_ms = started.elapsed().as_millis() as u64;

	response.headers_mut().insert(HEADER_PROCESS_TIME, HeaderValue::from(elapsed_ms));

	tracing::info!(
		%method,
		path = %path,
		status = response.status().as_u16(),
		elapsed_ms,
		"Request completed."
	);

	response
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
		Self { status, error_code, message: message.into() }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
			ServiceError::Batch { .. } => (StatusCode::BAD_GATEWAY, "MODEL_ERROR"),
			ServiceError::Qdrant { .. } => (StatusCode::BAD_GATEWAY, "VECTOR_INDEX_ERROR"),
			ServiceError::Storage { .. } => (StatusCode::BAD_GATEWAY, "CONTENT_STORE_ERROR"),
			ServiceError::Ranking { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "RANKING_ERROR"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, error_code, "Request failed.");
		}

		Self::new(status, error_code, err.to_string())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = serde_json::json!({
			"error_code": self.error_code,
			"message": self.message,
		});

		(self.status, Json(body)).into_response()
	}
}
