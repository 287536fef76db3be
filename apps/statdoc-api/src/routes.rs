use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use statdoc_domain::JobParams;
use statdoc_storage::{JobStore, models::JobRow};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/jobs", post(enqueue).get(list))
		.route("/v1/jobs/{job_id}", get(status))
		.route("/v1/jobs/{job_id}/ack", post(acknowledge))
		.route("/v1/jobs/{job_id}/cancel", post(cancel))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct EnqueueRequest {
	subject: String,
	context: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobView {
	job_id: Uuid,
	subject: String,
	context: Option<String>,
	status: String,
	attempt: i32,
	cost_spent_usd: f64,
	last_error: Option<String>,
	gap: Option<Value>,
	ack_token: Option<String>,
	artifact: Option<Value>,
	created_at: String,
	updated_at: String,
}
impl JobView {
	fn from_row(row: JobRow) -> Self {
		Self {
			job_id: row.job_id,
			subject: row.subject,
			context: row.context,
			status: row.status,
			attempt: row.attempt,
			cost_spent_usd: row.cost_spent_usd,
			last_error: row.last_error,
			gap: row.gap,
			ack_token: row.ack_token,
			artifact: row.artifact,
			created_at: row.created_at.format(&Rfc3339).unwrap_or_default(),
			updated_at: row.updated_at.format(&Rfc3339).unwrap_or_default(),
		}
	}
}

#[derive(Debug, Serialize)]
struct JobListResponse {
	jobs: Vec<JobView>,
}

#[derive(Debug, Deserialize)]
struct AckRequest {
	token: String,
}

async fn enqueue(
	State(state): State<AppState>,
	Json(payload): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
	let params = JobParams { subject: payload.subject, context: payload.context };
	let row = state.store.enqueue(&params).await?;

	Ok((StatusCode::CREATED, Json(JobView::from_row(row))))
}

async fn list(State(state): State<AppState>) -> Result<Json<JobListResponse>, ApiError> {
	let rows = state.store.list(100).await?;
	let jobs = rows.into_iter().map(JobView::from_row).collect();

	Ok(Json(JobListResponse { jobs }))
}

async fn status(
	State(state): State<AppState>,
	Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
	let row = state.store.get(job_id).await?.ok_or_else(|| {
		json_error(StatusCode::NOT_FOUND, "not_found", format!("Job {job_id} does not exist."))
	})?;

	Ok(Json(JobView::from_row(row)))
}

async fn acknowledge(
	State(state): State<AppState>,
	Path(job_id): Path<Uuid>,
	Json(payload): Json<AckRequest>,
) -> Result<Json<JobView>, ApiError> {
	let row = state.store.acknowledge(job_id, &payload.token).await?;

	Ok(Json(JobView::from_row(row)))
}

async fn cancel(
	State(state): State<AppState>,
	Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
	let row = state.store.cancel(job_id).await?;

	Ok(Json(JobView::from_row(row)))
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

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl From<statdoc_storage::Error> for ApiError {
	fn from(err: statdoc_storage::Error) -> Self {
		match err {
			statdoc_storage::Error::InvalidArgument(message) =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message),
			statdoc_storage::Error::NotFound(message) =>
				json_error(StatusCode::NOT_FOUND, "not_found", message),
			statdoc_storage::Error::Conflict(message) =>
				json_error(StatusCode::CONFLICT, "conflict", message),
			statdoc_storage::Error::Sqlx(inner) => {
				tracing::error!(error = %inner, "Storage failure.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage", "Storage failure.")
			},
			statdoc_storage::Error::Encoding(message) => {
				tracing::error!(%message, "Encoding failure.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "encoding", "Encoding failure.")
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
