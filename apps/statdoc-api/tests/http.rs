use std::sync::Arc;

use axum::{
	body::Body,
	http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use statdoc_api::{routes, state::AppState};
use statdoc_storage::{PgJobStore, db::Db};
use statdoc_testkit::TestDatabase;

async fn app_state(test_db: &TestDatabase) -> AppState {
	let cfg = statdoc_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	AppState { store: Arc::new(PgJobStore::new(db, &statdoc_config::Queue::default())) }
}

async fn body_json(response: axum::response::Response) -> Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read body.");

	serde_json::from_slice(&bytes).expect("Body is not JSON.")
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_string()))
		.expect("Failed to build request.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STATDOC_PG_DSN to run."]
async fn job_lifecycle_over_http() {
	let Some(base_dsn) = statdoc_testkit::env_dsn() else {
		eprintln!("Skipping job_lifecycle_over_http; set STATDOC_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let state = app_state(&test_db).await;
	let router = routes::router(state);

	// Health first.
	let response = router
		.clone()
		.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);

	// Enqueue.
	let payload = serde_json::json!({ "subject": "needle decompression", "context": "adult" });
	let response = router.clone().oneshot(post_json("/v1/jobs", &payload)).await.unwrap();

	assert_eq!(response.status(), StatusCode::CREATED);

	let job = body_json(response).await;
	let job_id = job["job_id"].as_str().expect("job_id missing").to_string();

	assert_eq!(job["status"], "QUEUED");
	assert_eq!(job["attempt"], 0);

	// Status.
	let response = router
		.clone()
		.oneshot(Request::builder().uri(format!("/v1/jobs/{job_id}")).body(Body::empty()).unwrap())
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);

	// Acknowledging a Queued job conflicts.
	let response = router
		.clone()
		.oneshot(post_json(
			&format!("/v1/jobs/{job_id}/ack"),
			&serde_json::json!({ "token": "ok" }),
		))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::CONFLICT);

	// Cancel.
	let response = router
		.clone()
		.oneshot(post_json(&format!("/v1/jobs/{job_id}/cancel"), &serde_json::json!({})))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);

	let cancelled = body_json(response).await;

	assert_eq!(cancelled["status"], "CANCELLED");

	// Cancelling again conflicts; unknown ids are not found.
	let response = router
		.clone()
		.oneshot(post_json(&format!("/v1/jobs/{job_id}/cancel"), &serde_json::json!({})))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::CONFLICT);

	let response = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/v1/jobs/{}", uuid::Uuid::new_v4()))
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
