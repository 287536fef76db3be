use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use statdoc_domain::{
	Artifact, JobParams, LeaseState, QualityIteration, SourceOrigin, SourceRecord, StopReason,
};
use statdoc_storage::{
	CompletionBundle, JobStore, PgJobStore,
	corpus::{IngestDocument, ingest_document, load_corpus},
	db::Db,
};
use statdoc_testkit::TestDatabase;

fn queue_cfg(lease_secs: i64, max_attempts: i32) -> statdoc_config::Queue {
	statdoc_config::Queue { lease_secs, max_attempts, ..Default::default() }
}

async fn connect(test_db: &TestDatabase) -> Db {
	let cfg = statdoc_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

fn bundle_for(job_id: Uuid, now: OffsetDateTime) -> CompletionBundle {
	let source = SourceRecord {
		source_id: Uuid::new_v4(),
		job_id,
		origin: SourceOrigin::Ingested,
		title: "Trauma guideline".to_string(),
		url: Some("https://example.org/guideline".to_string()),
		external_ref: None,
		raw_hash: "a".repeat(64),
		text_hash: "b".repeat(64),
		tier: "clinical_practice_guideline".to_string(),
		retrieved_at: now,
	};
	let artifact = Artifact {
		text: "Decompress the chest at the second intercostal space. [S1]".to_string(),
		score: 0.91,
		iterations_used: 2,
		cost_usd: 0.12,
		stop_reason: StopReason::Threshold,
		validation_warnings: 1,
		source_ids: vec![source.source_id],
	};

	CompletionBundle {
		artifact,
		sources: vec![source],
		iterations: vec![
			QualityIteration {
				iteration: 1,
				score: 0.4,
				cost_usd: 0.05,
				passed: false,
				violation: Some("uncited factual sentence".to_string()),
				stop: None,
			},
			QualityIteration {
				iteration: 2,
				score: 0.91,
				cost_usd: 0.07,
				passed: true,
				violation: None,
				stop: Some(StopReason::Threshold),
			},
		],
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STATDOC_PG_DSN to run."]
async fn schema_bootstraps_and_jobs_round_trip() {
	let Some(base_dsn) = statdoc_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstraps_and_jobs_round_trip; set STATDOC_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let store = PgJobStore::new(db, &queue_cfg(60, 3));
	let params =
		JobParams { subject: "needle decompression".to_string(), context: Some("adult".to_string()) };
	let job = store.enqueue(&params).await.expect("Failed to enqueue.");

	assert_eq!(job.status, "QUEUED");
	assert_eq!(job.attempt, 0);

	let fetched = store.get(job.job_id).await.expect("Failed to get job.").expect("Job missing.");

	assert_eq!(fetched.subject, "needle decompression");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STATDOC_PG_DSN to run."]
async fn concurrent_claims_have_one_winner() {
	let Some(base_dsn) = statdoc_testkit::env_dsn() else {
		eprintln!("Skipping concurrent_claims_have_one_winner; set STATDOC_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let store = std::sync::Arc::new(PgJobStore::new(db, &queue_cfg(60, 3)));

	store
		.enqueue(&JobParams { subject: "chest tube".to_string(), context: None })
		.await
		.expect("Failed to enqueue.");

	let now = OffsetDateTime::now_utc();
	let lhs = {
		let store = store.clone();

		tokio::spawn(async move { store.claim_next("worker-a", now).await.expect("claim failed") })
	};
	let rhs = {
		let store = store.clone();

		tokio::spawn(async move { store.claim_next("worker-b", now).await.expect("claim failed") })
	};
	let lhs = lhs.await.expect("join failed");
	let rhs = rhs.await.expect("join failed");

	assert!(lhs.is_some() != rhs.is_some(), "exactly one claimer must win");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STATDOC_PG_DSN to run."]
async fn completion_persists_artifact_sources_and_iterations() {
	let Some(base_dsn) = statdoc_testkit::env_dsn() else {
		eprintln!(
			"Skipping completion_persists_artifact_sources_and_iterations; set STATDOC_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let store = PgJobStore::new(db, &queue_cfg(60, 3));
	let job = store
		.enqueue(&JobParams { subject: "tension pneumothorax".to_string(), context: None })
		.await
		.expect("Failed to enqueue.");
	let now = OffsetDateTime::now_utc();
	let claimed = store.claim_next("worker-a", now).await.expect("claim failed").expect("no job");

	assert_eq!(claimed.attempt, 1);
	assert_eq!(
		store.heartbeat(job.job_id, "worker-a", now + Duration::seconds(5)).await.unwrap(),
		LeaseState::Held
	);

	let bundle = bundle_for(job.job_id, now);

	store.complete(job.job_id, "worker-a", &bundle).await.expect("complete failed");

	let done = store.get(job.job_id).await.unwrap().expect("Job missing.");

	assert_eq!(done.status, "DONE");
	assert!((done.cost_spent_usd - 0.12).abs() < 1e-9);

	let artifact = done.artifact().expect("artifact decode failed").expect("artifact missing");

	assert_eq!(artifact.stop_reason, StopReason::Threshold);

	let sources = store.sources_for_job(job.job_id).await.expect("sources query failed");
	let iterations = store.iterations_for_job(job.job_id).await.expect("iterations query failed");

	assert_eq!(sources.len(), 1);
	assert_eq!(iterations.len(), 2);
	assert_eq!(iterations[0].passed, false);
	assert_eq!(iterations[1].stop_reason.as_deref(), Some("threshold"));

	// Every citation in the artifact resolves to a persisted source record.
	for source_id in &artifact.source_ids {
		assert!(sources.iter().any(|source| source.source_id == *source_id));
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set STATDOC_PG_DSN to run."]
async fn corpus_ingestion_dedupes_by_text_hash() {
	let Some(base_dsn) = statdoc_testkit::env_dsn() else {
		eprintln!("Skipping corpus_ingestion_dedupes_by_text_hash; set STATDOC_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let doc = IngestDocument {
		origin: SourceOrigin::Ingested,
		title: "Airway guideline",
		url: None,
		external_ref: None,
		tier: "clinical_practice_guideline",
		published_at: None,
		raw_text: "Preoxygenate before induction.  Prepare suction.",
	};
	let first = ingest_document(&db, &doc).await.expect("ingest failed");
	let second = ingest_document(&db, &doc).await.expect("re-ingest failed");

	assert_eq!(first, second, "identical material must not be registered twice");

	let corpus = load_corpus(&db).await.expect("corpus load failed");

	assert_eq!(corpus.len(), 1);
	assert_eq!(corpus[0].text, "Preoxygenate before induction. Prepare suction.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
