use std::{collections::HashSet, sync::Arc};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use statdoc_domain::{
	Artifact, EvidenceGap, JobParams, LeaseState, QualityIteration, SourceOrigin, SourceRecord,
	StopReason,
};
use statdoc_storage::{CompletionBundle, Error, JobStore};
use statdoc_testkit::MemJobStore;

fn queue_cfg(lease_secs: i64, max_attempts: i32) -> statdoc_config::Queue {
	statdoc_config::Queue { lease_secs, max_attempts, ..Default::default() }
}

fn params(subject: &str) -> JobParams {
	JobParams { subject: subject.to_string(), context: None }
}

fn t0() -> OffsetDateTime {
	OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

fn bundle_for(job_id: Uuid) -> CompletionBundle {
	let source = SourceRecord {
		source_id: Uuid::new_v4(),
		job_id,
		origin: SourceOrigin::Ingested,
		title: "Trauma guideline".to_string(),
		url: None,
		external_ref: None,
		raw_hash: "a".repeat(64),
		text_hash: "b".repeat(64),
		tier: "clinical_practice_guideline".to_string(),
		retrieved_at: t0(),
	};
	let artifact = Artifact {
		text: "Decompress the chest at the second intercostal space. [S1]".to_string(),
		score: 0.91,
		iterations_used: 1,
		cost_usd: 0.08,
		stop_reason: StopReason::Threshold,
		validation_warnings: 0,
		source_ids: vec![source.source_id],
	};

	CompletionBundle {
		artifact,
		sources: vec![source],
		iterations: vec![QualityIteration {
			iteration: 1,
			score: 0.91,
			cost_usd: 0.08,
			passed: true,
			violation: None,
			stop: Some(StopReason::Threshold),
		}],
	}
}

#[tokio::test]
async fn two_concurrent_claimers_get_one_winner() {
	let store = Arc::new(MemJobStore::new(&queue_cfg(60, 3)));

	store.enqueue(&params("needle decompression")).await.unwrap();

	let now = t0();
	let lhs = {
		let store = store.clone();

		tokio::spawn(async move { store.claim_next("worker-a", now).await.unwrap() })
	};
	let rhs = {
		let store = store.clone();

		tokio::spawn(async move { store.claim_next("worker-b", now).await.unwrap() })
	};
	let lhs = lhs.await.unwrap();
	let rhs = rhs.await.unwrap();

	assert!(
		lhs.is_some() != rhs.is_some(),
		"exactly one concurrent claimer must win, got {lhs:?} and {rhs:?}"
	);
}

#[tokio::test]
async fn concurrent_claimers_never_share_a_job() {
	let store = Arc::new(MemJobStore::new(&queue_cfg(60, 3)));

	for nth in 0..5 {
		store.enqueue(&params(&format!("subject {nth}"))).await.unwrap();
	}

	let now = t0();
	let mut handles = Vec::new();

	for nth in 0..16 {
		let store = store.clone();
		let worker = format!("worker-{nth}");

		handles.push(tokio::spawn(async move {
			let mut claimed = Vec::new();

			while let Some(job) = store.claim_next(&worker, now).await.unwrap() {
				claimed.push(job.job_id);
			}

			claimed
		}));
	}

	let mut all_claims = Vec::new();

	for handle in handles {
		all_claims.extend(handle.await.unwrap());
	}

	let distinct: HashSet<Uuid> = all_claims.iter().copied().collect();

	assert_eq!(all_claims.len(), 5, "every job must be claimed exactly once");
	assert_eq!(distinct.len(), 5, "no job may be claimed by two workers while leased");
}

#[tokio::test]
async fn expired_lease_is_reclaimed_with_one_more_attempt() {
	let store = MemJobStore::new(&queue_cfg(30, 3));
	let job = store.enqueue(&params("chest tube")).await.unwrap();
	let first = store.claim_next("worker-a", t0()).await.unwrap().unwrap();

	assert_eq!(first.attempt, 1);

	// Within the lease the job is invisible to other claimers.
	assert!(store.claim_next("worker-b", t0() + Duration::seconds(10)).await.unwrap().is_none());

	let later = t0() + Duration::seconds(31);
	let second = store.claim_next("worker-b", later).await.unwrap().unwrap();

	assert_eq!(second.job_id, job.job_id);
	assert_eq!(second.attempt, 2, "reclaim must increment the attempt by exactly one");

	// The crashed worker's lease is gone; the new owner's is live.
	assert_eq!(
		store.heartbeat(job.job_id, "worker-a", later).await.unwrap(),
		LeaseState::Lost
	);
	assert_eq!(
		store.heartbeat(job.job_id, "worker-b", later + Duration::seconds(5)).await.unwrap(),
		LeaseState::Held
	);

	// The second worker finishes the job.
	store.complete(job.job_id, "worker-b", &bundle_for(job.job_id)).await.unwrap();

	let done = store.get(job.job_id).await.unwrap().unwrap();

	assert_eq!(done.status, "DONE");
	assert!(done.artifact.is_some());
	assert_eq!(done.attempt, 2);
}

#[tokio::test]
async fn heartbeat_extends_the_lease() {
	let store = MemJobStore::new(&queue_cfg(30, 3));
	let job = store.enqueue(&params("cricothyrotomy")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();

	let refreshed_at = t0() + Duration::seconds(25);

	assert_eq!(
		store.heartbeat(job.job_id, "worker-a", refreshed_at).await.unwrap(),
		LeaseState::Held
	);

	// Past the original expiry but inside the refreshed lease.
	let probe = t0() + Duration::seconds(40);

	assert!(store.claim_next("worker-b", probe).await.unwrap().is_none());
}

#[tokio::test]
async fn terminal_jobs_are_never_overwritten() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let job = store.enqueue(&params("tourniquet")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();
	store.complete(job.job_id, "worker-a", &bundle_for(job.job_id)).await.unwrap();

	let replay = store.complete(job.job_id, "worker-a", &bundle_for(job.job_id)).await;

	assert!(matches!(replay, Err(Error::Conflict(_))));

	let cancel = store.cancel(job.job_id).await;

	assert!(matches!(cancel, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn non_owner_cannot_transition_a_running_job() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let job = store.enqueue(&params("intraosseous access")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();

	let foreign = store.fail(job.job_id, "worker-b", "not mine").await;

	assert!(matches!(foreign, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn exhausted_attempts_route_to_failed() {
	let store = MemJobStore::new(&queue_cfg(30, 2));
	let job = store.enqueue(&params("pericardiocentesis")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();

	let second = store.claim_next("worker-b", t0() + Duration::seconds(31)).await.unwrap();

	assert_eq!(second.unwrap().attempt, 2);

	// Third expiry: the attempt budget is spent, so the sweep fails the job.
	let third = store.claim_next("worker-c", t0() + Duration::seconds(62)).await.unwrap();

	assert!(third.is_none());

	let failed = store.get(job.job_id).await.unwrap().unwrap();

	assert_eq!(failed.status, "FAILED");
	assert!(failed.last_error.unwrap().contains("Maximum attempts exceeded"));
}

#[tokio::test]
async fn evidence_gap_requires_acknowledgement_before_requeue() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let job = store.enqueue(&params("obscure procedure")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();

	let gap = EvidenceGap {
		query: "obscure procedure".to_string(),
		corpus_docs: 0,
		detail: "Candidate search over the registry returned no usable evidence.".to_string(),
	};

	store.mark_needs_ack(job.job_id, "worker-a", &gap).await.unwrap();

	let gated = store.get(job.job_id).await.unwrap().unwrap();

	assert_eq!(gated.status, "NEEDS_ACK");
	assert!(gated.gap.is_some(), "a NeedsAck job must carry the specific gap");

	// Gated jobs are not claimable.
	assert!(store.claim_next("worker-b", t0() + Duration::seconds(1)).await.unwrap().is_none());

	let requeued = store.acknowledge(job.job_id, "ok-2026-08-07").await.unwrap();

	assert_eq!(requeued.status, "QUEUED");
	assert_eq!(requeued.ack_token.as_deref(), Some("ok-2026-08-07"));

	let reclaimed = store.claim_next("worker-b", t0() + Duration::seconds(2)).await.unwrap();

	assert_eq!(reclaimed.unwrap().attempt, 2);
}

#[tokio::test]
async fn acknowledging_a_queued_job_is_a_conflict() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let job = store.enqueue(&params("splinting")).await.unwrap();
	let result = store.acknowledge(job.job_id, "token").await;

	assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn cancelled_jobs_reject_terminal_writes() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let job = store.enqueue(&params("gastric lavage")).await.unwrap();

	store.claim_next("worker-a", t0()).await.unwrap().unwrap();
	store.cancel(job.job_id).await.unwrap();

	let cancelled = store.get(job.job_id).await.unwrap().unwrap();

	assert_eq!(cancelled.status, "CANCELLED");

	let write = store.complete(job.job_id, "worker-a", &bundle_for(job.job_id)).await;

	assert!(matches!(write, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn oldest_eligible_job_is_claimed_first() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let first = store.enqueue(&params("first")).await.unwrap();
	let _second = store.enqueue(&params("second")).await.unwrap();
	let claimed = store.claim_next("worker-a", t0() + Duration::seconds(5)).await.unwrap();

	assert_eq!(claimed.unwrap().job_id, first.job_id);
}

#[tokio::test]
async fn empty_subject_is_rejected() {
	let store = MemJobStore::new(&queue_cfg(60, 3));
	let result = store.enqueue(&params("   ")).await;

	assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
