use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration as StdDuration,
};

use color_eyre::Result;
use time::OffsetDateTime;
use tokio::time as tokio_time;
use uuid::Uuid;

use statdoc_domain::LeaseState;
use statdoc_service::{Generator, ProcessOutcome, process_job};
use statdoc_storage::{JobStore, PgJobStore, corpus, db::Db};

const MAX_PERSISTED_ERROR_CHARS: usize = 1_024;

pub struct WorkerState {
	pub db: Db,
	pub store: Arc<PgJobStore>,
	pub generator: Arc<dyn Generator>,
	pub config: Arc<statdoc_config::Config>,
	pub worker_id: String,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll_ms = state.config.queue.poll_interval_ms;
	let idle_max_ms = state.config.queue.idle_backoff_max_ms;
	let jitter_ms = jitter_for_worker(&state.worker_id, poll_ms);
	let mut idle_ms = poll_ms;

	tracing::info!(worker_id = %state.worker_id, jitter_ms, "Worker started.");

	loop {
		match process_once(&state).await {
			Ok(true) => {
				idle_ms = poll_ms;
			},
			Ok(false) => {
				idle_ms = (idle_ms.saturating_mul(2)).min(idle_max_ms);
			},
			Err(err) => {
				tracing::error!(error = %err, "Worker pass failed.");

				idle_ms = (idle_ms.saturating_mul(2)).min(idle_max_ms);
			},
		}

		tokio_time::sleep(StdDuration::from_millis((idle_ms + jitter_ms) as u64)).await;
	}
}

/// Claims and fully processes at most one job. Returns whether a job was
/// claimed, so the poll loop can back off when the queue is idle.
async fn process_once(state: &WorkerState) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) = state.store.claim_next(&state.worker_id, now).await? else {
		return Ok(false);
	};

	tracing::info!(job_id = %job.job_id, attempt = job.attempt, subject = %job.subject, "Claimed job.");

	let guard = LeaseGuard::spawn(
		state.store.clone(),
		job.job_id,
		state.worker_id.clone(),
		state.config.queue.lease_secs,
	);
	// Snapshot the registry once per attempt; retrieval over the snapshot is
	// deterministic, so a re-claimed job reproduces the same evidence.
	let corpus = match corpus::load_corpus(&state.db).await {
		Ok(corpus) => corpus,
		Err(err) => {
			guard.stop();

			// Not terminal: the lease expires and the job is re-claimed,
			// which is the only recovery path and counts the attempt.
			tracing::error!(job_id = %job.job_id, error = %err, "Corpus snapshot failed. Leaving job to lease recovery.");

			return Ok(true);
		},
	};
	let result = process_job(
		&job,
		&corpus,
		state.generator.as_ref(),
		state.store.as_ref() as &dyn JobStore,
		&state.config,
	)
	.await;

	guard.stop();

	if guard.lease_lost() {
		tracing::warn!(job_id = %job.job_id, "Lease lost during processing. Dropping result.");

		return Ok(true);
	}

	match result {
		Ok(ProcessOutcome::Completed(bundle)) => {
			state.store.complete(job.job_id, &state.worker_id, &bundle).await?;

			tracing::info!(
				job_id = %job.job_id,
				score = bundle.artifact.score,
				iterations = bundle.artifact.iterations_used,
				cost_usd = bundle.artifact.cost_usd,
				stop_reason = bundle.artifact.stop_reason.as_str(),
				"Job completed."
			);
		},
		Ok(ProcessOutcome::EvidenceGap(gap)) => {
			state.store.mark_needs_ack(job.job_id, &state.worker_id, &gap).await?;

			tracing::warn!(job_id = %job.job_id, query = %gap.query, "Evidence gap. Job needs acknowledgement.");
		},
		Err(statdoc_service::Error::Cancelled) => {
			tracing::info!(job_id = %job.job_id, "Job cancelled. Aborted between stages.");
		},
		Err(statdoc_service::Error::LeaseLost) => {
			tracing::warn!(job_id = %job.job_id, "Job no longer held. Dropping result.");
		},
		Err(err) => {
			let reason = sanitize_error_text(&err.to_string());

			if let Err(fail_err) = state.store.fail(job.job_id, &state.worker_id, &reason).await {
				tracing::warn!(job_id = %job.job_id, error = %fail_err, "Failed to persist job failure.");
			}

			tracing::error!(job_id = %job.job_id, error = %err, "Job failed.");
		},
	}

	Ok(true)
}

/// Background lease refresher for the duration of one job. External calls
/// can outlast the lease, so the guard beats at a third of it; losing the
/// lease trips a flag the worker checks before any terminal write.
struct LeaseGuard {
	handle: tokio::task::JoinHandle<()>,
	lost: Arc<AtomicBool>,
}
impl LeaseGuard {
	fn spawn(store: Arc<PgJobStore>, job_id: Uuid, worker_id: String, lease_secs: i64) -> Self {
		let lost = Arc::new(AtomicBool::new(false));
		let flag = lost.clone();
		let interval_ms = (lease_secs.saturating_mul(1_000) / 3).max(1_000) as u64;
		let handle = tokio::spawn(async move {
			let mut ticker = tokio_time::interval(StdDuration::from_millis(interval_ms));

			ticker.tick().await;

			loop {
				ticker.tick().await;

				let now = OffsetDateTime::now_utc();

				match store.heartbeat(job_id, &worker_id, now).await {
					Ok(LeaseState::Held) => {},
					Ok(LeaseState::Lost) => {
						tracing::warn!(job_id = %job_id, "Heartbeat found the lease lost.");
						flag.store(true, Ordering::SeqCst);

						break;
					},
					Err(err) => {
						tracing::warn!(job_id = %job_id, error = %err, "Heartbeat failed.");
					},
				}
			}
		});

		Self { handle, lost }
	}

	fn lease_lost(&self) -> bool {
		self.lost.load(Ordering::SeqCst)
	}

	fn stop(&self) {
		self.handle.abort();
	}
}
impl Drop for LeaseGuard {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

/// Deterministic per-worker poll offset so a fleet does not claim in
/// lockstep.
fn jitter_for_worker(worker_id: &str, poll_ms: i64) -> i64 {
	if poll_ms <= 1 {
		return 0;
	}

	let sum: u64 = worker_id.bytes().map(|byte| byte as u64).sum();

	(sum % (poll_ms as u64 / 2 + 1)) as i64
}

fn sanitize_error_text(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_PERSISTED_ERROR_CHARS {
		out = out.chars().take(MAX_PERSISTED_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
