use std::{
	collections::HashMap,
	sync::Mutex,
};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use statdoc_domain::{
	EvidenceGap, JobParams, LeaseState,
	job::{attempts_exhausted, claim_eligible},
};
use statdoc_storage::{
	BoxFuture, CompletionBundle, Error, JobStore, Result as StorageResult, models::JobRow,
};

struct Inner {
	order: Vec<Uuid>,
	jobs: HashMap<Uuid, JobRow>,
	completions: HashMap<Uuid, CompletionBundle>,
}

/// In-memory queue store with the same compare-and-set transition guards as
/// the Postgres store. Backs store-agnostic queue and pipeline tests; the
/// claim/heartbeat clock is caller-supplied so lease expiry is simulated
/// without sleeping.
pub struct MemJobStore {
	inner: Mutex<Inner>,
	lease_secs: i64,
	max_attempts: i32,
}
impl MemJobStore {
	pub fn new(cfg: &statdoc_config::Queue) -> Self {
		Self {
			inner: Mutex::new(Inner {
				order: Vec::new(),
				jobs: HashMap::new(),
				completions: HashMap::new(),
			}),
			lease_secs: cfg.lease_secs,
			max_attempts: cfg.max_attempts,
		}
	}

	/// The bundle persisted by the winning `complete` call, for assertions.
	pub fn completion(&self, job_id: Uuid) -> Option<CompletionBundle> {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.completions.get(&job_id).cloned()
	}

	fn with_running_job<T>(
		&self,
		job_id: Uuid,
		worker_id: &str,
		now: OffsetDateTime,
		apply: impl FnOnce(&mut JobRow, &mut Inner) -> T,
	) -> StorageResult<T> {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let inner_ref = &mut *inner;
		let Some(job) = inner_ref.jobs.get(&job_id) else {
			return Err(Error::NotFound(format!("Job {job_id} does not exist.")));
		};
		let held = job.status == "RUNNING"
			&& job.lease_owner.as_deref() == Some(worker_id)
			&& job.lease_expiry.map(|expiry| expiry > now).unwrap_or(false);

		if !held {
			return Err(Error::Conflict(format!(
				"Job {job_id} is not running under lease of {worker_id}."
			)));
		}

		let mut job = inner_ref.jobs.remove(&job_id).expect("job existence checked above");
		let out = apply(&mut job, inner_ref);

		job.lease_owner = None;
		job.lease_expiry = None;
		job.updated_at = now;

		inner_ref.jobs.insert(job_id, job);

		Ok(out)
	}
}
impl JobStore for MemJobStore {
	fn enqueue<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, StorageResult<JobRow>> {
		Box::pin(async move {
			if params.subject.trim().is_empty() {
				return Err(Error::InvalidArgument("Job subject must be non-empty.".to_string()));
			}

			let now = OffsetDateTime::now_utc();
			let row = JobRow {
				job_id: Uuid::new_v4(),
				subject: params.subject.trim().to_string(),
				context: params.context.clone(),
				status: "QUEUED".to_string(),
				attempt: 0,
				lease_owner: None,
				lease_expiry: None,
				heartbeat_at: None,
				last_error: None,
				gap: None,
				ack_token: None,
				artifact: None,
				cost_spent_usd: 0.0,
				created_at: now,
				updated_at: now,
			};
			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

			inner.order.push(row.job_id);
			inner.jobs.insert(row.job_id, row.clone());

			Ok(row)
		})
	}

	fn claim_next<'a>(
		&'a self,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<JobRow>>> {
		Box::pin(async move {
			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
			let order = inner.order.clone();

			for job_id in order {
				let Some(job) = inner.jobs.get_mut(&job_id) else {
					continue;
				};
				let Some(status) = statdoc_domain::JobStatus::parse(&job.status) else {
					continue;
				};

				if !claim_eligible(status, job.lease_expiry, now) {
					continue;
				}

				if job.status == "RUNNING" && attempts_exhausted(job.attempt, self.max_attempts) {
					job.status = "FAILED".to_string();
					job.last_error = Some(format!(
						"Maximum attempts exceeded after {} of {} attempts.",
						job.attempt, self.max_attempts
					));
					job.lease_owner = None;
					job.lease_expiry = None;
					job.updated_at = now;

					return Ok(None);
				}

				job.status = "RUNNING".to_string();
				job.attempt += 1;
				job.lease_owner = Some(worker_id.to_string());
				job.lease_expiry = Some(now + Duration::seconds(self.lease_secs));
				job.heartbeat_at = Some(now);
				job.updated_at = now;

				return Ok(Some(job.clone()));
			}

			Ok(None)
		})
	}

	fn heartbeat<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<LeaseState>> {
		Box::pin(async move {
			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
			let Some(job) = inner.jobs.get_mut(&job_id) else {
				return Ok(LeaseState::Lost);
			};
			let held = job.status == "RUNNING"
				&& job.lease_owner.as_deref() == Some(worker_id)
				&& job.lease_expiry.map(|expiry| expiry > now).unwrap_or(false);

			if !held {
				return Ok(LeaseState::Lost);
			}

			job.lease_expiry = Some(now + Duration::seconds(self.lease_secs));
			job.heartbeat_at = Some(now);
			job.updated_at = now;

			Ok(LeaseState::Held)
		})
	}

	fn complete<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		bundle: &'a CompletionBundle,
	) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let artifact = serde_json::to_value(&bundle.artifact)
				.map_err(|err| Error::Encoding(err.to_string()))?;

			self.with_running_job(job_id, worker_id, now, |job, inner| {
				job.status = "DONE".to_string();
				job.artifact = Some(artifact);
				job.cost_spent_usd = bundle.artifact.cost_usd;

				inner.completions.insert(job_id, bundle.clone());
			})
		})
	}

	fn fail<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		error: &'a str,
	) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			self.with_running_job(job_id, worker_id, now, |job, _| {
				job.status = "FAILED".to_string();
				job.last_error = Some(error.to_string());
			})
		})
	}

	fn mark_needs_ack<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		gap: &'a EvidenceGap,
	) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let gap_value =
				serde_json::to_value(gap).map_err(|err| Error::Encoding(err.to_string()))?;

			self.with_running_job(job_id, worker_id, now, |job, _| {
				job.status = "NEEDS_ACK".to_string();
				job.gap = Some(gap_value);
			})
		})
	}

	fn acknowledge<'a>(
		&'a self,
		job_id: Uuid,
		token: &'a str,
	) -> BoxFuture<'a, StorageResult<JobRow>> {
		Box::pin(async move {
			if token.trim().is_empty() {
				return Err(Error::InvalidArgument(
					"Acknowledgement token must be non-empty.".to_string(),
				));
			}

			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
			let Some(job) = inner.jobs.get_mut(&job_id) else {
				return Err(Error::NotFound(format!("Job {job_id} does not exist.")));
			};

			if job.status != "NEEDS_ACK" {
				return Err(Error::Conflict(format!(
					"Job {job_id} is {} and cannot be acknowledged.",
					job.status
				)));
			}

			job.status = "QUEUED".to_string();
			job.ack_token = Some(token.trim().to_string());
			job.lease_owner = None;
			job.lease_expiry = None;
			job.updated_at = OffsetDateTime::now_utc();

			Ok(job.clone())
		})
	}

	fn cancel<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, StorageResult<JobRow>> {
		Box::pin(async move {
			let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
			let Some(job) = inner.jobs.get_mut(&job_id) else {
				return Err(Error::NotFound(format!("Job {job_id} does not exist.")));
			};

			if !matches!(job.status.as_str(), "QUEUED" | "RUNNING" | "NEEDS_ACK") {
				return Err(Error::Conflict(format!(
					"Job {job_id} is {} and cannot be cancelled.",
					job.status
				)));
			}

			job.status = "CANCELLED".to_string();
			job.lease_owner = None;
			job.lease_expiry = None;
			job.updated_at = OffsetDateTime::now_utc();

			Ok(job.clone())
		})
	}

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, StorageResult<Option<JobRow>>> {
		Box::pin(async move {
			let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

			Ok(inner.jobs.get(&job_id).cloned())
		})
	}

	fn list<'a>(&'a self, limit: i64) -> BoxFuture<'a, StorageResult<Vec<JobRow>>> {
		Box::pin(async move {
			let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
			let mut out: Vec<JobRow> = inner
				.order
				.iter()
				.rev()
				.filter_map(|job_id| inner.jobs.get(job_id).cloned())
				.collect();

			out.truncate(limit.max(1) as usize);

			Ok(out)
		})
	}
}
