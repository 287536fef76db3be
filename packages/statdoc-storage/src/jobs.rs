use std::{future::Future, pin::Pin};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use statdoc_domain::{
	Artifact, EvidenceGap, JobParams, LeaseState, QualityIteration, SourceRecord,
	job::attempts_exhausted,
};

use crate::{Error, Result, db::Db, models::JobRow};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const JOB_COLUMNS: &str = "\
job_id, subject, context, status, attempt, lease_owner, lease_expiry, heartbeat_at, last_error, \
gap, ack_token, artifact, cost_spent_usd, created_at, updated_at";

/// Everything a worker persists on the successful terminal transition.
/// Written in one transaction so a terminal job is always consistent with
/// its audit trail.
#[derive(Clone, Debug)]
pub struct CompletionBundle {
	pub artifact: Artifact,
	pub sources: Vec<SourceRecord>,
	pub iterations: Vec<QualityIteration>,
}

/// Queue backing store. Every transition is a single compare-and-set
/// operation; two stores implement it, Postgres here and an in-memory double
/// in the testkit.
pub trait JobStore
where
	Self: Send + Sync,
{
	fn enqueue<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, Result<JobRow>>;

	/// Atomically claims the oldest Queued or stale Running job. Exactly one
	/// concurrent caller receives any given job; the others observe `None`.
	fn claim_next<'a>(
		&'a self,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<JobRow>>>;

	/// Extends the caller's lease. A lease that has already expired is lost,
	/// never resurrected.
	fn heartbeat<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<LeaseState>>;

	fn complete<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		bundle: &'a CompletionBundle,
	) -> BoxFuture<'a, Result<()>>;

	fn fail<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		error: &'a str,
	) -> BoxFuture<'a, Result<()>>;

	fn mark_needs_ack<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		gap: &'a EvidenceGap,
	) -> BoxFuture<'a, Result<()>>;

	/// External acknowledgement of an evidence gap: NeedsAck back to Queued,
	/// with the token persisted for audit.
	fn acknowledge<'a>(&'a self, job_id: Uuid, token: &'a str) -> BoxFuture<'a, Result<JobRow>>;

	fn cancel<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<JobRow>>;

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<JobRow>>>;

	fn list<'a>(&'a self, limit: i64) -> BoxFuture<'a, Result<Vec<JobRow>>>;
}

pub struct PgJobStore {
	db: Db,
	lease_secs: i64,
	max_attempts: i32,
}
impl PgJobStore {
	pub fn new(db: Db, cfg: &statdoc_config::Queue) -> Self {
		Self { db, lease_secs: cfg.lease_secs, max_attempts: cfg.max_attempts }
	}

	pub async fn sources_for_job(&self, job_id: Uuid) -> Result<Vec<crate::models::SourceRow>> {
		let rows = sqlx::query_as::<_, crate::models::SourceRow>(
			"SELECT * FROM job_sources WHERE job_id = $1 ORDER BY retrieved_at ASC, source_id ASC",
		)
		.bind(job_id)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows)
	}

	pub async fn iterations_for_job(&self, job_id: Uuid) -> Result<Vec<crate::models::IterationRow>> {
		let rows = sqlx::query_as::<_, crate::models::IterationRow>(
			"SELECT * FROM job_iterations WHERE job_id = $1 ORDER BY attempt ASC, iteration ASC",
		)
		.bind(job_id)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows)
	}

}
impl JobStore for PgJobStore {
	fn enqueue<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, Result<JobRow>> {
		Box::pin(async move {
			if params.subject.trim().is_empty() {
				return Err(Error::InvalidArgument("Job subject must be non-empty.".to_string()));
			}

			let sql = format!(
				"\
INSERT INTO jobs (job_id, subject, context)
VALUES ($1, $2, $3)
RETURNING {JOB_COLUMNS}"
			);
			let row = sqlx::query_as::<_, JobRow>(&sql)
				.bind(Uuid::new_v4())
				.bind(params.subject.trim())
				.bind(params.context.as_deref())
				.fetch_one(&self.db.pool)
				.await?;

			Ok(row)
		})
	}

	fn claim_next<'a>(
		&'a self,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<JobRow>>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;
			let sql = format!(
				"\
SELECT {JOB_COLUMNS}
FROM jobs
WHERE status = 'QUEUED' OR (status = 'RUNNING' AND lease_expiry <= $1)
ORDER BY created_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
			);
			let row = sqlx::query_as::<_, JobRow>(&sql)
				.bind(now)
				.fetch_optional(&mut *tx)
				.await?;
			let Some(mut job) = row else {
				tx.commit().await?;

				return Ok(None);
			};

			// A stale job that already spent its attempt budget routes to
			// Failed inside the same claim sweep.
			if job.status == "RUNNING" && attempts_exhausted(job.attempt, self.max_attempts) {
				sqlx::query(
					"\
UPDATE jobs
SET status = 'FAILED',
	last_error = $1,
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $2
WHERE job_id = $3",
				)
				.bind(format!(
					"Maximum attempts exceeded after {} of {} attempts.",
					job.attempt, self.max_attempts
				))
				.bind(now)
				.bind(job.job_id)
				.execute(&mut *tx)
				.await?;
				tx.commit().await?;

				tracing::warn!(job_id = %job.job_id, attempt = job.attempt, "Stale job exhausted its attempts. Routed to FAILED.");

				return Ok(None);
			}

			let lease_expiry = now + Duration::seconds(self.lease_secs);

			sqlx::query(
				"\
UPDATE jobs
SET status = 'RUNNING',
	attempt = attempt + 1,
	lease_owner = $1,
	lease_expiry = $2,
	heartbeat_at = $3,
	updated_at = $3
WHERE job_id = $4",
			)
			.bind(worker_id)
			.bind(lease_expiry)
			.bind(now)
			.bind(job.job_id)
			.execute(&mut *tx)
			.await?;
			tx.commit().await?;

			job.status = "RUNNING".to_string();
			job.attempt += 1;
			job.lease_owner = Some(worker_id.to_string());
			job.lease_expiry = Some(lease_expiry);
			job.heartbeat_at = Some(now);
			job.updated_at = now;

			Ok(Some(job))
		})
	}

	fn heartbeat<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<LeaseState>> {
		Box::pin(async move {
			let lease_expiry = now + Duration::seconds(self.lease_secs);
			let result = sqlx::query(
				"\
UPDATE jobs
SET lease_expiry = $1,
	heartbeat_at = $2,
	updated_at = $2
WHERE job_id = $3 AND status = 'RUNNING' AND lease_owner = $4 AND lease_expiry > $2",
			)
			.bind(lease_expiry)
			.bind(now)
			.bind(job_id)
			.bind(worker_id)
			.execute(&self.db.pool)
			.await?;

			if result.rows_affected() == 0 {
				return Ok(LeaseState::Lost);
			}

			Ok(LeaseState::Held)
		})
	}

	fn complete<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		bundle: &'a CompletionBundle,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let artifact = serde_json::to_value(&bundle.artifact)?;
			let mut tx = self.db.pool.begin().await?;
			let sql = "\
UPDATE jobs
SET status = 'DONE',
	artifact = $4,
	cost_spent_usd = $5,
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $1
WHERE job_id = $2 AND status = 'RUNNING' AND lease_owner = $3 AND lease_expiry > $1
RETURNING attempt";
			let attempt: Option<(i32,)> = sqlx::query_as(sql)
				.bind(now)
				.bind(job_id)
				.bind(worker_id)
				.bind(artifact)
				.bind(bundle.artifact.cost_usd)
				.fetch_optional(&mut *tx)
				.await?;
			let Some((attempt,)) = attempt else {
				return Err(Error::Conflict(format!(
					"Job {job_id} is not running under lease of {worker_id}."
				)));
			};

			for source in &bundle.sources {
				sqlx::query(
					"\
INSERT INTO job_sources (
	source_id, job_id, origin, title, url, external_ref, raw_hash, text_hash, tier, retrieved_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
				)
				.bind(source.source_id)
				.bind(source.job_id)
				.bind(source.origin.as_str())
				.bind(source.title.as_str())
				.bind(source.url.as_deref())
				.bind(source.external_ref.as_deref())
				.bind(source.raw_hash.as_str())
				.bind(source.text_hash.as_str())
				.bind(source.tier.as_str())
				.bind(source.retrieved_at)
				.execute(&mut *tx)
				.await?;
			}

			for iteration in &bundle.iterations {
				sqlx::query(
					"\
INSERT INTO job_iterations (job_id, attempt, iteration, score, cost_usd, passed, violation, stop_reason)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
				)
				.bind(job_id)
				.bind(attempt)
				.bind(iteration.iteration as i32)
				.bind(iteration.score)
				.bind(iteration.cost_usd)
				.bind(iteration.passed)
				.bind(iteration.violation.as_deref())
				.bind(iteration.stop.map(|stop| stop.as_str()))
				.execute(&mut *tx)
				.await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn fail<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		error: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let result = sqlx::query(
				"\
UPDATE jobs
SET status = 'FAILED',
	last_error = $4,
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $1
WHERE job_id = $2 AND status = 'RUNNING' AND lease_owner = $3 AND lease_expiry > $1",
			)
			.bind(now)
			.bind(job_id)
			.bind(worker_id)
			.bind(error)
			.execute(&self.db.pool)
			.await?;

			if result.rows_affected() == 0 {
				return Err(Error::Conflict(format!(
					"Job {job_id} is not running under lease of {worker_id}."
				)));
			}

			Ok(())
		})
	}

	fn mark_needs_ack<'a>(
		&'a self,
		job_id: Uuid,
		worker_id: &'a str,
		gap: &'a EvidenceGap,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let gap_value = serde_json::to_value(gap)?;
			let result = sqlx::query(
				"\
UPDATE jobs
SET status = 'NEEDS_ACK',
	gap = $4,
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $1
WHERE job_id = $2 AND status = 'RUNNING' AND lease_owner = $3 AND lease_expiry > $1",
			)
			.bind(now)
			.bind(job_id)
			.bind(worker_id)
			.bind(gap_value)
			.execute(&self.db.pool)
			.await?;

			if result.rows_affected() == 0 {
				return Err(Error::Conflict(format!(
					"Job {job_id} is not running under lease of {worker_id}."
				)));
			}

			Ok(())
		})
	}

	fn acknowledge<'a>(&'a self, job_id: Uuid, token: &'a str) -> BoxFuture<'a, Result<JobRow>> {
		Box::pin(async move {
			if token.trim().is_empty() {
				return Err(Error::InvalidArgument(
					"Acknowledgement token must be non-empty.".to_string(),
				));
			}

			let now = OffsetDateTime::now_utc();
			let sql = format!(
				"\
UPDATE jobs
SET status = 'QUEUED',
	ack_token = $1,
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $2
WHERE job_id = $3 AND status = 'NEEDS_ACK'
RETURNING {JOB_COLUMNS}"
			);
			let row = sqlx::query_as::<_, JobRow>(&sql)
				.bind(token.trim())
				.bind(now)
				.bind(job_id)
				.fetch_optional(&self.db.pool)
				.await?;

			match row {
				Some(row) => Ok(row),
				None => match self.get(job_id).await? {
					Some(job) => Err(Error::Conflict(format!(
						"Job {job_id} is {} and cannot be acknowledged.",
						job.status
					))),
					None => Err(Error::NotFound(format!("Job {job_id} does not exist."))),
				},
			}
		})
	}

	fn cancel<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<JobRow>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let sql = format!(
				"\
UPDATE jobs
SET status = 'CANCELLED',
	lease_owner = NULL,
	lease_expiry = NULL,
	updated_at = $1
WHERE job_id = $2 AND status IN ('QUEUED', 'RUNNING', 'NEEDS_ACK')
RETURNING {JOB_COLUMNS}"
			);
			let row = sqlx::query_as::<_, JobRow>(&sql)
				.bind(now)
				.bind(job_id)
				.fetch_optional(&self.db.pool)
				.await?;

			match row {
				Some(row) => Ok(row),
				None => match self.get(job_id).await? {
					Some(job) => Err(Error::Conflict(format!(
						"Job {job_id} is {} and cannot be cancelled.",
						job.status
					))),
					None => Err(Error::NotFound(format!("Job {job_id} does not exist."))),
				},
			}
		})
	}

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<JobRow>>> {
		Box::pin(async move {
			let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1");
			let row = sqlx::query_as::<_, JobRow>(&sql)
				.bind(job_id)
				.fetch_optional(&self.db.pool)
				.await?;

			Ok(row)
		})
	}

	fn list<'a>(&'a self, limit: i64) -> BoxFuture<'a, Result<Vec<JobRow>>> {
		Box::pin(async move {
			let sql = format!(
				"SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, job_id DESC LIMIT $1"
			);
			let rows = sqlx::query_as::<_, JobRow>(&sql)
				.bind(limit.max(1))
				.fetch_all(&self.db.pool)
				.await?;

			Ok(rows)
		})
	}
}
