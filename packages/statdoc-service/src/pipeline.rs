use time::OffsetDateTime;
use uuid::Uuid;

use statdoc_domain::{EvidenceGap, SourceDocument};
use statdoc_storage::{CompletionBundle, JobStore, models::JobRow};

use crate::{
	Error, Result,
	evidence::build_evidence,
	generate::{GenerationRequest, Generator},
	quality_loop::run_quality_loop,
};

pub enum ProcessOutcome {
	Completed(Box<CompletionBundle>),
	EvidenceGap(EvidenceGap),
}

/// Runs one claimed job through the strictly sequential stages: retrieval,
/// evidence registration, quality loop. Cancellation (and lease loss) is
/// checked between stages, never mid-stage; the terminal transition itself
/// is left to the worker. Re-running on a re-claimed job restarts from the
/// beginning against a fresh corpus snapshot.
pub async fn process_job(
	job: &JobRow,
	corpus: &[SourceDocument],
	generator: &dyn Generator,
	store: &dyn JobStore,
	cfg: &statdoc_config::Config,
) -> Result<ProcessOutcome> {
	let worker_id = job.lease_owner.as_deref().ok_or(Error::LeaseLost)?;
	let query = match job.context.as_deref() {
		Some(context) => format!("{} {context}", job.subject),
		None => job.subject.clone(),
	};
	let now = OffsetDateTime::now_utc();
	let evidence = build_evidence(job.job_id, &query, corpus, cfg, now).await?;
	let Some(evidence) = evidence else {
		return Ok(ProcessOutcome::EvidenceGap(EvidenceGap {
			query,
			corpus_docs: corpus.len() as u32,
			detail: "Candidate search over the registry returned no usable evidence; \
acknowledge the gap to re-queue once sources are ingested."
				.to_string(),
		}));
	};

	ensure_still_held(store, job.job_id, worker_id).await?;

	let request = GenerationRequest {
		subject: job.subject.clone(),
		context: job.context.clone(),
		snippets: evidence.snippets.clone(),
		sections: cfg.document.sections.clone(),
		target_words: cfg.document.target_words,
		disclaimer: cfg.document.disclaimer.clone(),
		feedback: None,
	};
	let outcome = run_quality_loop(generator, &request, &evidence, cfg).await?;

	ensure_still_held(store, job.job_id, worker_id).await?;

	Ok(ProcessOutcome::Completed(Box::new(CompletionBundle {
		artifact: outcome.artifact,
		sources: evidence.records,
		iterations: outcome.iterations,
	})))
}

/// Between-stage guard: the job must still be Running under this worker's
/// lease. A cancelled job aborts cleanly; anything else owning the job means
/// the lease was lost to a reclaim.
async fn ensure_still_held(store: &dyn JobStore, job_id: Uuid, worker_id: &str) -> Result<()> {
	let Some(current) = store.get(job_id).await? else {
		return Err(Error::NotFound { message: format!("Job {job_id} disappeared.") });
	};

	match current.status.as_str() {
		"CANCELLED" => Err(Error::Cancelled),
		"RUNNING" if current.lease_owner.as_deref() == Some(worker_id) => Ok(()),
		_ => Err(Error::LeaseLost),
	}
}
