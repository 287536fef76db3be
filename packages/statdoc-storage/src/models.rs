use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use statdoc_domain::{Artifact, EvidenceGap, JobStatus};

use crate::{Error, Result};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct JobRow {
	pub job_id: Uuid,
	pub subject: String,
	pub context: Option<String>,
	pub status: String,
	pub attempt: i32,
	pub lease_owner: Option<String>,
	pub lease_expiry: Option<OffsetDateTime>,
	pub heartbeat_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
	pub gap: Option<Value>,
	pub ack_token: Option<String>,
	pub artifact: Option<Value>,
	pub cost_spent_usd: f64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl JobRow {
	pub fn status(&self) -> Result<JobStatus> {
		JobStatus::parse(&self.status)
			.ok_or_else(|| Error::InvalidArgument(format!("Unknown job status {:?}.", self.status)))
	}

	pub fn gap(&self) -> Result<Option<EvidenceGap>> {
		match self.gap.as_ref() {
			Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
			None => Ok(None),
		}
	}

	pub fn artifact(&self) -> Result<Option<Artifact>> {
		match self.artifact.as_ref() {
			Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
			None => Ok(None),
		}
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SourceRow {
	pub source_id: Uuid,
	pub job_id: Uuid,
	pub origin: String,
	pub title: String,
	pub url: Option<String>,
	pub external_ref: Option<String>,
	pub raw_hash: String,
	pub text_hash: String,
	pub tier: String,
	pub retrieved_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct IterationRow {
	pub job_id: Uuid,
	pub attempt: i32,
	pub iteration: i32,
	pub score: f32,
	pub cost_usd: f64,
	pub passed: bool,
	pub violation: Option<String>,
	pub stop_reason: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CorpusDocRow {
	pub doc_id: Uuid,
	pub origin: String,
	pub title: String,
	pub url: Option<String>,
	pub external_ref: Option<String>,
	pub tier: String,
	pub published_at: Option<OffsetDateTime>,
	pub raw_hash: String,
	pub text_hash: String,
	pub text: String,
	pub ingested_at: OffsetDateTime,
}
