use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
	Queued,
	Running,
	Done,
	Failed,
	NeedsAck,
	Cancelled,
}
impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "QUEUED",
			Self::Running => "RUNNING",
			Self::Done => "DONE",
			Self::Failed => "FAILED",
			Self::NeedsAck => "NEEDS_ACK",
			Self::Cancelled => "CANCELLED",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"QUEUED" => Some(Self::Queued),
			"RUNNING" => Some(Self::Running),
			"DONE" => Some(Self::Done),
			"FAILED" => Some(Self::Failed),
			"NEEDS_ACK" => Some(Self::NeedsAck),
			"CANCELLED" => Some(Self::Cancelled),
			_ => None,
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Failed | Self::Cancelled)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobParams {
	pub subject: String,
	pub context: Option<String>,
}

/// The specific gap recorded when retrieval produces no usable evidence.
/// A NeedsAck job always carries one of these, never a generic failure text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceGap {
	pub query: String,
	pub corpus_docs: u32,
	pub detail: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
	Threshold,
	MaxIterations,
	CostCap,
}
impl StopReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Threshold => "threshold",
			Self::MaxIterations => "max_iterations",
			Self::CostCap => "cost_cap",
		}
	}
}

/// Final deliverable of a job. Written exactly once, on the terminal
/// transition; the text has always passed citation validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
	pub text: String,
	pub score: f32,
	pub iterations_used: u32,
	pub cost_usd: f64,
	pub stop_reason: StopReason,
	pub validation_warnings: u32,
	pub source_ids: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeaseState {
	Held,
	Lost,
}

/// Claim guard shared by every store implementation: a job is claimable when
/// it is Queued, or Running with an expired (or absent) lease.
pub fn claim_eligible(
	status: JobStatus,
	lease_expiry: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> bool {
	match status {
		JobStatus::Queued => true,
		JobStatus::Running => lease_expiry.map(|expiry| expiry <= now).unwrap_or(true),
		_ => false,
	}
}

/// A stale job that already spent its attempt budget routes to Failed
/// instead of being requeued.
pub fn attempts_exhausted(attempt: i32, max_attempts: i32) -> bool {
	attempt >= max_attempts
}

#[cfg(test)]
mod tests {
	use time::Duration;

	use super::*;

	fn now() -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
	}

	#[test]
	fn queued_jobs_are_claimable() {
		assert!(claim_eligible(JobStatus::Queued, None, now()));
	}

	#[test]
	fn running_jobs_with_live_lease_are_not_claimable() {
		let expiry = now() + Duration::seconds(30);

		assert!(!claim_eligible(JobStatus::Running, Some(expiry), now()));
	}

	#[test]
	fn running_jobs_with_expired_lease_are_claimable() {
		let expiry = now() - Duration::seconds(1);

		assert!(claim_eligible(JobStatus::Running, Some(expiry), now()));
	}

	#[test]
	fn terminal_and_gated_jobs_are_not_claimable() {
		for status in
			[JobStatus::Done, JobStatus::Failed, JobStatus::NeedsAck, JobStatus::Cancelled]
		{
			assert!(!claim_eligible(status, None, now()), "{status:?} must not be claimable");
		}
	}

	#[test]
	fn status_round_trips_through_text() {
		for status in [
			JobStatus::Queued,
			JobStatus::Running,
			JobStatus::Done,
			JobStatus::Failed,
			JobStatus::NeedsAck,
			JobStatus::Cancelled,
		] {
			assert_eq!(JobStatus::parse(status.as_str()), Some(status));
		}

		assert_eq!(JobStatus::parse("PENDING"), None);
	}

	#[test]
	fn attempt_budget_routes_to_failed() {
		assert!(!attempts_exhausted(2, 3));
		assert!(attempts_exhausted(3, 3));
	}
}
