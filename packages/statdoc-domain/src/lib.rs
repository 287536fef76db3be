pub mod citation;
pub mod cost;
pub mod job;
pub mod quality;
pub mod score;
pub mod source;

pub use citation::{CitationPolicy, ValidationReport, Violation, ViolationKind};
pub use cost::{CostLedger, TokenUsage, usage_cost_usd};
pub use job::{Artifact, EvidenceGap, JobParams, JobStatus, LeaseState, StopReason};
pub use quality::{QualityIteration, score_draft};
pub use score::{CompositeScore, EvidencePolicy, SourceSignals};
pub use source::{EvidenceChunk, SourceDocument, SourceOrigin, SourceRecord};
