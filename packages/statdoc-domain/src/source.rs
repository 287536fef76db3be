use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SourceOrigin {
	Ingested,
	Fetched,
	CorpusMatch,
}
impl SourceOrigin {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ingested => "INGESTED",
			Self::Fetched => "FETCHED",
			Self::CorpusMatch => "CORPUS_MATCH",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"INGESTED" => Some(Self::Ingested),
			"FETCHED" => Some(Self::Fetched),
			"CORPUS_MATCH" => Some(Self::CorpusMatch),
			_ => None,
		}
	}
}

/// A registry document as retrieval sees it: normalized text plus the
/// provenance fields that feed tier scoring and the audit trail.
#[derive(Clone, Debug)]
pub struct SourceDocument {
	pub doc_id: Uuid,
	pub origin: SourceOrigin,
	pub title: String,
	pub url: Option<String>,
	pub external_ref: Option<String>,
	pub tier: String,
	pub published_at: Option<OffsetDateTime>,
	pub raw_hash: String,
	pub text_hash: String,
	pub text: String,
}

/// Per-job audit record of one source used as evidence. Append-only; never
/// mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceRecord {
	pub source_id: Uuid,
	pub job_id: Uuid,
	pub origin: SourceOrigin,
	pub title: String,
	pub url: Option<String>,
	pub external_ref: Option<String>,
	pub raw_hash: String,
	pub text_hash: String,
	pub tier: String,
	pub retrieved_at: OffsetDateTime,
}
impl SourceRecord {
	pub fn from_document(job_id: Uuid, doc: &SourceDocument, now: OffsetDateTime) -> Self {
		Self {
			source_id: Uuid::new_v4(),
			job_id,
			origin: doc.origin,
			title: doc.title.clone(),
			url: doc.url.clone(),
			external_ref: doc.external_ref.clone(),
			raw_hash: doc.raw_hash.clone(),
			text_hash: doc.text_hash.clone(),
			tier: doc.tier.clone(),
			retrieved_at: now,
		}
	}
}

/// A bounded span of one document's normalized text, produced at retrieval
/// time. Owned by exactly one source; never persisted.
#[derive(Clone, Debug)]
pub struct EvidenceChunk {
	pub doc_id: Uuid,
	pub chunk_index: i32,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

pub fn content_hash(bytes: &[u8]) -> String {
	blake3::hash(bytes).to_hex().to_string()
}

/// NFC-normalize and collapse runs of whitespace. Hash identity of a source's
/// text is always taken over this form.
pub fn normalize_text(raw: &str) -> String {
	let composed: String = raw.nfc().collect();
	let mut out = String::with_capacity(composed.len());
	let mut pending_space = false;

	for ch in composed.chars() {
		if ch.is_whitespace() {
			pending_space = !out.is_empty();

			continue;
		}
		if pending_space {
			out.push(' ');

			pending_space = false;
		}

		out.push(ch);
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalization_collapses_whitespace() {
		assert_eq!(normalize_text("  a\n\n b\tc  "), "a b c");
	}

	#[test]
	fn normalization_is_idempotent() {
		let once = normalize_text("Rapid  sequence\nintubation");
		let twice = normalize_text(&once);

		assert_eq!(once, twice);
	}

	#[test]
	fn hashes_are_stable_hex() {
		let lhs = content_hash(b"needle decompression");
		let rhs = content_hash(b"needle decompression");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.len(), 64);
	}

	#[test]
	fn origin_round_trips_through_text() {
		for origin in [SourceOrigin::Ingested, SourceOrigin::Fetched, SourceOrigin::CorpusMatch] {
			assert_eq!(SourceOrigin::parse(origin.as_str()), Some(origin));
		}
	}
}
