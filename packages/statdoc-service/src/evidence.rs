use std::collections::BTreeSet;

use time::OffsetDateTime;
use uuid::Uuid;

use statdoc_domain::{EvidencePolicy, SourceDocument, SourceRecord, SourceSignals};
use statdoc_retrieval::{apply_rerank_scores, finalize, rank_chunks, select_candidates};

use crate::{Result, generate::EvidenceSnippet};

/// The ranked, keyed evidence a job's quality loop works from. Source order
/// is composite-trust order; keys `S1..Sn` follow it.
#[derive(Clone, Debug)]
pub struct EvidenceSet {
	pub records: Vec<SourceRecord>,
	pub snippets: Vec<EvidenceSnippet>,
	pub known_keys: BTreeSet<String>,
	pub source_ids: Vec<Uuid>,
}

/// Runs both retrieval stages and assembles the evidence set. `Ok(None)`
/// means an evidence gap, which is an expected outcome, not an error; the
/// caller routes it to the acknowledgement path.
pub async fn build_evidence(
	job_id: Uuid,
	query: &str,
	corpus: &[SourceDocument],
	cfg: &statdoc_config::Config,
	now: OffsetDateTime,
) -> Result<Option<EvidenceSet>> {
	let candidates = select_candidates(query, corpus, &cfg.retrieval);

	if candidates.is_empty() {
		tracing::info!(%job_id, corpus_docs = corpus.len(), "Candidate search returned no documents.");

		return Ok(None);
	}

	let mut pool = rank_chunks(query, &candidates, &cfg.retrieval);

	if let Some(rerank_cfg) = cfg.providers.rerank.as_ref()
		&& !pool.is_empty()
	{
		let texts: Vec<String> = pool.iter().map(|ranked| ranked.chunk.text.clone()).collect();

		match statdoc_providers::rerank::rerank(rerank_cfg, query, &texts).await {
			Ok(scores) => apply_rerank_scores(&mut pool, &scores, cfg.retrieval.rerank_weight),
			Err(err) => {
				tracing::warn!(error = %err, "Rerank backend failed. Falling back to lexical order.");
			},
		}
	}

	let chunks = finalize(pool, &cfg.retrieval);

	if chunks.is_empty() {
		tracing::info!(%job_id, "Chunk ranking produced no evidence.");

		return Ok(None);
	}

	let policy = EvidencePolicy::new(&cfg.evidence)?;
	let mut used_docs: Vec<&SourceDocument> = Vec::new();

	for chunk in &chunks {
		if used_docs.iter().any(|doc| doc.doc_id == chunk.doc_id) {
			continue;
		}

		let Some(candidate) =
			candidates.iter().find(|candidate| candidate.doc.doc_id == chunk.doc_id)
		else {
			continue;
		};

		used_docs.push(candidate.doc);
	}

	let mut scored_docs: Vec<(&SourceDocument, f32)> = used_docs
		.into_iter()
		.map(|doc| {
			let signals = SourceSignals {
				tier: doc.tier.as_str(),
				published_at: doc.published_at,
				text: doc.text.as_str(),
			};

			(doc, policy.score(&signals, now).total)
		})
		.collect();

	scored_docs.sort_by(|lhs, rhs| {
		rhs.1
			.partial_cmp(&lhs.1)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| lhs.0.doc_id.cmp(&rhs.0.doc_id))
	});

	let mut records = Vec::with_capacity(scored_docs.len());
	let mut snippets = Vec::new();
	let mut known_keys = BTreeSet::new();
	let mut source_ids = Vec::with_capacity(scored_docs.len());

	for (nth, (doc, composite)) in scored_docs.iter().enumerate() {
		let key = format!("S{}", nth + 1);
		let record = SourceRecord::from_document(job_id, doc, now);

		tracing::debug!(%job_id, source_id = %record.source_id, key, composite, tier = %doc.tier, "Registered evidence source.");
		source_ids.push(record.source_id);
		records.push(record);
		known_keys.insert(key.clone());

		for chunk in chunks.iter().filter(|chunk| chunk.doc_id == doc.doc_id) {
			snippets.push(EvidenceSnippet {
				key: key.clone(),
				title: doc.title.clone(),
				tier: doc.tier.clone(),
				text: chunk.text.clone(),
			});
		}
	}

	Ok(Some(EvidenceSet { records, snippets, known_keys, source_ids }))
}
