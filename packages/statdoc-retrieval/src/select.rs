use ahash::{AHashMap, AHashSet};
use statdoc_domain::{SourceDocument, SourceOrigin};

use crate::{bm25, cmp_f32_desc};

/// One stage-one hit: a registry document worth chunk-level ranking.
#[derive(Clone, Copy, Debug)]
pub struct CandidateDoc<'a> {
	pub doc: &'a SourceDocument,
	pub score: f32,
}

/// Fast candidate-document selection. Scores whole documents by
/// rarity-weighted query-token overlap, drops documents below the minimum
/// normalized-text length, caps candidates per provenance origin and bounds
/// the result to `max_candidates`. Zero hits is a valid outcome, not an
/// error.
pub fn select_candidates<'a>(
	query: &str,
	corpus: &'a [SourceDocument],
	cfg: &statdoc_config::Retrieval,
) -> Vec<CandidateDoc<'a>> {
	let query_tokens = bm25::tokenize(query);

	if query_tokens.is_empty() || corpus.is_empty() {
		return Vec::new();
	}

	let doc_tokens: Vec<AHashSet<String>> =
		corpus.iter().map(|doc| bm25::tokenize(&doc.text).into_iter().collect()).collect();
	let mut doc_freq: AHashMap<&str, u32> = AHashMap::new();

	for token in &query_tokens {
		let df = doc_tokens.iter().filter(|tokens| tokens.contains(token.as_str())).count() as u32;

		doc_freq.insert(token.as_str(), df);
	}

	let total_docs = corpus.len() as f32;
	let mut scored: Vec<CandidateDoc<'a>> = Vec::new();

	for (idx, doc) in corpus.iter().enumerate() {
		if doc.text.chars().count() < cfg.min_doc_chars as usize {
			continue;
		}

		let mut score = 0.0_f32;

		for token in &query_tokens {
			if !doc_tokens[idx].contains(token.as_str()) {
				continue;
			}

			let df = doc_freq.get(token.as_str()).copied().unwrap_or(0) as f32;

			score += (1.0 + (total_docs + 1.0) / (df + 1.0)).ln();
		}

		if score > 0.0 {
			scored.push(CandidateDoc { doc, score });
		}
	}

	scored.sort_by(|lhs, rhs| {
		cmp_f32_desc(lhs.score, rhs.score).then_with(|| lhs.doc.doc_id.cmp(&rhs.doc.doc_id))
	});

	let mut per_origin: AHashMap<SourceOrigin, u32> = AHashMap::new();
	let mut out = Vec::new();

	for candidate in scored {
		let taken = per_origin.entry(candidate.doc.origin).or_insert(0);

		if *taken >= cfg.per_origin_cap {
			continue;
		}

		*taken += 1;

		out.push(candidate);

		if out.len() >= cfg.max_candidates as usize {
			break;
		}
	}

	out
}
