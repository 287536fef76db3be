use ahash::AHashMap;
use statdoc_domain::EvidenceChunk;
use uuid::Uuid;

use crate::{
	bm25::{Bm25Index, Bm25Params, tokenize},
	chunk::split_text,
	cmp_f32_desc, rank_normalize,
	select::CandidateDoc,
};

#[derive(Clone, Debug)]
pub struct RankedChunk {
	pub chunk: EvidenceChunk,
	pub lexical_score: f32,
	/// 1-based position in the lexical ordering of the candidate pool.
	pub retrieval_rank: u32,
	pub blended_score: f32,
}

/// Stage two, lexical half: chunk every candidate document, score chunks
/// with BM25 against the query and keep the best `candidate_k` as the pool
/// handed to the optional rerank stage. Ordering is fully deterministic.
pub fn rank_chunks(
	query: &str,
	candidates: &[CandidateDoc<'_>],
	cfg: &statdoc_config::Retrieval,
) -> Vec<RankedChunk> {
	let query_tokens = tokenize(query);

	if query_tokens.is_empty() || candidates.is_empty() {
		return Vec::new();
	}

	let mut chunks = Vec::new();
	let mut doc_order: AHashMap<Uuid, usize> = AHashMap::new();

	for (order, candidate) in candidates.iter().enumerate() {
		doc_order.insert(candidate.doc.doc_id, order);
		chunks.extend(split_text(candidate.doc.doc_id, &candidate.doc.text, &cfg.chunking));
	}

	if chunks.is_empty() {
		return Vec::new();
	}

	let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
	let index = Bm25Index::build(&texts, Bm25Params { k1: cfg.bm25_k1, b: cfg.bm25_b });
	let mut scored: Vec<(EvidenceChunk, f32)> = chunks
		.into_iter()
		.enumerate()
		.map(|(idx, chunk)| {
			let score = index.score(&query_tokens, idx);

			(chunk, score)
		})
		.collect();

	scored.sort_by(|lhs, rhs| {
		cmp_f32_desc(lhs.1, rhs.1)
			.then_with(|| {
				let lhs_order = doc_order.get(&lhs.0.doc_id).copied().unwrap_or(usize::MAX);
				let rhs_order = doc_order.get(&rhs.0.doc_id).copied().unwrap_or(usize::MAX);

				lhs_order.cmp(&rhs_order)
			})
			.then_with(|| lhs.0.chunk_index.cmp(&rhs.0.chunk_index))
	});
	scored.truncate(cfg.candidate_k as usize);

	let total = scored.len() as u32;

	scored
		.into_iter()
		.enumerate()
		.map(|(idx, (chunk, score))| {
			let retrieval_rank = idx as u32 + 1;

			RankedChunk {
				chunk,
				lexical_score: score,
				retrieval_rank,
				blended_score: rank_normalize(retrieval_rank, total),
			}
		})
		.collect()
}

/// Blends rerank scores into the pool: both orderings are rank-normalized
/// and combined with `rerank_weight`. A score slice that does not align with
/// the pool leaves the lexical ordering untouched.
pub fn apply_rerank_scores(pool: &mut [RankedChunk], scores: &[f32], rerank_weight: f32) {
	if pool.is_empty() {
		return;
	}
	if scores.len() != pool.len() {
		tracing::warn!(
			expected = pool.len(),
			got = scores.len(),
			"Rerank score count does not match candidate pool. Keeping lexical order."
		);

		return;
	}

	let total = pool.len() as u32;
	let mut idxs: Vec<usize> = (0..pool.len()).collect();

	idxs.sort_by(|&a, &b| {
		cmp_f32_desc(scores[a], scores[b])
			.then_with(|| pool[a].retrieval_rank.cmp(&pool[b].retrieval_rank))
	});

	let mut rerank_ranks = vec![0_u32; pool.len()];

	for (pos, idx) in idxs.into_iter().enumerate() {
		rerank_ranks[idx] = pos as u32 + 1;
	}

	for (idx, ranked) in pool.iter_mut().enumerate() {
		let rerank_norm = rank_normalize(rerank_ranks[idx], total);
		let lexical_norm = rank_normalize(ranked.retrieval_rank, total);

		ranked.blended_score = rerank_weight * rerank_norm + (1.0 - rerank_weight) * lexical_norm;
	}

	pool.sort_by(|lhs, rhs| {
		cmp_f32_desc(lhs.blended_score, rhs.blended_score)
			.then_with(|| lhs.retrieval_rank.cmp(&rhs.retrieval_rank))
	});
}

/// Final selection: cap chunks per source so no single source dominates the
/// evidence set, then bound to `top_k`.
pub fn finalize(pool: Vec<RankedChunk>, cfg: &statdoc_config::Retrieval) -> Vec<EvidenceChunk> {
	let mut per_source: AHashMap<Uuid, u32> = AHashMap::new();
	let mut out = Vec::new();

	for ranked in pool {
		let taken = per_source.entry(ranked.chunk.doc_id).or_insert(0);

		if *taken >= cfg.per_source_chunks {
			continue;
		}

		*taken += 1;

		out.push(ranked.chunk);

		if out.len() >= cfg.top_k as usize {
			break;
		}
	}

	out
}
