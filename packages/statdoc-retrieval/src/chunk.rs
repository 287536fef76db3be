use statdoc_domain::EvidenceChunk;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

/// Splits normalized text into sentence-bounded chunks of at most
/// `max_chars`, carrying `overlap_chars` of trailing context into the next
/// chunk. A single sentence longer than the budget becomes its own chunk.
pub fn split_text(doc_id: Uuid, text: &str, cfg: &statdoc_config::Chunking) -> Vec<EvidenceChunk> {
	let max_chars = cfg.max_chars as usize;
	let overlap_chars = cfg.overlap_chars as usize;
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;
	let mut chunk_index = 0_i32;

	for (idx, sentence) in text.split_sentence_bound_indices() {
		let candidate_chars = current.chars().count() + sentence.chars().count();

		if candidate_chars > max_chars && !current.is_empty() {
			chunks.push(EvidenceChunk {
				doc_id,
				chunk_index,
				start_offset: current_start,
				end_offset: last_end,
				text: current.trim().to_string(),
			});

			chunk_index += 1;

			let overlap = overlap_tail(&current, overlap_chars);

			current_start = last_end.saturating_sub(overlap.len());
			current = overlap;
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(sentence);

		last_end = idx + sentence.len();
	}

	let trimmed = current.trim();

	if !trimmed.is_empty() {
		chunks.push(EvidenceChunk {
			doc_id,
			chunk_index,
			start_offset: current_start,
			end_offset: last_end,
			text: trimmed.to_string(),
		});
	}

	chunks
}

fn overlap_tail(text: &str, overlap_chars: usize) -> String {
	if overlap_chars == 0 {
		return String::new();
	}

	let total = text.chars().count();

	if total <= overlap_chars {
		return text.to_string();
	}

	let skip = total - overlap_chars;

	text.chars().skip(skip).collect()
}
