use ahash::{AHashMap, AHashSet};

#[derive(Clone, Copy, Debug)]
pub struct Bm25Params {
	pub k1: f32,
	pub b: f32,
}

/// Lowercased alphanumeric tokens of at least two characters, in first-seen
/// order, deduplicated.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = AHashSet::new();

	for token in normalized.split_whitespace() {
		if token.chars().count() < 2 {
			continue;
		}
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
	}

	out
}

fn term_frequencies(text: &str) -> (AHashMap<String, u32>, u32) {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut counts = AHashMap::new();
	let mut total = 0_u32;

	for token in normalized.split_whitespace() {
		if token.chars().count() < 2 {
			continue;
		}

		*counts.entry(token.to_string()).or_insert(0) += 1;
		total += 1;
	}

	(counts, total)
}

/// Okapi BM25 over an in-memory chunk pool. Built once per ranking pass;
/// scoring is pure and deterministic.
pub struct Bm25Index {
	doc_terms: Vec<AHashMap<String, u32>>,
	doc_lens: Vec<u32>,
	doc_freq: AHashMap<String, u32>,
	avg_len: f32,
	params: Bm25Params,
}
impl Bm25Index {
	pub fn build(texts: &[&str], params: Bm25Params) -> Self {
		let mut doc_terms = Vec::with_capacity(texts.len());
		let mut doc_lens = Vec::with_capacity(texts.len());
		let mut doc_freq: AHashMap<String, u32> = AHashMap::new();

		for text in texts {
			let (counts, total) = term_frequencies(text);

			for term in counts.keys() {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}

			doc_terms.push(counts);
			doc_lens.push(total);
		}

		let avg_len = if doc_lens.is_empty() {
			0.0
		} else {
			doc_lens.iter().sum::<u32>() as f32 / doc_lens.len() as f32
		};

		Self { doc_terms, doc_lens, doc_freq, avg_len, params }
	}

	pub fn score(&self, query_tokens: &[String], doc_idx: usize) -> f32 {
		let Some(terms) = self.doc_terms.get(doc_idx) else {
			return 0.0;
		};
		let doc_len = self.doc_lens.get(doc_idx).copied().unwrap_or(0) as f32;
		let total_docs = self.doc_terms.len() as f32;
		let mut score = 0.0_f32;

		for token in query_tokens {
			let Some(tf) = terms.get(token.as_str()).copied() else {
				continue;
			};
			let df = self.doc_freq.get(token.as_str()).copied().unwrap_or(0) as f32;
			let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
			let tf = tf as f32;
			let norm = if self.avg_len > 0.0 {
				1.0 - self.params.b + self.params.b * doc_len / self.avg_len
			} else {
				1.0
			};

			score += idf * tf * (self.params.k1 + 1.0) / (tf + self.params.k1 * norm);
		}

		score
	}
}
