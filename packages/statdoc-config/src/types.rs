use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub queue: Queue,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub evidence: Evidence,
	#[serde(default)]
	pub validation: Validation,
	pub quality: Quality,
	#[serde(default)]
	pub document: Document,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Queue {
	pub lease_secs: i64,
	pub max_attempts: i32,
	pub poll_interval_ms: i64,
	pub idle_backoff_max_ms: i64,
}
impl Default for Queue {
	fn default() -> Self {
		Self { lease_secs: 60, max_attempts: 3, poll_interval_ms: 500, idle_backoff_max_ms: 15_000 }
	}
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub generation: GenerationProviderConfig,
	pub rerank: Option<RerankProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default = "default_generation_max_retries")]
	pub max_retries: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub max_candidates: u32,
	pub min_doc_chars: u32,
	pub per_origin_cap: u32,
	pub candidate_k: u32,
	pub top_k: u32,
	pub per_source_chunks: u32,
	pub bm25_k1: f32,
	pub bm25_b: f32,
	pub rerank_weight: f32,
	pub chunking: Chunking,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			max_candidates: 24,
			min_doc_chars: 280,
			per_origin_cap: 12,
			candidate_k: 48,
			top_k: 12,
			per_source_chunks: 3,
			bm25_k1: 1.2,
			bm25_b: 0.75,
			rerank_weight: 0.7,
			chunking: Chunking::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Chunking {
	pub max_chars: u32,
	pub overlap_chars: u32,
}
impl Default for Chunking {
	fn default() -> Self {
		Self { max_chars: 1_200, overlap_chars: 160 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Evidence {
	pub tiers: HashMap<String, u32>,
	pub tier_floor: f32,
	pub recency_tau_days: f32,
	pub weights: EvidenceWeights,
	pub quality: EvidenceQuality,
}
impl Default for Evidence {
	fn default() -> Self {
		Self {
			tiers: default_tiers(),
			tier_floor: 0.15,
			recency_tau_days: 1_460.0,
			weights: EvidenceWeights::default(),
			quality: EvidenceQuality::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EvidenceWeights {
	pub provenance: f32,
	pub recency: f32,
	pub quality: f32,
}
impl Default for EvidenceWeights {
	fn default() -> Self {
		Self { provenance: 0.5, recency: 0.25, quality: 0.25 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EvidenceQuality {
	pub structure_patterns: Vec<String>,
	pub length_min_chars: u32,
	pub length_max_chars: u32,
	pub domain_terms: Vec<String>,
}
impl Default for EvidenceQuality {
	fn default() -> Self {
		Self {
			structure_patterns: vec![
				r"(?im)^\s*(references|bibliography)\b".to_string(),
				r"(?im)^\s*(methods|methodology)\b".to_string(),
			],
			length_min_chars: 400,
			length_max_chars: 120_000,
			domain_terms: vec![
				"airway".to_string(),
				"contraindication".to_string(),
				"dose".to_string(),
				"hemorrhage".to_string(),
				"intravenous".to_string(),
				"resuscitation".to_string(),
				"sedation".to_string(),
				"triage".to_string(),
			],
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Validation {
	pub exempt_patterns: Vec<String>,
	pub min_factual_words: u32,
}
impl Default for Validation {
	fn default() -> Self {
		Self {
			exempt_patterns: vec![
				r"^#{1,6}\s+\S".to_string(),
				r"(?i)^this document does not replace clinical judgment\.?$".to_string(),
			],
			min_factual_words: 4,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Quality {
	pub threshold: f32,
	pub max_iterations: u32,
	pub cost_cap_usd: f64,
	pub min_billable_usd: f64,
	#[serde(default)]
	pub weights: QualityWeights,
	pub pricing: Pricing,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
	pub coverage: f32,
	pub utilization: f32,
	pub structure: f32,
	pub length: f32,
}
impl Default for QualityWeights {
	fn default() -> Self {
		Self { coverage: 0.4, utilization: 0.25, structure: 0.25, length: 0.1 }
	}
}

#[derive(Debug, Deserialize)]
pub struct Pricing {
	pub input_usd_per_1k: f64,
	pub output_usd_per_1k: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Document {
	pub sections: Vec<String>,
	pub target_words: u32,
	pub disclaimer: String,
}
impl Default for Document {
	fn default() -> Self {
		Self {
			sections: vec![
				"Indications".to_string(),
				"Contraindications".to_string(),
				"Equipment".to_string(),
				"Procedure".to_string(),
				"Complications".to_string(),
				"Aftercare".to_string(),
			],
			target_words: 900,
			disclaimer: "This document does not replace clinical judgment.".to_string(),
		}
	}
}

fn default_generation_max_retries() -> u32 {
	3
}

fn default_tiers() -> HashMap<String, u32> {
	HashMap::from([
		("clinical_practice_guideline".to_string(), 10),
		("systematic_review".to_string(), 9),
		("randomized_controlled_trial".to_string(), 8),
		("cohort_study".to_string(), 7),
		("case_control_study".to_string(), 6),
		("case_series".to_string(), 5),
		("case_report".to_string(), 4),
		("narrative_review".to_string(), 3),
		("textbook".to_string(), 2),
		("unclassified".to_string(), 1),
	])
}
