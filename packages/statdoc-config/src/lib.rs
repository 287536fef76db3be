mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, Document, Evidence, EvidenceQuality, EvidenceWeights,
	GenerationProviderConfig, Postgres, Pricing, Providers, Quality, QualityWeights, Queue,
	RerankProviderConfig, Retrieval, Service, Storage, Validation,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.lease_secs <= 0 {
		return Err(Error::Validation {
			message: "queue.lease_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.max_attempts < 1 {
		return Err(Error::Validation { message: "queue.max_attempts must be at least 1.".to_string() });
	}
	if cfg.queue.poll_interval_ms <= 0 {
		return Err(Error::Validation {
			message: "queue.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.idle_backoff_max_ms < cfg.queue.poll_interval_ms {
		return Err(Error::Validation {
			message: "queue.idle_backoff_max_ms must be at least queue.poll_interval_ms.".to_string(),
		});
	}
	if cfg.providers.generation.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.generation.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.generation.max_retries == 0 {
		return Err(Error::Validation {
			message: "providers.generation.max_retries must be greater than zero.".to_string(),
		});
	}
	if let Some(rerank) = cfg.providers.rerank.as_ref()
		&& rerank.api_key.trim().is_empty()
	{
		return Err(Error::Validation {
			message: "providers.rerank.api_key must be non-empty when rerank is configured."
				.to_string(),
		});
	}
	if cfg.retrieval.max_candidates == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_candidates must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.per_origin_cap == 0 {
		return Err(Error::Validation {
			message: "retrieval.per_origin_cap must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.candidate_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.candidate_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 || cfg.retrieval.top_k > cfg.retrieval.candidate_k {
		return Err(Error::Validation {
			message: "retrieval.top_k must be in the range 1..=retrieval.candidate_k.".to_string(),
		});
	}
	if cfg.retrieval.per_source_chunks == 0 {
		return Err(Error::Validation {
			message: "retrieval.per_source_chunks must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.bm25_k1 <= 0.0 || !cfg.retrieval.bm25_k1.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.bm25_k1 must be a positive finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.bm25_b) {
		return Err(Error::Validation {
			message: "retrieval.bm25_b must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.rerank_weight) {
		return Err(Error::Validation {
			message: "retrieval.rerank_weight must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.retrieval.chunking.max_chars == 0 {
		return Err(Error::Validation {
			message: "retrieval.chunking.max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.chunking.overlap_chars >= cfg.retrieval.chunking.max_chars {
		return Err(Error::Validation {
			message: "retrieval.chunking.overlap_chars must be less than retrieval.chunking.max_chars."
				.to_string(),
		});
	}
	if cfg.evidence.tiers.is_empty() {
		return Err(Error::Validation {
			message: "evidence.tiers must contain at least one tier.".to_string(),
		});
	}

	for (tier, priority) in &cfg.evidence.tiers {
		if *priority == 0 {
			return Err(Error::Validation {
				message: format!("evidence.tiers.{tier} priority must be greater than zero."),
			});
		}
	}

	if !(0.0..1.0).contains(&cfg.evidence.tier_floor) || cfg.evidence.tier_floor == 0.0 {
		return Err(Error::Validation {
			message: "evidence.tier_floor must be greater than zero and less than 1.0.".to_string(),
		});
	}
	if cfg.evidence.recency_tau_days <= 0.0 || !cfg.evidence.recency_tau_days.is_finite() {
		return Err(Error::Validation {
			message: "evidence.recency_tau_days must be a positive finite number.".to_string(),
		});
	}

	for (label, weight) in [
		("provenance", cfg.evidence.weights.provenance),
		("recency", cfg.evidence.weights.recency),
		("quality", cfg.evidence.weights.quality),
	] {
		if weight < 0.0 || !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("evidence.weights.{label} must be zero or a positive finite number."),
			});
		}
	}

	let evidence_weight_sum =
		cfg.evidence.weights.provenance + cfg.evidence.weights.recency + cfg.evidence.weights.quality;

	if evidence_weight_sum <= 0.0 {
		return Err(Error::Validation {
			message: "evidence.weights must sum to a positive number.".to_string(),
		});
	}
	if cfg.evidence.quality.length_min_chars >= cfg.evidence.quality.length_max_chars {
		return Err(Error::Validation {
			message: "evidence.quality.length_min_chars must be less than length_max_chars."
				.to_string(),
		});
	}

	for pattern in cfg
		.evidence
		.quality
		.structure_patterns
		.iter()
		.chain(cfg.validation.exempt_patterns.iter())
	{
		if let Err(err) = regex::Regex::new(pattern) {
			return Err(Error::Validation {
				message: format!("Invalid regex pattern {pattern:?}: {err}."),
			});
		}
	}

	if cfg.validation.min_factual_words == 0 {
		return Err(Error::Validation {
			message: "validation.min_factual_words must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.quality.threshold) {
		return Err(Error::Validation {
			message: "quality.threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.quality.max_iterations == 0 {
		return Err(Error::Validation {
			message: "quality.max_iterations must be greater than zero.".to_string(),
		});
	}
	if cfg.quality.cost_cap_usd <= 0.0 || !cfg.quality.cost_cap_usd.is_finite() {
		return Err(Error::Validation {
			message: "quality.cost_cap_usd must be a positive finite number.".to_string(),
		});
	}
	if cfg.quality.min_billable_usd <= 0.0 || cfg.quality.min_billable_usd > cfg.quality.cost_cap_usd
	{
		return Err(Error::Validation {
			message: "quality.min_billable_usd must be positive and no greater than quality.cost_cap_usd."
				.to_string(),
		});
	}

	for (label, weight) in [
		("coverage", cfg.quality.weights.coverage),
		("utilization", cfg.quality.weights.utilization),
		("structure", cfg.quality.weights.structure),
		("length", cfg.quality.weights.length),
	] {
		if weight < 0.0 || !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("quality.weights.{label} must be zero or a positive finite number."),
			});
		}
	}

	let quality_weight_sum = cfg.quality.weights.coverage
		+ cfg.quality.weights.utilization
		+ cfg.quality.weights.structure
		+ cfg.quality.weights.length;

	if quality_weight_sum <= 0.0 {
		return Err(Error::Validation {
			message: "quality.weights must sum to a positive number.".to_string(),
		});
	}
	if cfg.quality.pricing.input_usd_per_1k < 0.0 || cfg.quality.pricing.output_usd_per_1k < 0.0 {
		return Err(Error::Validation {
			message: "quality.pricing rates must be zero or greater.".to_string(),
		});
	}
	if cfg.document.sections.is_empty() {
		return Err(Error::Validation {
			message: "document.sections must contain at least one section.".to_string(),
		});
	}
	if cfg.document.target_words == 0 {
		return Err(Error::Validation {
			message: "document.target_words must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.validation.exempt_patterns.retain(|pattern| !pattern.trim().is_empty());
	cfg.evidence.quality.structure_patterns.retain(|pattern| !pattern.trim().is_empty());
	cfg.evidence.quality.domain_terms.retain(|term| !term.trim().is_empty());
	cfg.document.sections.retain(|section| !section.trim().is_empty());

	if cfg.document.disclaimer.trim().is_empty() {
		cfg.document.disclaimer = Document::default().disclaimer;
	}
}
