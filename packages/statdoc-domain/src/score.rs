use regex::Regex;
use time::OffsetDateTime;

/// Recency fallback for sources with no publication date.
const UNKNOWN_AGE_RECENCY: f32 = 0.5;

#[derive(Clone, Copy, Debug)]
pub struct CompositeScore {
	pub provenance: f32,
	pub recency: f32,
	pub quality: f32,
	pub total: f32,
}

pub struct SourceSignals<'a> {
	pub tier: &'a str,
	pub published_at: Option<OffsetDateTime>,
	pub text: &'a str,
}

/// Composite trust scoring over the fixed tier hierarchy, recency and
/// structural content signals. All weights and patterns come from
/// configuration.
pub struct EvidencePolicy {
	tiers: Vec<(String, u32)>,
	min_priority: u32,
	max_priority: u32,
	tier_floor: f32,
	recency_tau_days: f32,
	weight_provenance: f32,
	weight_recency: f32,
	weight_quality: f32,
	structure_patterns: Vec<Regex>,
	length_min_chars: usize,
	length_max_chars: usize,
	domain_terms: Vec<String>,
}
impl EvidencePolicy {
	pub fn new(cfg: &statdoc_config::Evidence) -> Result<Self, regex::Error> {
		let mut tiers: Vec<(String, u32)> =
			cfg.tiers.iter().map(|(tier, priority)| (tier.clone(), *priority)).collect();

		tiers.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1).then_with(|| lhs.0.cmp(&rhs.0)));

		let min_priority = tiers.iter().map(|(_, priority)| *priority).min().unwrap_or(1);
		let max_priority = tiers.iter().map(|(_, priority)| *priority).max().unwrap_or(1);
		let mut structure_patterns = Vec::with_capacity(cfg.quality.structure_patterns.len());

		for pattern in &cfg.quality.structure_patterns {
			structure_patterns.push(Regex::new(pattern)?);
		}

		Ok(Self {
			tiers,
			min_priority,
			max_priority,
			tier_floor: cfg.tier_floor,
			recency_tau_days: cfg.recency_tau_days,
			weight_provenance: cfg.weights.provenance,
			weight_recency: cfg.weights.recency,
			weight_quality: cfg.weights.quality,
			structure_patterns,
			length_min_chars: cfg.quality.length_min_chars as usize,
			length_max_chars: cfg.quality.length_max_chars as usize,
			domain_terms: cfg.quality.domain_terms.iter().map(|term| term.to_lowercase()).collect(),
		})
	}

	pub fn score(&self, signals: &SourceSignals<'_>, now: OffsetDateTime) -> CompositeScore {
		let provenance = self.tier_norm(signals.tier);
		let recency = self.recency(signals.published_at, now);
		let quality = self.content_quality(signals.text);
		let weight_sum = self.weight_provenance + self.weight_recency + self.weight_quality;
		let total = (self.weight_provenance * provenance
			+ self.weight_recency * recency
			+ self.weight_quality * quality)
			/ weight_sum;

		CompositeScore { provenance, recency, quality, total }
	}

	/// Maps a tier priority into [floor, 1.0]. An unclassified tier lands on
	/// the floor, never on zero, so it can still reach a usable trust band.
	pub fn tier_norm(&self, tier: &str) -> f32 {
		let priority = self
			.tiers
			.iter()
			.find(|(name, _)| name == tier)
			.map(|(_, priority)| *priority)
			.unwrap_or(self.min_priority);

		if self.max_priority <= self.min_priority {
			return 1.0;
		}

		let span = (self.max_priority - self.min_priority) as f32;
		let pos = (priority - self.min_priority) as f32;

		self.tier_floor + (1.0 - self.tier_floor) * (pos / span)
	}

	fn recency(&self, published_at: Option<OffsetDateTime>, now: OffsetDateTime) -> f32 {
		let Some(published_at) = published_at else {
			return UNKNOWN_AGE_RECENCY;
		};
		let age_days = ((now - published_at).as_seconds_f32() / 86_400.0).max(0.0);

		(-age_days / self.recency_tau_days).exp()
	}

	fn content_quality(&self, text: &str) -> f32 {
		let structure = if self.structure_patterns.is_empty() {
			0.0
		} else {
			let hits =
				self.structure_patterns.iter().filter(|pattern| pattern.is_match(text)).count();

			hits as f32 / self.structure_patterns.len() as f32
		};
		let chars = text.chars().count();
		let length = if chars < self.length_min_chars {
			chars as f32 / self.length_min_chars as f32
		} else if chars > self.length_max_chars {
			self.length_max_chars as f32 / chars as f32
		} else {
			1.0
		};
		let density = self.term_density(text);

		0.4 * structure + 0.3 * length + 0.3 * density
	}

	/// Domain-term hits per hundred words, saturating at five.
	fn term_density(&self, text: &str) -> f32 {
		if self.domain_terms.is_empty() {
			return 0.0;
		}

		let lowered = text.to_lowercase();
		let words = lowered.split_whitespace().count().max(1);
		let hits: usize =
			self.domain_terms.iter().map(|term| lowered.matches(term.as_str()).count()).sum();
		let per_hundred = hits as f32 * 100.0 / words as f32;

		(per_hundred / 5.0).clamp(0.0, 1.0)
	}
}

#[cfg(test)]
mod tests {
	use time::Duration;

	use super::*;

	fn policy() -> EvidencePolicy {
		EvidencePolicy::new(&statdoc_config::Evidence::default()).unwrap()
	}

	fn now() -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
	}

	#[test]
	fn top_tier_normalizes_to_one() {
		let policy = policy();

		assert!((policy.tier_norm("clinical_practice_guideline") - 1.0).abs() < 1e-6);
	}

	#[test]
	fn lowest_tier_is_bounded_away_from_zero() {
		let policy = policy();

		assert!(policy.tier_norm("unclassified") >= 0.15);
		assert!(policy.tier_norm("tier_nobody_configured") >= 0.15);
	}

	#[test]
	fn tier_order_is_respected() {
		let policy = policy();

		assert!(
			policy.tier_norm("systematic_review") > policy.tier_norm("case_report"),
			"higher tier must outrank lower tier"
		);
	}

	#[test]
	fn recency_decreases_with_age() {
		let policy = policy();
		let young = SourceSignals {
			tier: "textbook",
			published_at: Some(now() - Duration::days(30)),
			text: "short",
		};
		let old = SourceSignals {
			tier: "textbook",
			published_at: Some(now() - Duration::days(3_000)),
			text: "short",
		};

		assert!(policy.score(&young, now()).recency > policy.score(&old, now()).recency);
	}

	#[test]
	fn structural_signals_raise_quality() {
		let policy = policy();
		let plain = "Airway management overview with dose guidance for sedation.";
		let structured = format!("{plain}\n\nMethods\nCohort design.\n\nReferences\n1. Trial.");
		let lhs = policy.score(
			&SourceSignals { tier: "textbook", published_at: None, text: plain },
			now(),
		);
		let rhs = policy.score(
			&SourceSignals { tier: "textbook", published_at: None, text: &structured },
			now(),
		);

		assert!(rhs.quality > lhs.quality);
	}

	#[test]
	fn composite_stays_in_unit_range() {
		let policy = policy();
		let score = policy.score(
			&SourceSignals {
				tier: "clinical_practice_guideline",
				published_at: Some(now()),
				text: "Resuscitation dose triage airway hemorrhage. References",
			},
			now(),
		);

		assert!(score.total > 0.0 && score.total <= 1.0);
	}
}
