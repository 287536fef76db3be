use serde::{Deserialize, Serialize};

use crate::{citation::ValidationReport, job::StopReason};

/// One attempt of the revise-and-validate cycle. Append-only, owned by its
/// job; the final entry of a loop carries the stop reason.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityIteration {
	pub iteration: u32,
	pub score: f32,
	pub cost_usd: f64,
	pub passed: bool,
	pub violation: Option<String>,
	pub stop: Option<StopReason>,
}

/// Scores one generated draft on the fixed quality dimensions: citation
/// coverage, evidence utilization, section structure and length adequacy.
/// Weights come from configuration; the result is in [0, 1].
pub fn score_draft(
	text: &str,
	report: &ValidationReport,
	provided_sources: u32,
	document: &statdoc_config::Document,
	weights: &statdoc_config::QualityWeights,
) -> f32 {
	let coverage = report.coverage();
	let utilization = if provided_sources == 0 {
		0.0
	} else {
		(report.cited_keys.len() as f32 / provided_sources as f32).clamp(0.0, 1.0)
	};
	let structure = section_fraction(text, &document.sections);
	let length = length_adequacy(text, document.target_words);
	let weight_sum = weights.coverage + weights.utilization + weights.structure + weights.length;

	(weights.coverage * coverage
		+ weights.utilization * utilization
		+ weights.structure * structure
		+ weights.length * length)
		/ weight_sum
}

fn section_fraction(text: &str, sections: &[String]) -> f32 {
	if sections.is_empty() {
		return 1.0;
	}

	let lowered = text.to_lowercase();
	let present = sections
		.iter()
		.filter(|section| {
			let needle = section.to_lowercase();

			lowered.lines().any(|line| {
				let line = line.trim_start_matches('#').trim();

				line.eq_ignore_ascii_case(needle.as_str()) || line.to_lowercase().starts_with(&needle)
			})
		})
		.count();

	present as f32 / sections.len() as f32
}

/// 1.0 inside a tolerance band around the target word count, tapering
/// linearly outside it.
fn length_adequacy(text: &str, target_words: u32) -> f32 {
	let words = text.split_whitespace().count().max(1) as f32;
	let target = target_words.max(1) as f32;
	let ratio = words / target;

	if (0.6..=1.5).contains(&ratio) {
		1.0
	} else if ratio < 0.6 {
		ratio / 0.6
	} else {
		1.5 / ratio
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use super::*;
	use crate::citation::CitationPolicy;

	fn report_for(text: &str, known: &[&str]) -> ValidationReport {
		let policy = CitationPolicy::new(&statdoc_config::Validation::default()).unwrap();
		let keys: BTreeSet<String> = known.iter().map(|key| key.to_string()).collect();

		policy.validate(text, &keys)
	}

	#[test]
	fn fully_cited_structured_draft_scores_high() {
		let document = statdoc_config::Document::default();
		let body = "Confirm absent breath sounds on the affected side. [S1] ".repeat(90);
		let text = format!(
			"# Indications\n{body}\n# Contraindications\nNone absolute in arrest. [S2]\n# Equipment\nLarge-bore cannula sized for the patient. [S1]\n# Procedure\nInsert at the second intercostal space midclavicular line. [S2]\n# Complications\nVascular injury has been reported in case series. [S1]\n# Aftercare\nObserve for recurrence with serial examinations. [S2]"
		);
		let report = report_for(&text, &["S1", "S2"]);
		let score = score_draft(
			&text,
			&report,
			2,
			&document,
			&statdoc_config::QualityWeights::default(),
		);

		assert!(report.passed());
		assert!(score > 0.8, "expected high score, got {score}");
	}

	#[test]
	fn missing_sections_lower_the_score() {
		let document = statdoc_config::Document::default();
		let text = "Apply a tourniquet proximal to the bleeding site. [S1]";
		let report = report_for(text, &["S1"]);
		let score = score_draft(
			text,
			&report,
			1,
			&document,
			&statdoc_config::QualityWeights::default(),
		);

		assert!(score < 0.8);
	}

	#[test]
	fn unused_evidence_lowers_utilization() {
		let document = statdoc_config::Document::default();
		let text = "Give adenosine with a rapid saline flush. [S1]";
		let report = report_for(text, &["S1"]);
		let narrow = score_draft(
			text,
			&report,
			1,
			&document,
			&statdoc_config::QualityWeights::default(),
		);
		let wide = score_draft(
			text,
			&report,
			8,
			&document,
			&statdoc_config::QualityWeights::default(),
		);

		assert!(narrow > wide);
	}
}
