use std::collections::BTreeSet;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Inline citation tag, e.g. `[S3]`, binding a sentence to a per-job source
/// key.
const TAG_PATTERN: &str = r"\[S(\d+)\]";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViolationKind {
	MissingCitation,
	UnknownSource,
}
impl ViolationKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::MissingCitation => "missing_citation",
			Self::UnknownSource => "unknown_source",
		}
	}
}

#[derive(Clone, Debug)]
pub struct Violation {
	pub kind: ViolationKind,
	pub unit_index: u32,
	pub excerpt: String,
	/// The offending key for unknown-source violations.
	pub key: Option<String>,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
	pub violations: Vec<Violation>,
	pub cited_keys: BTreeSet<String>,
	pub factual_units: u32,
	pub cited_factual_units: u32,
	pub exempt_units: u32,
}
impl ValidationReport {
	pub fn passed(&self) -> bool {
		self.violations.is_empty()
	}

	pub fn coverage(&self) -> f32 {
		if self.factual_units == 0 {
			return 1.0;
		}

		self.cited_factual_units as f32 / self.factual_units as f32
	}

	pub fn describe_violations(&self) -> String {
		let mut parts = Vec::with_capacity(self.violations.len());

		for violation in &self.violations {
			match violation.kind {
				ViolationKind::MissingCitation => {
					parts.push(format!("uncited factual sentence: {:?}", violation.excerpt));
				},
				ViolationKind::UnknownSource => {
					let key = violation.key.as_deref().unwrap_or("?");

					parts.push(format!("citation to unknown source {key}: {:?}", violation.excerpt));
				},
			}
		}

		parts.join("; ")
	}
}

/// Sentence-level citation gate. Exemption patterns come from configuration
/// and stay narrow; anything unmatched counts as factual and must cite.
pub struct CitationPolicy {
	tag: Regex,
	leading_tags: Regex,
	exempt: Vec<Regex>,
	min_factual_words: usize,
}
impl CitationPolicy {
	pub fn new(cfg: &statdoc_config::Validation) -> Result<Self, regex::Error> {
		let mut exempt = Vec::with_capacity(cfg.exempt_patterns.len());

		for pattern in &cfg.exempt_patterns {
			exempt.push(Regex::new(pattern)?);
		}

		Ok(Self {
			tag: Regex::new(TAG_PATTERN).expect("tag pattern is static"),
			leading_tags: Regex::new(r"^(?:\[S\d+\]\s*)+").expect("leading tag pattern is static"),
			exempt,
			min_factual_words: cfg.min_factual_words as usize,
		})
	}

	pub fn validate(&self, text: &str, known_keys: &BTreeSet<String>) -> ValidationReport {
		let mut report = ValidationReport::default();
		let mut unit_index = 0_u32;

		for line in text.lines() {
			let line = line.trim();

			if line.is_empty() {
				continue;
			}

			if self.line_exempt(line) {
				// Exempt units still may not carry hallucinated citations.
				self.check_tags(line, known_keys, unit_index, &mut report);

				report.exempt_units += 1;
				unit_index += 1;

				continue;
			}

			for unit in self.sentence_units(line) {
				let known_cited = self.check_tags(&unit, known_keys, unit_index, &mut report);

				if self.word_count_without_tags(&unit) < self.min_factual_words {
					report.exempt_units += 1;
				} else {
					report.factual_units += 1;

					if known_cited {
						report.cited_factual_units += 1;
					} else {
						report.violations.push(Violation {
							kind: ViolationKind::MissingCitation,
							unit_index,
							excerpt: excerpt_of(&unit),
							key: None,
						});
					}
				}

				unit_index += 1;
			}
		}

		report
	}

	/// Sentence units of one line. Tags written after the closing period
	/// (`Sentence. [S1]`) segment into the next unit, so a leading tag run is
	/// folded back into the sentence it cites.
	fn sentence_units(&self, line: &str) -> Vec<String> {
		let mut units: Vec<String> = Vec::new();

		for (_, raw) in line.split_sentence_bound_indices() {
			let raw = raw.trim();

			if raw.is_empty() {
				continue;
			}

			let (leading, remainder) = match self.leading_tags.find(raw) {
				Some(found) => (Some(found.as_str()), raw[found.end()..].trim()),
				None => (None, raw),
			};

			match (leading, units.last_mut()) {
				(Some(leading), Some(last)) => {
					last.push(' ');
					last.push_str(leading.trim_end());

					if !remainder.is_empty() {
						units.push(remainder.to_string());
					}
				},
				_ => units.push(raw.to_string()),
			}
		}

		units
	}

	fn line_exempt(&self, line: &str) -> bool {
		self.exempt.iter().any(|pattern| pattern.is_match(line))
	}

	/// Records cited keys and unknown-source violations for one unit.
	/// Returns whether the unit cites at least one known source.
	fn check_tags(
		&self,
		unit: &str,
		known_keys: &BTreeSet<String>,
		unit_index: u32,
		report: &mut ValidationReport,
	) -> bool {
		let mut known_cited = false;

		for capture in self.tag.captures_iter(unit) {
			let key = format!("S{}", &capture[1]);

			if known_keys.contains(&key) {
				report.cited_keys.insert(key);

				known_cited = true;
			} else {
				report.violations.push(Violation {
					kind: ViolationKind::UnknownSource,
					unit_index,
					excerpt: excerpt_of(unit),
					key: Some(key),
				});
			}
		}

		known_cited
	}

	fn word_count_without_tags(&self, sentence: &str) -> usize {
		let stripped = self.tag.replace_all(sentence, "");

		stripped.unicode_words().count()
	}
}

fn excerpt_of(unit: &str) -> String {
	const MAX_EXCERPT_CHARS: usize = 120;

	if unit.chars().count() <= MAX_EXCERPT_CHARS {
		return unit.to_string();
	}

	let mut out: String = unit.chars().take(MAX_EXCERPT_CHARS).collect();

	out.push_str("...");

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> CitationPolicy {
		CitationPolicy::new(&statdoc_config::Validation::default()).unwrap()
	}

	fn keys(raw: &[&str]) -> BTreeSet<String> {
		raw.iter().map(|key| key.to_string()).collect()
	}

	#[test]
	fn cited_factual_sentences_pass() {
		let report = policy().validate(
			"Administer high-flow oxygen before induction. [S1] Prepare suction at the head of the bed. [S2]",
			&keys(&["S1", "S2"]),
		);

		assert!(report.passed());
		assert_eq!(report.factual_units, 2);
		assert_eq!(report.cited_keys, keys(&["S1", "S2"]));
	}

	#[test]
	fn uncited_factual_sentence_is_a_violation() {
		let report = policy().validate(
			"Cricoid pressure is no longer routinely recommended during intubation.",
			&keys(&["S1"]),
		);

		assert!(!report.passed());
		assert_eq!(report.violations.len(), 1);
		assert_eq!(report.violations[0].kind, ViolationKind::MissingCitation);
	}

	#[test]
	fn citation_to_unknown_source_is_fatal() {
		let report = policy()
			.validate("Apply direct pressure to the wound immediately. [S9]", &keys(&["S1"]));

		assert!(!report.passed());
		assert_eq!(report.violations[0].kind, ViolationKind::UnknownSource);
		assert_eq!(report.violations[0].key.as_deref(), Some("S9"));
	}

	#[test]
	fn headings_are_exempt_but_short_fragments_do_not_mask_violations() {
		let text = "# Procedure\nSecure the airway with an appropriately sized tube. [S1]\nDone.";
		let report = policy().validate(text, &keys(&["S1"]));

		assert!(report.passed());
		assert_eq!(report.exempt_units, 2);
		assert_eq!(report.factual_units, 1);
	}

	#[test]
	fn hallucinated_citation_on_exempt_unit_still_fails() {
		let report = policy().validate("# Overview [S4]", &keys(&["S1"]));

		assert!(!report.passed());
		assert_eq!(report.violations[0].kind, ViolationKind::UnknownSource);
	}

	#[test]
	fn disclaimer_line_is_exempt() {
		let report =
			policy().validate("This document does not replace clinical judgment.", &keys(&["S1"]));

		assert!(report.passed());
		assert_eq!(report.exempt_units, 1);
	}

	#[test]
	fn trailing_tags_bind_to_the_preceding_sentence() {
		let report = policy().validate(
			"Give epinephrine every three to five minutes. [S1] Continue compressions between doses. [S2]",
			&keys(&["S1", "S2"]),
		);

		assert!(report.passed());
		assert_eq!(report.factual_units, 2);
		assert_eq!(report.cited_factual_units, 2);
	}

	#[test]
	fn coverage_tracks_cited_fraction() {
		let text = "Obtain intravenous access with two large-bore cannulas. [S1] Give tranexamic acid within three hours of injury.";
		let report = policy().validate(text, &keys(&["S1"]));

		assert_eq!(report.factual_units, 2);
		assert_eq!(report.cited_factual_units, 1);
		assert!((report.coverage() - 0.5).abs() < f32::EPSILON);
	}
}
