use statdoc_domain::{
	Artifact, CitationPolicy, CostLedger, QualityIteration, StopReason, score_draft,
	usage_cost_usd,
};

use crate::{
	Error, Result,
	evidence::EvidenceSet,
	generate::{GenerationRequest, Generator},
};

#[derive(Clone, Debug)]
pub struct LoopOutcome {
	pub artifact: Artifact,
	pub iterations: Vec<QualityIteration>,
}

/// The bounded revise-and-validate cycle. Stop conditions are checked before
/// each new iteration, in order: quality threshold reached, iteration cap,
/// cost cap (with the minimum billable unit, so the cap is never crossed).
/// A citation violation fails the iteration and feeds a repair instruction
/// into the next one; it is never silently patched over.
pub async fn run_quality_loop(
	generator: &dyn Generator,
	request: &GenerationRequest,
	evidence: &EvidenceSet,
	cfg: &statdoc_config::Config,
) -> Result<LoopOutcome> {
	let policy = CitationPolicy::new(&cfg.validation)?;
	let mut ledger = CostLedger::new(cfg.quality.cost_cap_usd);
	let mut iterations: Vec<QualityIteration> = Vec::new();
	let mut best: Option<(f32, String)> = None;
	let mut warnings = 0_u32;
	let mut feedback: Option<String> = None;
	let stop_reason = loop {
		if let Some((score, _)) = best.as_ref()
			&& *score >= cfg.quality.threshold
		{
			break StopReason::Threshold;
		}
		if iterations.len() as u32 >= cfg.quality.max_iterations {
			break StopReason::MaxIterations;
		}
		if !ledger.can_start(cfg.quality.min_billable_usd) {
			break StopReason::CostCap;
		}

		let iteration_no = iterations.len() as u32 + 1;
		let mut attempt_request = request.clone();

		attempt_request.feedback = feedback.clone();

		match generator.generate(&attempt_request).await {
			Err(err) => {
				tracing::warn!(iteration = iteration_no, error = %err, "Generation iteration failed.");
				iterations.push(QualityIteration {
					iteration: iteration_no,
					score: 0.0,
					cost_usd: 0.0,
					passed: false,
					violation: Some(format!("Generation failed: {err}")),
					stop: None,
				});

				warnings += 1;
			},
			Ok(draft) => {
				let cost = ledger.charge(usage_cost_usd(draft.usage, &cfg.quality.pricing));
				let report = policy.validate(&draft.text, &evidence.known_keys);
				let score = score_draft(
					&draft.text,
					&report,
					evidence.records.len() as u32,
					&cfg.document,
					&cfg.quality.weights,
				);
				let passed = report.passed();
				let violation = (!passed).then(|| report.describe_violations());

				tracing::info!(
					iteration = iteration_no,
					score,
					passed,
					cost_usd = cost,
					spent_usd = ledger.spent_usd(),
					"Quality iteration finished."
				);
				iterations.push(QualityIteration {
					iteration: iteration_no,
					score,
					cost_usd: cost,
					passed,
					violation: violation.clone(),
					stop: None,
				});

				if passed {
					if best.as_ref().map(|(existing, _)| score > *existing).unwrap_or(true) {
						best = Some((score, draft.text));
					}

					feedback = None;
				} else {
					warnings += 1;
					feedback = violation;
				}
			},
		}
	};
	let Some((score, text)) = best else {
		return Err(Error::CitationViolation {
			message: format!(
				"No draft passed citation validation in {} iterations.",
				iterations.len()
			),
		});
	};

	if let Some(last) = iterations.last_mut() {
		last.stop = Some(stop_reason);
	}

	let artifact = Artifact {
		text,
		score,
		iterations_used: iterations.len() as u32,
		cost_usd: ledger.spent_usd(),
		stop_reason,
		validation_warnings: warnings,
		source_ids: evidence.source_ids.clone(),
	};

	Ok(LoopOutcome { artifact, iterations })
}
