use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
	pub input_tokens: u64,
	pub output_tokens: u64,
}

pub fn usage_cost_usd(usage: TokenUsage, pricing: &statdoc_config::Pricing) -> f64 {
	usage.input_tokens as f64 / 1_000.0 * pricing.input_usd_per_1k
		+ usage.output_tokens as f64 / 1_000.0 * pricing.output_usd_per_1k
}

/// Monotonic spend accounting against a hard cap. An iteration may only start
/// when its minimum billable amount still fits under the cap.
#[derive(Clone, Copy, Debug)]
pub struct CostLedger {
	cap_usd: f64,
	spent_usd: f64,
}
impl CostLedger {
	pub fn new(cap_usd: f64) -> Self {
		Self { cap_usd, spent_usd: 0.0 }
	}

	pub fn resume(cap_usd: f64, spent_usd: f64) -> Self {
		Self { cap_usd, spent_usd: spent_usd.max(0.0) }
	}

	pub fn spent_usd(&self) -> f64 {
		self.spent_usd
	}

	pub fn cap_usd(&self) -> f64 {
		self.cap_usd
	}

	pub fn can_start(&self, min_billable_usd: f64) -> bool {
		self.spent_usd + min_billable_usd <= self.cap_usd
	}

	/// Records an incremental charge and returns it. Charges never decrease
	/// the running total.
	pub fn charge(&mut self, amount_usd: f64) -> f64 {
		let amount = amount_usd.max(0.0);

		self.spent_usd += amount;

		amount
	}
}
