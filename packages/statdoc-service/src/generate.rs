use serde_json::Value;

use statdoc_domain::TokenUsage;

use crate::BoxFuture;

/// One evidence snippet handed to the generation collaborator, labelled with
/// the per-job source key its citations must use.
#[derive(Clone, Debug)]
pub struct EvidenceSnippet {
	pub key: String,
	pub title: String,
	pub tier: String,
	pub text: String,
}

#[derive(Clone, Debug)]
pub struct GenerationRequest {
	pub subject: String,
	pub context: Option<String>,
	pub snippets: Vec<EvidenceSnippet>,
	pub sections: Vec<String>,
	pub target_words: u32,
	pub disclaimer: String,
	/// Repair instruction fed back after a failed validation round.
	pub feedback: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DraftOutput {
	pub text: String,
	pub usage: TokenUsage,
}

/// Boundary to the generation collaborator. The HTTP implementation wraps
/// the provider client; tests substitute a scripted implementation.
pub trait Generator
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		request: &'a GenerationRequest,
	) -> BoxFuture<'a, color_eyre::Result<DraftOutput>>;
}

pub struct HttpGenerator {
	cfg: statdoc_config::GenerationProviderConfig,
}
impl HttpGenerator {
	pub fn new(cfg: statdoc_config::GenerationProviderConfig) -> Self {
		Self { cfg }
	}
}
impl Generator for HttpGenerator {
	fn generate<'a>(
		&'a self,
		request: &'a GenerationRequest,
	) -> BoxFuture<'a, color_eyre::Result<DraftOutput>> {
		Box::pin(async move {
			let messages = build_messages(request);
			let output = statdoc_providers::generation::generate(&self.cfg, &messages).await?;

			Ok(DraftOutput { text: output.text, usage: output.usage })
		})
	}
}

/// Chat-completions message pair for one draft request. Pure, so prompt
/// construction is testable without a provider.
pub fn build_messages(request: &GenerationRequest) -> Vec<Value> {
	let mut evidence_block = String::new();

	for snippet in &request.snippets {
		evidence_block.push_str(&format!(
			"[{key}] ({tier}) {title}\n{text}\n\n",
			key = snippet.key,
			tier = snippet.tier,
			title = snippet.title,
			text = snippet.text,
		));
	}

	let sections = request.sections.join(", ");
	let system = format!(
		"You write emergency-medicine procedure documents. Use ONLY the numbered sources provided. \
Every factual sentence must end with at least one citation tag in the form [S<n>] referencing a \
provided source. Never cite a source that was not provided. Structure the document as Markdown \
with these sections: {sections}. Target length: about {target} words. End the document with this \
exact line: {disclaimer}",
		target = request.target_words,
		disclaimer = request.disclaimer,
	);
	let mut user = format!("Subject: {}\n", request.subject);

	if let Some(context) = request.context.as_deref() {
		user.push_str(&format!("Additional context: {context}\n"));
	}

	user.push_str("\nSources:\n\n");
	user.push_str(&evidence_block);

	if let Some(feedback) = request.feedback.as_deref() {
		user.push_str(&format!(
			"\nThe previous draft failed citation validation. Fix the following and change nothing else: {feedback}\n"
		));
	}

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}
