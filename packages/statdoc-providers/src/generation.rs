// std
use std::time::Duration as StdDuration;

// crates.io
use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use statdoc_domain::TokenUsage;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

#[derive(Clone, Debug)]
pub struct GenerationOutput {
	pub text: String,
	pub usage: TokenUsage,
}

/// Calls the generation collaborator (chat-completions shape) and returns the
/// draft text plus token usage. Transport failures, non-2xx responses and
/// malformed payloads are retried with exponential backoff up to
/// `cfg.max_retries` before the call fails.
pub async fn generate(
	cfg: &statdoc_config::GenerationProviderConfig,
	messages: &[Value],
) -> Result<GenerationOutput> {
	let client = Client::builder().timeout(StdDuration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let mut last_err = None;

	for attempt in 1..=cfg.max_retries {
		let result = async {
			let res = client
				.post(&url)
				.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
				.json(&body)
				.send()
				.await?;
			let json: Value = res.error_for_status()?.json().await?;

			parse_generation_response(json)
		}
		.await;

		match result {
			Ok(output) => return Ok(output),
			Err(err) => {
				tracing::warn!(attempt, error = %err, "Generation call failed.");

				last_err = Some(err);

				if attempt < cfg.max_retries {
					tokio::time::sleep(backoff_for_attempt(attempt)).await;
				}
			},
		}
	}

	Err(last_err.unwrap_or_else(|| eyre::eyre!("Generation provider returned no response.")))
}

fn backoff_for_attempt(attempt: u32) -> StdDuration {
	let exp = attempt.saturating_sub(1).min(6);
	let millis = BASE_BACKOFF_MS.saturating_mul(1 << exp).min(MAX_BACKOFF_MS);

	StdDuration::from_millis(millis)
}

fn parse_generation_response(json: Value) -> Result<GenerationOutput> {
	let text = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| eyre::eyre!("Generation response is missing message content."))?
		.to_string();

	if text.trim().is_empty() {
		return Err(eyre::eyre!("Generation response content is empty."));
	}

	let usage = json.get("usage");
	let input_tokens =
		usage.and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
	let output_tokens =
		usage.and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);

	Ok(GenerationOutput { text, usage: TokenUsage { input_tokens, output_tokens } })
}
