use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Calls a Cohere/Jina-compatible rerank endpoint. Scores come back aligned with `docs`.
pub async fn rerank(
	client: &Client,
	cfg: &wekiwi_config::ProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({ "model": cfg.model, "query": query, "documents": docs });
	let res = client
		.post(url)
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores: Vec<Option<f32>> = vec![None; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Rerank response is missing results array.".to_string(),
		})?;

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})? as f32;

		match scores.get_mut(index) {
			Some(slot) => *slot = Some(score),
			None => tracing::warn!(index, doc_count, "Rerank result index out of range."),
		}
	}

	scores
		.into_iter()
		.enumerate()
		.map(|(index, score)| {
			score.ok_or_else(|| Error::InvalidResponse {
				message: format!("Rerank response has no score for document {index}."),
			})
		})
		.collect()
}
