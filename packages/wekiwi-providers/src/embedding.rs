use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Calls an OpenAI-compatible embedding endpoint. Vectors come back in input order.
pub async fn embed(
	client: &Client,
	cfg: &wekiwi_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	check_shape(&vectors, texts.len(), cfg.dimensions as usize)?;

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn check_shape(vectors: &[Vec<f32>], expected_count: usize, dimensions: usize) -> Result<()> {
	if vectors.len() != expected_count {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {expected_count} inputs.",
				vectors.len()
			),
		});
	}
	if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimensions) {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding has {} dimensions; expected {dimensions}.",
				vector.len()
			),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("Parse failed.");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn rejects_wrong_dimensions() {
		let err = check_shape(&[vec![0.1, 0.2, 0.3]], 1, 2).expect_err("Expected shape error.");

		assert_eq!(err.to_string(), "Embedding has 3 dimensions; expected 2.");
	}

	#[test]
	fn rejects_missing_vectors() {
		assert!(check_shape(&[vec![0.1, 0.2]], 2, 2).is_err());
	}
}
