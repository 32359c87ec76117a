use serde::{Deserialize, Serialize};

use wekiwi_batch::RerankPair;

use crate::{Error, Result, WekiwiService, text};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankContent {
	pub content_id: u32,
	pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankRequest {
	pub query: String,
	pub contents: Vec<RerankContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
	pub content_id: u32,
	pub text: String,
	pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResponse {
	pub result: Vec<RerankResult>,
}

impl WekiwiService {
	/// Scores each content against the query, in request order.
	///
	/// Long texts are split into overlapping windows and scored per window; a content's score is
	/// the mean over its windows.
	pub async fn rerank(&self, req: RerankRequest) -> Result<RerankResponse> {
		if req.query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let reranker = self.reranker()?;
		let search_cfg = &self.cfg.search;
		let mut handles = Vec::new();

		for (index, content) in req.contents.iter().enumerate() {
			for passage in self.passages(&content.text) {
				handles.push((index, reranker.rerank(RerankPair::new(req.query.as_str(), passage))));
			}
		}

		tracing::debug!(
			contents = req.contents.len(),
			pairs = handles.len(),
			max_chars = search_cfg.rerank_max_chars,
			"Submitted rerank pairs."
		);

		let mut totals = vec![(0.0_f32, 0_usize); req.contents.len()];

		for (index, handle) in handles {
			let score = handle.await?;

			totals[index].0 += score;
			totals[index].1 += 1;
		}

		let result = req
			.contents
			.into_iter()
			.zip(totals)
			.map(|(content, (total, count))| RerankResult {
				content_id: content.content_id,
				text: content.text,
				score: if count > 0 { total / count as f32 } else { 0.0 },
			})
			.collect();

		Ok(RerankResponse { result })
	}

	fn passages(&self, content: &str) -> Vec<String> {
		let cfg = &self.cfg.search;

		if content.chars().count() <= cfg.rerank_max_chars {
			return vec![content.to_string()];
		}

		let windows =
			text::split_windows(content, cfg.rerank_chunk_chars, cfg.rerank_overlap_chars);

		if windows.is_empty() { vec![content.to_string()] } else { windows }
	}
}
