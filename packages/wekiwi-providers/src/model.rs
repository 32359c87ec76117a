use reqwest::Client;
use tokio::runtime::Handle;

use wekiwi_batch::{
	Capabilities, ComputeError, ComputeResource, ComputeResult, Operation, RerankPair,
};
use wekiwi_config::{EmbeddingProviderConfig, ProviderConfig};

use crate::{Error, Result, embedding, rerank};

/// Remote embedding and/or rerank endpoints exposed as one compute resource.
///
/// Batches arrive on the blocking pool; each call is driven to completion on the runtime that
/// created the model. Declared capabilities are exactly the configured endpoints.
pub struct HttpModel {
	name: String,
	client: Client,
	runtime: Handle,
	embedding: Option<EmbeddingProviderConfig>,
	rerank: Option<ProviderConfig>,
}
impl HttpModel {
	pub fn new(
		name: impl Into<String>,
		embedding: Option<EmbeddingProviderConfig>,
		rerank: Option<ProviderConfig>,
	) -> Result<Self> {
		let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
		let client = Client::builder().build()?;

		Ok(Self { name: name.into(), client, runtime, embedding, rerank })
	}

	pub fn embedding(cfg: &EmbeddingProviderConfig) -> Result<Self> {
		Self::new(cfg.provider_id.clone(), Some(cfg.clone()), None)
	}

	pub fn reranker(cfg: &ProviderConfig) -> Result<Self> {
		Self::new(cfg.provider_id.clone(), None, Some(cfg.clone()))
	}
}
impl ComputeResource for HttpModel {
	fn name(&self) -> &str {
		&self.name
	}

	fn capabilities(&self) -> Capabilities {
		let mut capabilities = Capabilities::none();

		if self.embedding.is_some() {
			capabilities = capabilities.with(Operation::Embed);
		}
		if self.rerank.is_some() {
			capabilities = capabilities.with(Operation::Rerank);
		}

		capabilities
	}

	fn embed(&self, texts: Vec<String>) -> ComputeResult<Vec<Vec<f32>>> {
		let Some(cfg) = self.embedding.as_ref() else {
			return Err(ComputeError::unsupported(Operation::Embed));
		};

		self.runtime
			.block_on(embedding::embed(&self.client, cfg, &texts))
			.map_err(|err| ComputeError::new(err.to_string()))
	}

	fn rerank(&self, pairs: Vec<RerankPair>) -> ComputeResult<Vec<f32>> {
		let Some(cfg) = self.rerank.as_ref() else {
			return Err(ComputeError::unsupported(Operation::Rerank));
		};
		let mut scores = vec![0.0; pairs.len()];

		for (query, positions) in group_by_query(&pairs) {
			let docs: Vec<String> =
				positions.iter().map(|&position| pairs[position].passage.clone()).collect();
			let group_scores = self
				.runtime
				.block_on(rerank::rerank(&self.client, cfg, query, &docs))
				.map_err(|err| ComputeError::new(err.to_string()))?;

			for (position, score) in positions.into_iter().zip(group_scores) {
				scores[position] = score;
			}
		}

		Ok(scores)
	}
}

/// Distinct queries in first-seen order, each with the batch positions that carry it.
fn group_by_query(pairs: &[RerankPair]) -> Vec<(&str, Vec<usize>)> {
	let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();

	for (position, pair) in pairs.iter().enumerate() {
		match groups.iter_mut().find(|(query, _)| *query == pair.query) {
			Some((_, positions)) => positions.push(position),
			None => groups.push((pair.query.as_str(), vec![position])),
		}
	}

	groups
}
