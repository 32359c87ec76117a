use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::task;

use wekiwi_batch::RerankPair;
use wekiwi_ranking::{ContentNode, Entity, ScoredChunk};
use wekiwi_storage::{
	filter::ContentFilter,
	models::{ContentMeta, ContentRecord, VectorHit},
};

use crate::{Error, Result, WekiwiService};

pub type SearchResponse = Vec<ContentNode<u32, ContentMeta>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub company_id: u32,
	pub circle_ids: Vec<u32>,
	#[serde(default = "default_rerank")]
	pub rerank: bool,
	/// `null` and a missing field both mean the first page.
	#[serde(default)]
	pub offset: Option<u64>,
	#[serde(default)]
	pub page_size: Option<u32>,
	#[serde(default)]
	pub k_avg: Option<u32>,
	#[serde(default)]
	pub filter: Option<SearchFilter>,
}

/// Metadata restriction on a search, in either of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchFilter {
	/// Clauses joined by `and`, as sent by the web client.
	Expression(String),
	Fields(ContentFilter),
}
impl SearchFilter {
	pub fn resolve(&self) -> Result<ContentFilter> {
		match self {
			Self::Expression(expression) => Ok(expression.parse::<ContentFilter>()?),
			Self::Fields(filter) => Ok(filter.clone()),
		}
	}
}

struct SearchParams {
	page_size: u32,
	k_avg: u32,
	filter: ContentFilter,
}

impl WekiwiService {
	/// Finds the contents matching `query` and returns them as a ranked parent/child forest.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let params = self.search_params(&req)?;
		let reranker = if req.rerank { Some(self.reranker()?) } else { None };

		if req.circle_ids.is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.models.embedding.embed(req.query.as_str()).await?;
		let hits = self
			.index
			.search(
				vector,
				req.company_id,
				&req.circle_ids,
				&params.filter,
				u64::from(params.page_size),
				req.offset.unwrap_or(0),
			)
			.await?;

		if hits.is_empty() {
			tracing::debug!(company_id = req.company_id, "Search returned no hits.");

			return Ok(Vec::new());
		}

		let content_ids = unique_content_ids(&hits);
		let (chunks, records) = match reranker {
			Some(reranker) => {
				let handles: Vec<_> = hits
					.iter()
					.map(|hit| {
						let pair = RerankPair::new(req.query.as_str(), hit.text.as_str());

						(hit.content_id, reranker.rerank(pair))
					})
					.collect();
				let records = self.lineage(&content_ids, req.company_id).await?;
				let mut chunks = Vec::with_capacity(handles.len());

				for (content_id, handle) in handles {
					chunks.push(ScoredChunk::new(content_id, handle.await?));
				}

				(chunks, records)
			},
			None => {
				let records = self.lineage(&content_ids, req.company_id).await?;
				let chunks =
					hits.iter().map(|hit| ScoredChunk::new(hit.content_id, hit.score)).collect();

				(chunks, records)
			},
		};
		let hit_count = hits.len();
		let record_count = records.len();
		let entities = records.into_iter().map(entity).collect();
		let k_avg = params.k_avg as usize;
		let orphans = self.cfg.search.orphan_policy;
		let ranked = task::spawn_blocking(move || {
			wekiwi_ranking::rank(&chunks, entities, k_avg, orphans)
		})
		.await
		.map_err(|err| Error::Ranking { message: format!("Ranking task did not complete: {err}.") })??;

		tracing::info!(
			company_id = req.company_id,
			hits = hit_count,
			records = record_count,
			roots = ranked.len(),
			rerank = req.rerank,
			"Search completed."
		);

		Ok(ranked)
	}

	fn search_params(&self, req: &SearchRequest) -> Result<SearchParams> {
		let cfg = &self.cfg.search;

		if req.query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if req.query.chars().count() > cfg.max_query_chars {
			return Err(Error::InvalidRequest {
				message: format!("query must be at most {} characters.", cfg.max_query_chars),
			});
		}

		let page_size = req.page_size.unwrap_or(cfg.default_page_size);
		let k_avg = req.k_avg.unwrap_or(cfg.default_k_avg);

		if page_size == 0 {
			return Err(Error::InvalidRequest {
				message: "page_size must be greater than zero.".to_string(),
			});
		}
		if k_avg == 0 {
			return Err(Error::InvalidRequest {
				message: "k_avg must be greater than zero.".to_string(),
			});
		}

		let filter = match &req.filter {
			Some(filter) => filter.resolve()?,
			None => ContentFilter::default(),
		};

		Ok(SearchParams { page_size, k_avg, filter })
	}

	/// Records for `content_ids` and every ancestor the store knows about.
	///
	/// The store answers each lookup with up to two ancestor levels; parents still missing after
	/// that are requested again until the chain ends or only unknown ids remain.
	async fn lineage(&self, content_ids: &[u32], company_id: u32) -> Result<Vec<ContentRecord>> {
		let mut records = self.contents.get_contents(content_ids, company_id).await?;
		let mut requested: HashSet<u32> = content_ids.iter().copied().collect();

		loop {
			let known: HashSet<u32> = records.iter().map(|record| record.content_id).collect();
			let missing: Vec<u32> = records
				.iter()
				.filter_map(|record| record.parent_id)
				.filter(|parent_id| !known.contains(parent_id) && requested.insert(*parent_id))
				.collect();

			if missing.is_empty() {
				break;
			}

			tracing::debug!(company_id, missing = missing.len(), "Fetching further ancestors.");

			let ancestors = self.contents.get_contents(&missing, company_id).await?;

			records.extend(
				ancestors.into_iter().filter(|record| !known.contains(&record.content_id)),
			);
		}

		Ok(records)
	}
}

fn default_rerank() -> bool {
	true
}

fn unique_content_ids(hits: &[VectorHit]) -> Vec<u32> {
	let mut seen = HashSet::new();

	hits.iter().map(|hit| hit.content_id).filter(|id| seen.insert(*id)).collect()
}

fn entity(record: ContentRecord) -> Entity<u32, ContentMeta> {
	Entity { id: record.content_id, parent_id: record.parent_id, meta: record.meta }
}
