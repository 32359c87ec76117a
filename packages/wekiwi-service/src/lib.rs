pub mod content;
pub mod embed;
pub mod rerank;
pub mod search;
pub mod text;

mod error;

pub use content::{
	ContentInput, ContentMessage, CreateContentRequest, RebuildReport, UpdateContentRequest,
};
pub use embed::{EmbedRequest, EmbedResponse};
pub use error::{Error, Result};
pub use rerank::{RerankContent, RerankRequest, RerankResponse, RerankResult};
pub use search::{SearchFilter, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use wekiwi_batch::BatchScheduler;
use wekiwi_config::Config;
use wekiwi_storage::{
	directus::DirectusClient,
	filter::ContentFilter,
	models::{ChunkPayload, ChunkPoint, ContentPatch, ContentRecord, IndexSource, VectorHit},
	qdrant::QdrantIndex,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Chunk storage with nearest-neighbour search, keyed by `content_id`.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		company_id: u32,
		circle_ids: &'a [u32],
		filter: &'a ContentFilter,
		limit: u64,
		offset: u64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>>;

	fn upsert<'a>(&'a self, points: Vec<ChunkPoint>) -> BoxFuture<'a, Result<()>>;

	fn count<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<u64>>;

	fn delete<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<()>>;

	fn first_payload<'a>(
		&'a self,
		content_id: u32,
	) -> BoxFuture<'a, Result<Option<ChunkPayload>>>;

	fn set_payload<'a>(
		&'a self,
		content_id: u32,
		patch: &'a ContentPatch,
	) -> BoxFuture<'a, Result<()>>;

	/// Drops every chunk and recreates the empty index.
	fn recreate<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

pub trait ContentStore
where
	Self: Send + Sync,
{
	/// Records for `content_ids` plus at least their parents and grandparents.
	fn get_contents<'a>(
		&'a self,
		content_ids: &'a [u32],
		company_id: u32,
	) -> BoxFuture<'a, Result<Vec<ContentRecord>>>;

	/// One page of contents to index, in a stable order.
	fn index_sources<'a>(
		&'a self,
		offset: u64,
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<IndexSource>>>;
}

impl VectorIndex for QdrantIndex {
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		company_id: u32,
		circle_ids: &'a [u32],
		filter: &'a ContentFilter,
		limit: u64,
		offset: u64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			Ok(QdrantIndex::search(self, vector, company_id, circle_ids, filter, limit, offset)
				.await?)
		})
	}

	fn upsert<'a>(&'a self, points: Vec<ChunkPoint>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantIndex::upsert(self, points).await?) })
	}

	fn count<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(QdrantIndex::count(self, content_ids).await?) })
	}

	fn delete<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantIndex::delete(self, content_ids).await?) })
	}

	fn first_payload<'a>(
		&'a self,
		content_id: u32,
	) -> BoxFuture<'a, Result<Option<ChunkPayload>>> {
		Box::pin(async move { Ok(QdrantIndex::first_payload(self, content_id).await?) })
	}

	fn set_payload<'a>(
		&'a self,
		content_id: u32,
		patch: &'a ContentPatch,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantIndex::set_payload(self, content_id, patch).await?) })
	}

	fn recreate<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(QdrantIndex::recreate(self).await?) })
	}
}

impl ContentStore for DirectusClient {
	fn get_contents<'a>(
		&'a self,
		content_ids: &'a [u32],
		company_id: u32,
	) -> BoxFuture<'a, Result<Vec<ContentRecord>>> {
		Box::pin(async move { Ok(DirectusClient::get_contents(self, content_ids, company_id).await?) })
	}

	fn index_sources<'a>(
		&'a self,
		offset: u64,
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<IndexSource>>> {
		Box::pin(async move { Ok(DirectusClient::index_sources(self, offset, limit).await?) })
	}
}

/// Batch schedulers for the models the service talks to.
#[derive(Clone)]
pub struct Models {
	pub embedding: Arc<BatchScheduler>,
	/// Absent when no reranker is configured.
	pub rerank: Option<Arc<BatchScheduler>>,
}

pub struct WekiwiService {
	pub cfg: Config,
	pub models: Models,
	pub index: Arc<dyn VectorIndex>,
	pub contents: Arc<dyn ContentStore>,
}
impl WekiwiService {
	pub fn new(
		cfg: Config,
		models: Models,
		index: Arc<dyn VectorIndex>,
		contents: Arc<dyn ContentStore>,
	) -> Self {
		Self { cfg, models, index, contents }
	}

	fn reranker(&self) -> Result<&BatchScheduler> {
		self.models.rerank.as_deref().ok_or_else(|| Error::InvalidRequest {
			message: "Reranking was requested but no reranker is configured.".to_string(),
		})
	}
}
