//! In-memory stand-ins for the model, vector index, and content store.

use std::{
	collections::HashSet,
	sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Map;

use wekiwi_batch::{
	Capabilities, ComputeError, ComputeResource, ComputeResult, Operation, RerankPair,
};
use wekiwi_config::{
	Batching, Coalescing, Config, Directus, EmbeddingProviderConfig, Indexing, ProviderConfig,
	Providers, Qdrant, Search, Security, Service, Storage, Throttle,
};
use wekiwi_service::{BoxFuture, ContentStore, Result, VectorIndex};
use wekiwi_storage::{
	filter::ContentFilter,
	models::{
		ChunkMeta, ChunkPayload, ChunkPoint, ContentMeta, ContentPatch, ContentRecord, IndexSource,
		VectorHit,
	},
};

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_DIMENSIONS: u32 = 64;

/// Config with small, fast batching windows and the in-memory dimensions.
pub fn test_config() -> Config {
	let coalescing = Coalescing { max_batch_size: 8, accumulation_timeout_ms: 5 };

	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		security: Security { api_secret: TEST_SECRET.to_string(), bind_localhost_only: true },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "contents".to_string(),
				vector_dim: TEST_DIMENSIONS,
			},
			directus: Directus {
				url: "http://127.0.0.1:8055".to_string(),
				admin_key: "directus-admin-key".to_string(),
				timeout_ms: 1_000,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:7997".to_string(),
				api_key: "embedding-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test-embedding".to_string(),
				dimensions: TEST_DIMENSIONS,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			rerank: Some(ProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:7997".to_string(),
				api_key: "rerank-key".to_string(),
				path: "/rerank".to_string(),
				model: "test-rerank".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			}),
		},
		batching: Batching { embedding: coalescing.clone(), rerank: coalescing },
		search: Search::default(),
		indexing: Indexing::default(),
		throttle: Throttle { min_interval_ms: 1_000 },
	}
}

/// Deterministic bag-of-words embedding: each token hashes to a signed unit bump, and the sum is
/// normalized. Texts sharing tokens get a positive dot product.
pub fn fake_embedding(text: &str, dims: usize) -> Vec<f32> {
	let dims = dims.max(1);
	let mut vector = vec![0.0_f32; dims];

	for token in tokens(text) {
		let hash = blake3::hash(token.as_bytes());
		let bytes = hash.as_bytes();
		let mut slot = [0_u8; 8];

		slot.copy_from_slice(&bytes[..8]);

		let index = (u64::from_le_bytes(slot) % dims as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[index] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

/// Share of query tokens that also occur in the passage.
pub fn lexical_overlap(query: &str, passage: &str) -> f32 {
	let query = tokens(query).collect::<HashSet<_>>();

	if query.is_empty() {
		return 0.0;
	}

	let passage = tokens(passage).collect::<HashSet<_>>();

	query.intersection(&passage).count() as f32 / query.len() as f32
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|ch: char| !ch.is_alphanumeric())
		.filter(|token| !token.is_empty())
		.map(str::to_lowercase)
}

/// A [`ComputeResource`] backed by [`fake_embedding`] and [`lexical_overlap`] that records every
/// batch it receives.
pub struct FakeModel {
	name: String,
	capabilities: Capabilities,
	dimensions: usize,
	batches: Mutex<Vec<(Operation, usize)>>,
}
impl FakeModel {
	pub fn embedder(dimensions: u32) -> Arc<Self> {
		let capabilities = Capabilities::none().with(Operation::Embed);

		Arc::new(Self::new("fake-embedding", capabilities, dimensions))
	}

	pub fn reranker() -> Arc<Self> {
		Arc::new(Self::new("fake-rerank", Capabilities::none().with(Operation::Rerank), 0))
	}

	pub fn new(name: &str, capabilities: Capabilities, dimensions: u32) -> Self {
		Self {
			name: name.to_string(),
			capabilities,
			dimensions: dimensions as usize,
			batches: Mutex::new(Vec::new()),
		}
	}

	/// Batch sizes in invocation order.
	pub fn batches(&self, operation: Operation) -> Vec<usize> {
		self.batches
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.iter()
			.filter(|(recorded, _)| *recorded == operation)
			.map(|(_, size)| *size)
			.collect()
	}

	fn record(&self, operation: Operation, size: usize) {
		self.batches.lock().unwrap_or_else(|err| err.into_inner()).push((operation, size));
	}
}
impl ComputeResource for FakeModel {
	fn name(&self) -> &str {
		&self.name
	}

	fn capabilities(&self) -> Capabilities {
		self.capabilities
	}

	fn embed(&self, texts: Vec<String>) -> ComputeResult<Vec<Vec<f32>>> {
		if !self.capabilities.supports(Operation::Embed) {
			return Err(ComputeError::unsupported(Operation::Embed));
		}

		self.record(Operation::Embed, texts.len());

		Ok(texts.iter().map(|text| fake_embedding(text, self.dimensions)).collect())
	}

	fn rerank(&self, pairs: Vec<RerankPair>) -> ComputeResult<Vec<f32>> {
		if !self.capabilities.supports(Operation::Rerank) {
			return Err(ComputeError::unsupported(Operation::Rerank));
		}

		self.record(Operation::Rerank, pairs.len());

		Ok(pairs.iter().map(|pair| lexical_overlap(&pair.query, &pair.passage)).collect())
	}
}

#[derive(Debug, Clone)]
struct IndexedChunk {
	payload: ChunkPayload,
	vector: Vec<f32>,
}

/// Brute-force [`VectorIndex`] over [`fake_embedding`] vectors.
pub struct MemoryIndex {
	dimensions: usize,
	chunks: Mutex<Vec<IndexedChunk>>,
}
impl MemoryIndex {
	pub fn new(dimensions: u32) -> Self {
		Self { dimensions: dimensions as usize, chunks: Mutex::new(Vec::new()) }
	}

	pub fn insert(&self, content_id: u32, company_id: u32, circle_ids: &[u32], text: &str) {
		self.insert_payload(ChunkPayload {
			content_id,
			company_id,
			circle_ids: circle_ids.to_vec(),
			text: text.to_string(),
			meta: ChunkMeta::default(),
		});
	}

	/// Indexes a chunk with full metadata, embedding its text.
	pub fn insert_payload(&self, payload: ChunkPayload) {
		let vector = fake_embedding(&payload.text, self.dimensions);

		self.lock().push(IndexedChunk { payload, vector });
	}

	/// Stored payloads of `content_id`, in insertion order.
	pub fn chunks(&self, content_id: u32) -> Vec<ChunkPayload> {
		self.lock()
			.iter()
			.filter(|chunk| chunk.payload.content_id == content_id)
			.map(|chunk| chunk.payload.clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn lock(&self) -> MutexGuard<'_, Vec<IndexedChunk>> {
		self.chunks.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl VectorIndex for MemoryIndex {
	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		company_id: u32,
		circle_ids: &'a [u32],
		filter: &'a ContentFilter,
		limit: u64,
		offset: u64,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		let mut scored = self
			.lock()
			.iter()
			.filter(|chunk| chunk.payload.company_id == company_id)
			.filter(|chunk| chunk.payload.circle_ids.iter().any(|circle| circle_ids.contains(circle)))
			.filter(|chunk| filter.matches(&chunk.payload))
			.map(|chunk| VectorHit {
				content_id: chunk.payload.content_id,
				text: chunk.payload.text.clone(),
				score: dot(&vector, &chunk.vector),
			})
			.collect::<Vec<_>>();

		scored.sort_by(|left, right| right.score.total_cmp(&left.score));

		let hits =
			scored.into_iter().skip(offset as usize).take(limit as usize).collect::<Vec<_>>();

		Box::pin(async move { Ok(hits) })
	}

	fn upsert<'a>(&'a self, points: Vec<ChunkPoint>) -> BoxFuture<'a, Result<()>> {
		self.lock().extend(
			points.into_iter().map(|point| IndexedChunk { payload: point.payload, vector: point.vector }),
		);

		Box::pin(async { Ok(()) })
	}

	fn count<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<u64>> {
		let count = self
			.lock()
			.iter()
			.filter(|chunk| content_ids.contains(&chunk.payload.content_id))
			.count() as u64;

		Box::pin(async move { Ok(count) })
	}

	fn delete<'a>(&'a self, content_ids: &'a [u32]) -> BoxFuture<'a, Result<()>> {
		self.lock().retain(|chunk| !content_ids.contains(&chunk.payload.content_id));

		Box::pin(async { Ok(()) })
	}

	fn first_payload<'a>(
		&'a self,
		content_id: u32,
	) -> BoxFuture<'a, Result<Option<ChunkPayload>>> {
		let payload = self.chunks(content_id).into_iter().next();

		Box::pin(async move { Ok(payload) })
	}

	fn set_payload<'a>(
		&'a self,
		content_id: u32,
		patch: &'a ContentPatch,
	) -> BoxFuture<'a, Result<()>> {
		for chunk in self.lock().iter_mut().filter(|chunk| chunk.payload.content_id == content_id) {
			patch.apply(&mut chunk.payload);
		}

		Box::pin(async { Ok(()) })
	}

	fn recreate<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		self.lock().clear();

		Box::pin(async { Ok(()) })
	}
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
	left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// [`ContentStore`] that resolves ids to the matching records and their two ancestor levels.
///
/// Rebuild listings come from the separately inserted [`IndexSource`] rows.
#[derive(Default)]
pub struct MemoryContentStore {
	records: Mutex<Vec<(u32, ContentRecord)>>,
	sources: Mutex<Vec<IndexSource>>,
}
impl MemoryContentStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, company_id: u32, content_id: u32, parent_id: Option<u32>, title: &str) {
		let record = ContentRecord {
			content_id,
			parent_id,
			meta: ContentMeta { title: Some(title.to_string()), ..ContentMeta::default() },
		};

		self.records.lock().unwrap_or_else(|err| err.into_inner()).push((company_id, record));
	}

	pub fn insert_source(&self, source: IndexSource) {
		self.sources.lock().unwrap_or_else(|err| err.into_inner()).push(source);
	}
}
impl ContentStore for MemoryContentStore {
	fn get_contents<'a>(
		&'a self,
		content_ids: &'a [u32],
		company_id: u32,
	) -> BoxFuture<'a, Result<Vec<ContentRecord>>> {
		let records = self.records.lock().unwrap_or_else(|err| err.into_inner());
		let scoped = records
			.iter()
			.filter(|(company, _)| *company == company_id)
			.map(|(_, record)| record)
			.collect::<Vec<_>>();
		let matched = scoped
			.iter()
			.filter(|record| {
				content_ids.contains(&record.content_id)
					|| children(&scoped, record.content_id).any(|child| {
						content_ids.contains(&child)
							|| children(&scoped, child)
								.any(|grandchild| content_ids.contains(&grandchild))
					})
			})
			.map(|record| ContentRecord::clone(record))
			.collect::<Vec<_>>();

		Box::pin(async move { Ok(matched) })
	}

	fn index_sources<'a>(
		&'a self,
		offset: u64,
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<IndexSource>>> {
		let mut sources = self.sources.lock().unwrap_or_else(|err| err.into_inner()).clone();

		sources.sort_by_key(|source| source.content_id);

		let page =
			sources.into_iter().skip(offset as usize).take(limit as usize).collect::<Vec<_>>();

		Box::pin(async move { Ok(page) })
	}
}

fn children<'r>(
	records: &'r [&'r ContentRecord],
	parent_id: u32,
) -> impl Iterator<Item = u32> + 'r {
	records
		.iter()
		.filter(move |record| record.parent_id == Some(parent_id))
		.map(|record| record.content_id)
}
