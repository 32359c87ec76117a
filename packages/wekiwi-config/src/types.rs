use serde::Deserialize;
use serde_json::{Map, Value};

use wekiwi_ranking::OrphanPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub security: Security,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub batching: Batching,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub indexing: Indexing,
	#[serde(default)]
	pub throttle: Throttle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	/// Shared bearer secret every authenticated route is checked against.
	pub api_secret: String,
	#[serde(default = "default_true")]
	pub bind_localhost_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
	pub directus: Directus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directus {
	pub url: String,
	pub admin_key: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	/// Optional. Searches that ask for reranking fail when no reranker is configured.
	pub rerank: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Batching {
	pub embedding: Coalescing,
	pub rerank: Coalescing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Coalescing {
	/// Upper bound on items handed to the model in one invocation.
	pub max_batch_size: usize,
	/// Longest time the oldest pending item waits before its batch is flushed.
	pub accumulation_timeout_ms: u64,
}
impl Default for Coalescing {
	fn default() -> Self {
		Self { max_batch_size: 32, accumulation_timeout_ms: 150 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_k_avg: u32,
	pub default_page_size: u32,
	pub max_query_chars: usize,
	/// Texts longer than this are split into windows before reranking.
	pub rerank_max_chars: usize,
	pub rerank_chunk_chars: usize,
	pub rerank_overlap_chars: usize,
	pub orphan_policy: OrphanPolicy,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_k_avg: 2,
			default_page_size: 20,
			max_query_chars: 256,
			rerank_max_chars: 1_024,
			rerank_chunk_chars: 368,
			rerank_overlap_chars: 30,
			orphan_policy: OrphanPolicy::Reject,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Indexing {
	/// Characters per indexed chunk.
	pub chunk_chars: usize,
	pub overlap_chars: usize,
	/// Contents listed per request during a rebuild.
	pub rebuild_page_size: u64,
}
impl Default for Indexing {
	fn default() -> Self {
		Self { chunk_chars: 368, overlap_chars: 30, rebuild_page_size: 100 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Throttle {
	pub min_interval_ms: u64,
}
impl Default for Throttle {
	fn default() -> Self {
		Self { min_interval_ms: 60_000 }
	}
}

fn default_true() -> bool {
	true
}

fn default_timeout_ms() -> u64 {
	30_000
}
