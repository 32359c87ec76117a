mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Batching, Coalescing, Config, Directus, EmbeddingProviderConfig, Indexing, ProviderConfig,
	Providers, Qdrant, Search, Security, Service, Storage, Throttle,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.security.api_secret.trim().is_empty() {
		return Err(Error::Validation {
			message: "security.api_secret must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.directus.admin_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.directus.admin_key must be non-empty.".to_string(),
		});
	}

	for (label, coalescing) in
		[("embedding", &cfg.batching.embedding), ("rerank", &cfg.batching.rerank)]
	{
		if coalescing.max_batch_size == 0 {
			return Err(Error::Validation {
				message: format!("batching.{label}.max_batch_size must be greater than zero."),
			});
		}
		if coalescing.accumulation_timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!(
					"batching.{label}.accumulation_timeout_ms must be greater than zero."
				),
			});
		}
	}

	if cfg.search.default_k_avg == 0 {
		return Err(Error::Validation {
			message: "search.default_k_avg must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_page_size == 0 {
		return Err(Error::Validation {
			message: "search.default_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.rerank_max_chars == 0 {
		return Err(Error::Validation {
			message: "search.rerank_max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.rerank_chunk_chars == 0
		|| cfg.search.rerank_chunk_chars > cfg.search.rerank_max_chars
	{
		return Err(Error::Validation {
			message: "search.rerank_chunk_chars must be in 1..=search.rerank_max_chars."
				.to_string(),
		});
	}
	if cfg.search.rerank_overlap_chars >= cfg.search.rerank_chunk_chars {
		return Err(Error::Validation {
			message: "search.rerank_overlap_chars must be less than search.rerank_chunk_chars."
				.to_string(),
		});
	}

	if cfg.indexing.chunk_chars == 0 {
		return Err(Error::Validation {
			message: "indexing.chunk_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.overlap_chars >= cfg.indexing.chunk_chars {
		return Err(Error::Validation {
			message: "indexing.overlap_chars must be less than indexing.chunk_chars.".to_string(),
		});
	}
	if cfg.indexing.rebuild_page_size == 0 {
		return Err(Error::Validation {
			message: "indexing.rebuild_page_size must be greater than zero.".to_string(),
		});
	}

	let mut keys = vec![("embedding", &cfg.providers.embedding.api_key)];

	if let Some(rerank) = cfg.providers.rerank.as_ref() {
		keys.push(("rerank", &rerank.api_key));
	}

	for (label, key) in keys {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for url in [
		&mut cfg.storage.directus.url,
		&mut cfg.storage.qdrant.url,
		&mut cfg.providers.embedding.api_base,
	] {
		trim_trailing_slash(url);
	}

	if let Some(rerank) = cfg.providers.rerank.as_mut() {
		trim_trailing_slash(&mut rerank.api_base);
	}
}

fn trim_trailing_slash(url: &mut String) {
	while url.ends_with('/') {
		url.pop();
	}
}
