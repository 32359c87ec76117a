use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use wekiwi_config::{Config, Error};
use wekiwi_ranking::OrphanPolicy;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &[&str], key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for name in section {
		table = table
			.get_mut(*name)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{name}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn sample_toml_without(section: &str) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove(section);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("wekiwi_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_error(payload: String) -> String {
	let path = write_temp_config(payload);
	let result = wekiwi_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result.expect_err("Expected validation error.").to_string()
}

#[test]
fn template_config_loads_and_normalizes_urls() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = wekiwi_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Template config must be valid.");

	assert_eq!(cfg.storage.qdrant.url, "http://127.0.0.1:6334");
	assert_eq!(cfg.storage.directus.url, "http://127.0.0.1:8055");
	assert_eq!(cfg.batching.embedding.max_batch_size, 16);
	assert_eq!(cfg.batching.rerank.accumulation_timeout_ms, 100);
	assert!(cfg.providers.rerank.is_some());
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let payload = sample_toml_without("batching");
	let payload = {
		let mut root: Value = toml::from_str(&payload).expect("Failed to parse config.");
		let table = root.as_table_mut().expect("Config must be a table.");

		table.remove("search");
		table.remove("throttle");

		toml::to_string(&root).expect("Failed to render config.")
	};
	let cfg: Config = toml::from_str(&payload).expect("Failed to parse config.");

	wekiwi_config::validate(&cfg).expect("Defaults must be valid.");

	assert_eq!(cfg.batching.embedding.max_batch_size, 32);
	assert_eq!(cfg.batching.embedding.accumulation_timeout_ms, 150);
	assert_eq!(cfg.search.default_k_avg, 2);
	assert_eq!(cfg.search.orphan_policy, OrphanPolicy::Reject);
	assert_eq!(cfg.throttle.min_interval_ms, 60_000);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let message = load_error(sample_toml_with(
		&["providers", "embedding"],
		"dimensions",
		Value::Integer(1_024),
	));

	assert!(
		message.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn zero_batch_size_is_rejected() {
	let message = load_error(sample_toml_with(
		&["batching", "rerank"],
		"max_batch_size",
		Value::Integer(0),
	));

	assert!(
		message.contains("batching.rerank.max_batch_size must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn zero_accumulation_timeout_is_rejected() {
	let message = load_error(sample_toml_with(
		&["batching", "embedding"],
		"accumulation_timeout_ms",
		Value::Integer(0),
	));

	assert!(
		message.contains("batching.embedding.accumulation_timeout_ms must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn zero_k_avg_is_rejected() {
	let message =
		load_error(sample_toml_with(&["search"], "default_k_avg", Value::Integer(0)));

	assert!(
		message.contains("search.default_k_avg must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn orphan_policy_parses_case_insensitively_at_load() {
	let path = write_temp_config(sample_toml_with(
		&["search"],
		"orphan_policy",
		Value::String(" Promote ".to_string()),
	));
	let result = wekiwi_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert_eq!(result.expect("Config must load.").search.orphan_policy, OrphanPolicy::Promote);

	let path = write_temp_config(sample_toml_with(
		&["search"],
		"orphan_policy",
		Value::String("ignore".to_string()),
	));
	let result = wekiwi_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	match result.expect_err("Expected an unknown orphan policy to fail.") {
		Error::ParseConfig { source, .. } => assert!(
			source.to_string().contains("Unknown orphan policy \"ignore\""),
			"Unexpected parse error: {source}"
		),
		err => panic!("Unexpected error: {err}"),
	}
}

#[test]
fn indexing_overlap_must_be_smaller_than_chunk() {
	let message = load_error(sample_toml_with(
		&["indexing"],
		"overlap_chars",
		Value::Integer(368),
	));

	assert!(
		message.contains("indexing.overlap_chars must be less than indexing.chunk_chars."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rerank_overlap_must_be_smaller_than_window() {
	let message = load_error(sample_toml_with(
		&["search"],
		"rerank_overlap_chars",
		Value::Integer(368),
	));

	assert!(
		message.contains("search.rerank_overlap_chars must be less than search.rerank_chunk_chars."),
		"Unexpected error message: {message}"
	);

	let message = load_error(sample_toml_with(
		&["search"],
		"rerank_chunk_chars",
		Value::Integer(2_048),
	));

	assert!(
		message.contains("search.rerank_chunk_chars must be in 1..=search.rerank_max_chars."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn api_secret_must_be_non_empty() {
	let message = load_error(sample_toml_with(
		&["security"],
		"api_secret",
		Value::String("   ".to_string()),
	));

	assert!(
		message.contains("security.api_secret must be non-empty."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rerank_provider_is_optional_but_validated_when_present() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.get_mut("providers")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [providers].")
		.remove("rerank");

	let cfg: Config = toml::from_str(&toml::to_string(&root).expect("Failed to render config."))
		.expect("Failed to parse config.");

	assert!(cfg.providers.rerank.is_none());
	wekiwi_config::validate(&cfg).expect("Config without reranker must be valid.");

	let message = load_error(sample_toml_with(
		&["providers", "rerank"],
		"api_key",
		Value::String(String::new()),
	));

	assert!(
		message.contains("Provider rerank api_key must be non-empty."),
		"Unexpected error message: {message}"
	);
}
