use std::{future::Future, sync::Arc};

use tokio::task::JoinHandle;

use wekiwi_batch::{BatchScheduler, SchedulerConfig, Throttle};
use wekiwi_providers::HttpModel;
use wekiwi_service::{Models, WekiwiService};
use wekiwi_storage::{directus::DirectusClient, qdrant::QdrantIndex};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<WekiwiService>,
	/// Shared pacing for background work started from request handlers.
	pub throttle: Arc<Throttle>,
	secret_hash: blake3::Hash,
}
impl AppState {
	/// Starts one batch scheduler per configured model and connects the stores.
	pub fn new(config: wekiwi_config::Config) -> color_eyre::Result<Self> {
		let scheduler_cfg = SchedulerConfig::from_config(&config.batching);
		let embedder = Arc::new(HttpModel::embedding(&config.providers.embedding)?);
		let embedding = Arc::new(BatchScheduler::start(embedder, &scheduler_cfg)?);
		let rerank = match config.providers.rerank.as_ref() {
			Some(cfg) => {
				let reranker = Arc::new(HttpModel::reranker(cfg)?);

				Some(Arc::new(BatchScheduler::start(reranker, &scheduler_cfg)?))
			},
			None => None,
		};
		let index = QdrantIndex::new(&config.storage.qdrant)?;
		let contents = DirectusClient::new(&config.storage.directus)?;
		let service = WekiwiService::new(
			config,
			Models { embedding, rerank },
			Arc::new(index),
			Arc::new(contents),
		);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: WekiwiService) -> Self {
		let secret_hash = blake3::hash(service.cfg.security.api_secret.as_bytes());
		let throttle = Arc::new(Throttle::from_config(&service.cfg.throttle));

		Self { service: Arc::new(service), throttle, secret_hash }
	}

	/// Compares digests, which is constant time in the token.
	pub fn is_authorized(&self, token: &str) -> bool {
		blake3::hash(token.as_bytes()) == self.secret_hash
	}

	/// Runs `task` in the background once the throttle admits it.
	pub fn spawn_throttled<F, Fut>(&self, task: F) -> JoinHandle<Fut::Output>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future + Send + 'static,
		Fut::Output: Send + 'static,
	{
		let throttle = Arc::clone(&self.throttle);

		tokio::spawn(async move { throttle.run(task).await })
	}
}
