use std::sync::Arc;

use crate::{
	Error, Result,
	coalescer::{Coalescer, CoalescerConfig},
	gate::Gate,
	handle::ResultHandle,
	resource::{Capabilities, ComputeResource, Operation, RerankPair},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
	pub embedding: CoalescerConfig,
	pub rerank: CoalescerConfig,
}
impl SchedulerConfig {
	pub fn from_config(cfg: &wekiwi_config::Batching) -> Self {
		Self {
			embedding: CoalescerConfig::from_config(&cfg.embedding),
			rerank: CoalescerConfig::from_config(&cfg.rerank),
		}
	}
}

/// Front door to one compute resource.
///
/// Owns a coalescer per declared capability, all sharing a single [`Gate`]. Requests for an
/// operation the resource does not declare resolve immediately with [`Error::Unsupported`].
pub struct BatchScheduler {
	resource: String,
	capabilities: Capabilities,
	gate: Gate,
	embed: Option<Coalescer<String, Vec<f32>>>,
	rerank: Option<Coalescer<RerankPair, f32>>,
}
impl BatchScheduler {
	/// Spawns the accumulation loops. Must be called from within a Tokio runtime.
	pub fn start<R>(resource: Arc<R>, config: &SchedulerConfig) -> Result<Self>
	where
		R: ?Sized + ComputeResource,
	{
		let name = resource.name().to_string();
		let capabilities = resource.capabilities();

		if capabilities.is_empty() {
			return Err(Error::NoCapabilities { resource: name });
		}

		let gate = Gate::exclusive();
		let embed = capabilities.supports(Operation::Embed).then(|| {
			let resource = Arc::clone(&resource);

			Coalescer::<String, Vec<f32>>::spawn(
				Operation::Embed,
				config.embedding,
				gate.clone(),
				Arc::new(move |texts: Vec<String>| resource.embed(texts)),
			)
		});
		let rerank = capabilities.supports(Operation::Rerank).then(|| {
			let resource = Arc::clone(&resource);

			Coalescer::<RerankPair, f32>::spawn(
				Operation::Rerank,
				config.rerank,
				gate.clone(),
				Arc::new(move |pairs: Vec<RerankPair>| resource.rerank(pairs)),
			)
		});

		tracing::info!(
			resource = %name,
			embed = embed.is_some(),
			rerank = rerank.is_some(),
			"Batch scheduler started."
		);

		Ok(Self { resource: name, capabilities, gate, embed, rerank })
	}

	pub fn embed(&self, text: impl Into<String>) -> ResultHandle<Vec<f32>> {
		match &self.embed {
			Some(coalescer) => coalescer.submit(text.into()),
			None => ResultHandle::resolved(Operation::Embed, Err(self.unsupported(Operation::Embed))),
		}
	}

	pub fn rerank(&self, pair: RerankPair) -> ResultHandle<f32> {
		match &self.rerank {
			Some(coalescer) => coalescer.submit(pair),
			None =>
				ResultHandle::resolved(Operation::Rerank, Err(self.unsupported(Operation::Rerank))),
		}
	}

	pub fn supports(&self, operation: Operation) -> bool {
		self.capabilities.supports(operation)
	}

	pub fn resource(&self) -> &str {
		&self.resource
	}

	pub fn is_busy(&self) -> bool {
		self.gate.is_held()
	}

	fn unsupported(&self, operation: Operation) -> Error {
		Error::Unsupported { resource: self.resource.clone(), operation }
	}
}
