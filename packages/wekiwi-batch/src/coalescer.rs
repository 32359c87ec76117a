use std::{sync::Arc, time::Duration};

use tokio::{
	sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::SendError},
	task,
	time::{self, Instant},
};

use crate::{
	Error, Result,
	error::ComputeResult,
	gate::Gate,
	handle::{Resolver, ResultHandle},
	resource::Operation,
};

/// Batch callable run on the blocking pool. Outputs must align with inputs by position.
pub type BatchFn<I, O> = Arc<dyn Fn(Vec<I>) -> ComputeResult<Vec<O>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
	pub max_batch_size: usize,
	pub accumulation_timeout: Duration,
}
impl CoalescerConfig {
	pub fn new(max_batch_size: usize, accumulation_timeout: Duration) -> Self {
		Self { max_batch_size: max_batch_size.max(1), accumulation_timeout }
	}

	pub fn from_config(cfg: &wekiwi_config::Coalescing) -> Self {
		Self::new(cfg.max_batch_size, Duration::from_millis(cfg.accumulation_timeout_ms))
	}
}
impl Default for CoalescerConfig {
	fn default() -> Self {
		Self::from_config(&wekiwi_config::Coalescing::default())
	}
}

struct Request<I, O> {
	payload: I,
	arrived_at: Instant,
	resolver: Resolver<O>,
}

/// Groups requests of one operation into batches for a shared compute resource.
///
/// `submit` never waits. A background loop collects requests until either the batch is full or
/// the oldest pending request has waited `accumulation_timeout`, then runs the batch while
/// holding the resource gate. Dropping the coalescer flushes whatever is still queued and stops
/// the loop.
pub struct Coalescer<I, O> {
	operation: Operation,
	queue: UnboundedSender<Request<I, O>>,
}
impl<I, O> Coalescer<I, O>
where
	I: Send + 'static,
	O: Send + 'static,
{
	/// Starts the accumulation loop on the current Tokio runtime.
	pub fn spawn(
		operation: Operation,
		config: CoalescerConfig,
		gate: Gate,
		batch_fn: BatchFn<I, O>,
	) -> Self {
		let (queue, rx) = mpsc::unbounded_channel();
		let dispatcher = Dispatcher { operation, config, gate, batch_fn };

		tokio::spawn(dispatcher.run(rx));

		Self { operation, queue }
	}

	pub fn submit(&self, payload: I) -> ResultHandle<O> {
		let (resolver, handle) = ResultHandle::pending(self.operation);
		let request = Request { payload, arrived_at: Instant::now(), resolver };

		if let Err(SendError(request)) = self.queue.send(request) {
			request.resolver.resolve(Err(Error::Closed { operation: self.operation }));
		}

		handle
	}

	pub fn operation(&self) -> Operation {
		self.operation
	}
}

struct Dispatcher<I, O> {
	operation: Operation,
	config: CoalescerConfig,
	gate: Gate,
	batch_fn: BatchFn<I, O>,
}
impl<I, O> Dispatcher<I, O>
where
	I: Send + 'static,
	O: Send + 'static,
{
	async fn run(self, mut rx: UnboundedReceiver<Request<I, O>>) {
		tracing::debug!(
			operation = %self.operation,
			max_batch_size = self.config.max_batch_size,
			accumulation_timeout_ms = self.config.accumulation_timeout.as_millis() as u64,
			"Coalescer started."
		);

		while let Some(batch) = self.next_batch(&mut rx).await {
			self.flush(batch).await;
		}

		tracing::debug!(operation = %self.operation, "Coalescer stopped.");
	}

	/// Waits without a deadline for the first request, then fills the batch until it is full or
	/// the first request's deadline passes. Returns `None` once the queue is closed and drained.
	async fn next_batch(
		&self,
		rx: &mut UnboundedReceiver<Request<I, O>>,
	) -> Option<Vec<Request<I, O>>> {
		let first = rx.recv().await?;
		let deadline = first.arrived_at + self.config.accumulation_timeout;
		let mut batch = vec![first];

		while batch.len() < self.config.max_batch_size {
			match time::timeout_at(deadline, rx.recv()).await {
				Ok(Some(request)) => batch.push(request),
				Ok(None) | Err(_) => break,
			}
		}

		Some(batch)
	}

	async fn flush(&self, batch: Vec<Request<I, O>>) {
		let batch_size = batch.len();
		let (inputs, resolvers): (Vec<I>, Vec<Resolver<O>>) =
			batch.into_iter().map(|request| (request.payload, request.resolver)).unzip();

		match self.invoke(inputs).await {
			Ok(outputs) =>
				for (resolver, output) in resolvers.into_iter().zip(outputs) {
					resolver.resolve(Ok(output));
				},
			Err(err) => {
				tracing::error!(
					operation = %self.operation,
					batch_size,
					error = %err,
					"Batch failed."
				);

				for resolver in resolvers {
					resolver.resolve(Err(err.clone()));
				}
			},
		}
	}

	async fn invoke(&self, inputs: Vec<I>) -> Result<Vec<O>> {
		let operation = self.operation;
		let expected = inputs.len();
		let Some(_permit) = self.gate.enter().await else {
			return Err(Error::Closed { operation });
		};
		let batch_fn = Arc::clone(&self.batch_fn);
		let started = Instant::now();
		let outputs = match task::spawn_blocking(move || batch_fn(inputs)).await {
			Ok(Ok(outputs)) => outputs,
			Ok(Err(err)) => return Err(Error::Compute { operation, message: err.to_string() }),
			Err(err) =>
				return Err(Error::Compute {
					operation,
					message: format!("Compute task did not complete: {err}."),
				}),
		};

		tracing::debug!(
			operation = %operation,
			batch_size = expected,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Batch computed."
		);

		if outputs.len() != expected {
			return Err(Error::OutputCount { operation, expected, actual: outputs.len() });
		}

		Ok(outputs)
	}
}
