use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::{Error, Result, resource::Operation};

/// One-shot, single-consumer view of a submitted request's eventual outcome.
///
/// Await it from async code or call [`ResultHandle::blocking_wait`] from a plain thread. If the
/// coalescer goes away before resolving it, the handle yields [`Error::Closed`].
#[derive(Debug)]
pub struct ResultHandle<O> {
	operation: Operation,
	rx: oneshot::Receiver<Result<O>>,
}
impl<O> ResultHandle<O> {
	/// Creates an unresolved handle plus the single writer allowed to resolve it.
	pub fn pending(operation: Operation) -> (Resolver<O>, Self) {
		let (tx, rx) = oneshot::channel();

		(Resolver { operation, tx }, Self { operation, rx })
	}

	pub fn resolved(operation: Operation, result: Result<O>) -> Self {
		let (resolver, handle) = Self::pending(operation);

		resolver.resolve(result);

		handle
	}

	pub fn operation(&self) -> Operation {
		self.operation
	}

	/// Blocks the current thread until resolution. Must not be called from an async context.
	pub fn blocking_wait(self) -> Result<O> {
		let operation = self.operation;

		self.rx.blocking_recv().unwrap_or(Err(Error::Closed { operation }))
	}
}
impl<O> Unpin for ResultHandle<O> {}
impl<O> Future for ResultHandle<O> {
	type Output = Result<O>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let operation = self.operation;

		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|received| received.unwrap_or(Err(Error::Closed { operation })))
	}
}

/// Write side of a [`ResultHandle`]. Consumed on use, so a handle resolves at most once.
#[derive(Debug)]
pub struct Resolver<O> {
	operation: Operation,
	tx: oneshot::Sender<Result<O>>,
}
impl<O> Resolver<O> {
	pub fn resolve(self, result: Result<O>) {
		if self.tx.send(result).is_err() {
			tracing::trace!(operation = %self.operation, "Result handle dropped before resolution.");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn resolved_handle_yields_value() {
		let handle = ResultHandle::resolved(Operation::Embed, Ok(7_u32));

		assert_eq!(handle.await, Ok(7));
	}

	#[tokio::test]
	async fn dropped_resolver_closes_handle() {
		let (resolver, handle) = ResultHandle::<u32>::pending(Operation::Rerank);

		drop(resolver);

		assert_eq!(handle.await, Err(Error::Closed { operation: Operation::Rerank }));
	}

	#[test]
	fn blocking_wait_reads_from_plain_thread() {
		let (resolver, handle) = ResultHandle::pending(Operation::Embed);
		let waiter = std::thread::spawn(move || handle.blocking_wait());

		resolver.resolve(Ok("done"));

		assert_eq!(waiter.join().expect("Waiter thread panicked."), Ok("done"));
	}
}
