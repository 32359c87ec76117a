use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Exclusive access token for one compute resource.
///
/// Every coalescer bound to the same resource shares one gate, so at most one batch of any
/// operation runs against the resource at a time. Waiters are served in FIFO order.
#[derive(Debug, Clone)]
pub struct Gate {
	permits: Arc<Semaphore>,
}
impl Gate {
	pub fn exclusive() -> Self {
		Self { permits: Arc::new(Semaphore::new(1)) }
	}

	/// Waits for the gate. Returns `None` only if the gate was closed.
	pub async fn enter(&self) -> Option<SemaphorePermit<'_>> {
		self.permits.acquire().await.ok()
	}

	pub fn is_held(&self) -> bool {
		self.permits.available_permits() == 0
	}
}
impl Default for Gate {
	fn default() -> Self {
		Self::exclusive()
	}
}
