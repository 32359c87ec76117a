use std::{future::Future, time::Duration};

use tokio::{
	sync::Mutex,
	time::{self, Instant},
};

/// Spaces the start times of expensive background tasks at least `min_interval` apart.
///
/// Callers are admitted one at a time in arrival order. The first task starts immediately.
#[derive(Debug)]
pub struct Throttle {
	min_interval: Duration,
	last_start: Mutex<Option<Instant>>,
}
impl Throttle {
	pub fn new(min_interval: Duration) -> Self {
		Self { min_interval, last_start: Mutex::new(None) }
	}

	pub fn from_config(cfg: &wekiwi_config::Throttle) -> Self {
		Self::new(Duration::from_millis(cfg.min_interval_ms))
	}

	pub fn min_interval(&self) -> Duration {
		self.min_interval
	}

	pub async fn run<F, Fut, T>(&self, task: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		{
			let mut last_start = self.last_start.lock().await;

			if let Some(previous) = *last_start {
				let ready_at = previous + self.min_interval;
				let now = Instant::now();

				if ready_at > now {
					tracing::info!(
						wait_ms = (ready_at - now).as_millis() as u64,
						"Throttling task."
					);

					time::sleep_until(ready_at).await;
				}
			}

			*last_start = Some(Instant::now());
		}

		task().await
	}
}
