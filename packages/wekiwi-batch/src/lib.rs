//! Micro-batching front end for expensive, stateful model resources.
//!
//! Individual requests are submitted without waiting and receive a [`ResultHandle`]. Requests of
//! the same operation are grouped into batches by a [`Coalescer`], and every coalescer bound to
//! one resource shares a single [`Gate`] so the resource only ever serves one batch at a time.

pub mod coalescer;
pub mod gate;
pub mod handle;
pub mod resource;
pub mod scheduler;
pub mod throttle;

mod error;

pub use coalescer::{BatchFn, Coalescer, CoalescerConfig};
pub use error::{ComputeError, ComputeResult, Error, Result};
pub use gate::Gate;
pub use handle::{Resolver, ResultHandle};
pub use resource::{Capabilities, ComputeResource, Operation, RerankPair};
pub use scheduler::{BatchScheduler, SchedulerConfig};
pub use throttle::Throttle;
