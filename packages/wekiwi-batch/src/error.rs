use crate::resource::Operation;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure delivered through a [`crate::ResultHandle`].
///
/// Cloneable because one batch failure is handed to every request of that batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("{operation} batch failed: {message}")]
	Compute { operation: Operation, message: String },
	#[error("{operation} batch returned {actual} outputs for {expected} inputs.")]
	OutputCount { operation: Operation, expected: usize, actual: usize },
	#[error("Resource {resource} does not support {operation}.")]
	Unsupported { resource: String, operation: Operation },
	#[error("The {operation} coalescer shut down before resolving the request.")]
	Closed { operation: Operation },
	#[error("Resource {resource} declares no supported operations.")]
	NoCapabilities { resource: String },
}

/// Error raised by a [`crate::ComputeResource`] for a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ComputeError {
	message: String,
}
impl ComputeError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	pub fn unsupported(operation: Operation) -> Self {
		Self::new(format!("Operation {operation} is not implemented by this resource."))
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

pub type ComputeResult<T> = std::result::Result<T, ComputeError>;
