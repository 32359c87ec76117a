use std::fmt;

use crate::error::{ComputeError, ComputeResult};

/// Operation tag attached to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Embed,
	Rerank,
}
impl Operation {
	pub const ALL: [Self; 2] = [Self::Embed, Self::Rerank];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Embed => "embed",
			Self::Rerank => "rerank",
		}
	}
}
impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The set of operations a [`ComputeResource`] declares it can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
	embed: bool,
	rerank: bool,
}
impl Capabilities {
	pub const fn none() -> Self {
		Self { embed: false, rerank: false }
	}

	pub const fn with(mut self, operation: Operation) -> Self {
		match operation {
			Operation::Embed => self.embed = true,
			Operation::Rerank => self.rerank = true,
		}

		self
	}

	pub const fn supports(self, operation: Operation) -> bool {
		match operation {
			Operation::Embed => self.embed,
			Operation::Rerank => self.rerank,
		}
	}

	pub const fn is_empty(self) -> bool {
		!self.embed && !self.rerank
	}

	pub fn operations(self) -> impl Iterator<Item = Operation> {
		Operation::ALL.into_iter().filter(move |operation| self.supports(*operation))
	}
}
impl FromIterator<Operation> for Capabilities {
	fn from_iter<T>(iter: T) -> Self
	where
		T: IntoIterator<Item = Operation>,
	{
		iter.into_iter().fold(Self::none(), Self::with)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerankPair {
	pub query: String,
	pub passage: String,
}
impl RerankPair {
	pub fn new(query: impl Into<String>, passage: impl Into<String>) -> Self {
		Self { query: query.into(), passage: passage.into() }
	}
}

/// A stateful, expensive model behind the scheduler.
///
/// Calls are synchronous and may block for a long time; the scheduler always runs them on the
/// blocking pool and never more than one at a time per resource. Outputs must be positionally
/// aligned with the inputs. Only the operations listed by [`ComputeResource::capabilities`] are
/// ever invoked.
pub trait ComputeResource
where
	Self: Send + Sync + 'static,
{
	fn name(&self) -> &str;

	fn capabilities(&self) -> Capabilities;

	fn embed(&self, texts: Vec<String>) -> ComputeResult<Vec<Vec<f32>>> {
		let _ = texts;

		Err(ComputeError::unsupported(Operation::Embed))
	}

	fn rerank(&self, pairs: Vec<RerankPair>) -> ComputeResult<Vec<f32>> {
		let _ = pairs;

		Err(ComputeError::unsupported(Operation::Rerank))
	}
}
