pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Aggregation(#[from] AggregationError),
	#[error(transparent)]
	Hierarchy(#[from] HierarchyError),
}

/// Malformed scored-chunk input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
	#[error("k_avg must be greater than zero.")]
	InvalidTopK,
	#[error("Score for {id} at position {position} is not a finite number.")]
	NonFiniteScore { id: String, position: usize },
}

/// Entity list that cannot be turned into a forest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
	#[error("Entity {id} appears more than once.")]
	DuplicateId { id: String },
	#[error("Entity {id} names itself as its parent.")]
	SelfParent { id: String },
	#[error("Entity {id} references missing parent {parent_id}.")]
	DanglingParent { id: String, parent_id: String },
	#[error("Entity {id} is part of a parent cycle.")]
	Cycle { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown orphan policy {value:?}; expected reject, promote, or drop.")]
pub struct UnknownOrphanPolicy {
	pub value: String,
}
