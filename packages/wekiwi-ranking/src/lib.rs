//! Turns duplicate-keyed leaf scores into a ranked parent/child content forest.

pub mod aggregate;
pub mod hierarchy;

mod error;

pub use aggregate::{AggregatedScores, Entity, ScoredChunk, ScoredEntity, aggregate, join_scores};
pub use error::{AggregationError, Error, HierarchyError, Result, UnknownOrphanPolicy};
pub use hierarchy::{ContentNode, HierarchyBuilder, OrphanPolicy, build};

use std::{fmt::Display, hash::Hash};

/// Aggregates `chunks`, joins the scores onto `entities`, and builds the ranked forest.
pub fn rank<K, M>(
	chunks: &[ScoredChunk<K>],
	entities: Vec<Entity<K, M>>,
	k_avg: usize,
	orphans: OrphanPolicy,
) -> Result<Vec<ContentNode<K, M>>>
where
	K: Clone + Eq + Hash + Display,
{
	let scores = aggregate(chunks, k_avg)?;
	let joined = join_scores(entities, &scores);

	Ok(HierarchyBuilder::new().orphans(orphans).build(joined)?)
}
