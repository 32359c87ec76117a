use std::{
	collections::{HashMap, HashSet},
	fmt::Display,
	hash::Hash,
};

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;

/// Mean of the top `k_avg` scores per id.
pub type AggregatedScores<K> = HashMap<K, f32>;

/// One leaf match. Several chunks may carry the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk<K> {
	pub id: K,
	pub score: f32,
}
impl<K> ScoredChunk<K> {
	pub fn new(id: K, score: f32) -> Self {
		Self { id, score }
	}
}

/// A content-store record before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity<K, M> {
	pub id: K,
	pub parent_id: Option<K>,
	pub meta: M,
}

/// An [`Entity`] after the left join. `score` is `None` for entities the scoring stage never
/// matched, typically containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity<K, M> {
	pub id: K,
	pub parent_id: Option<K>,
	pub meta: M,
	pub score: Option<f32>,
}

/// Collapses duplicate observations into one score per id.
///
/// Each id gets the arithmetic mean of its `k_avg` highest scores, or of all of them when fewer
/// exist. Ids absent from `chunks` are absent from the result.
pub fn aggregate<K>(
	chunks: &[ScoredChunk<K>],
	k_avg: usize,
) -> Result<AggregatedScores<K>, AggregationError>
where
	K: Clone + Eq + Hash + Display,
{
	if k_avg == 0 {
		return Err(AggregationError::InvalidTopK);
	}

	let mut grouped: HashMap<K, Vec<f32>> = HashMap::new();

	for (position, chunk) in chunks.iter().enumerate() {
		if !chunk.score.is_finite() {
			return Err(AggregationError::NonFiniteScore { id: chunk.id.to_string(), position });
		}

		grouped.entry(chunk.id.clone()).or_default().push(chunk.score);
	}

	Ok(grouped.into_iter().map(|(id, scores)| (id, top_k_mean(scores, k_avg))).collect())
}

/// Left-joins aggregated scores onto entities by id, keeping entity order.
///
/// Repeated entity records collapse to their first occurrence.
pub fn join_scores<K, M>(
	entities: Vec<Entity<K, M>>,
	scores: &AggregatedScores<K>,
) -> Vec<ScoredEntity<K, M>>
where
	K: Clone + Eq + Hash + Display,
{
	let mut seen = HashSet::with_capacity(entities.len());
	let mut joined = Vec::with_capacity(entities.len());

	for Entity { id, parent_id, meta } in entities {
		if !seen.insert(id.clone()) {
			tracing::warn!(id = %id, "Duplicate entity record dropped.");

			continue;
		}

		let score = scores.get(&id).copied();

		joined.push(ScoredEntity { id, parent_id, meta, score });
	}

	joined
}

fn top_k_mean(mut scores: Vec<f32>, k_avg: usize) -> f32 {
	scores.sort_by(|a, b| b.total_cmp(a));
	scores.truncate(k_avg);

	let sum: f64 = scores.iter().map(|score| f64::from(*score)).sum();

	(sum / scores.len() as f64) as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	fn approx(actual: f32, expected: f32) -> bool {
		(actual - expected).abs() < 1e-6
	}

	#[test]
	fn averages_the_top_k_scores() {
		let chunks =
			[ScoredChunk::new(1, 0.9), ScoredChunk::new(1, 0.7), ScoredChunk::new(1, 0.5)];
		let scores = aggregate(&chunks, 2).expect("Aggregation failed.");

		assert_eq!(scores.len(), 1);
		assert!(approx(scores[&1], 0.8), "Unexpected score: {}", scores[&1]);
	}

	#[test]
	fn uses_every_score_when_fewer_than_k() {
		let scores = aggregate(&[ScoredChunk::new(2, 0.3)], 2).expect("Aggregation failed.");

		assert!(approx(scores[&2], 0.3));
	}

	#[test]
	fn input_order_does_not_matter() {
		let chunks = [
			ScoredChunk::new("b", 0.1),
			ScoredChunk::new("a", 0.2),
			ScoredChunk::new("b", 0.9),
			ScoredChunk::new("a", 0.6),
			ScoredChunk::new("b", 0.5),
		];
		let mut reversed = chunks.to_vec();

		reversed.reverse();

		let forward = aggregate(&chunks, 2).expect("Aggregation failed.");
		let backward = aggregate(&reversed, 2).expect("Aggregation failed.");

		assert_eq!(forward, backward);
		assert!(approx(forward[&"a"], 0.4));
		assert!(approx(forward[&"b"], 0.7));
	}

	#[test]
	fn rejects_zero_k() {
		assert_eq!(
			aggregate(&[ScoredChunk::new(1, 0.5)], 0),
			Err(AggregationError::InvalidTopK)
		);
	}

	#[test]
	fn rejects_non_finite_scores() {
		let chunks = [ScoredChunk::new(4, 0.5), ScoredChunk::new(7, f32::NAN)];

		assert_eq!(
			aggregate(&chunks, 1),
			Err(AggregationError::NonFiniteScore { id: "7".to_string(), position: 1 })
		);
	}

	#[test]
	fn left_join_keeps_unscored_entities() {
		let entities = vec![
			Entity { id: 1, parent_id: None, meta: "root" },
			Entity { id: 2, parent_id: Some(1), meta: "leaf" },
			Entity { id: 2, parent_id: Some(1), meta: "leaf copy" },
		];
		let scores = AggregatedScores::from([(2, 0.5), (9, 0.1)]);
		let joined = join_scores(entities, &scores);

		assert_eq!(joined.len(), 2);
		assert_eq!(joined[0].score, None);
		assert_eq!(joined[1].score, Some(0.5));
		assert_eq!(joined[1].meta, "leaf");
	}
}
