use std::{collections::HashMap, fmt::Display, hash::Hash, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
	aggregate::ScoredEntity,
	error::{HierarchyError, UnknownOrphanPolicy},
};

/// One node of the ranked content forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode<K, M> {
	#[serde(rename = "content_id")]
	pub id: K,
	pub parent_id: Option<K>,
	#[serde(flatten)]
	pub meta: M,
	pub score: Option<f32>,
	/// Mean of every direct score in this subtree, this node's own included.
	pub avg_leaf_score: Option<f32>,
	#[serde(rename = "child_id")]
	pub children: Vec<ContentNode<K, M>>,
}
impl<K, M> ContentNode<K, M> {
	/// Sort key for roots.
	pub fn combined_score(&self) -> f32 {
		self.score.unwrap_or(0.0) + self.avg_leaf_score.unwrap_or(0.0)
	}
}

/// What to do with an entity whose `parent_id` is not in the input.
///
/// Deserializes from the case-insensitive names `reject`, `promote`, and `drop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum OrphanPolicy {
	/// Fail with [`HierarchyError::DanglingParent`].
	#[default]
	Reject,
	/// Treat the orphan as a root.
	Promote,
	/// Omit the orphan and its whole subtree.
	Drop,
}
impl FromStr for OrphanPolicy {
	type Err = UnknownOrphanPolicy;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"reject" => Ok(Self::Reject),
			"promote" => Ok(Self::Promote),
			"drop" => Ok(Self::Drop),
			_ => Err(UnknownOrphanPolicy { value: value.to_string() }),
		}
	}
}
impl TryFrom<String> for OrphanPolicy {
	type Error = UnknownOrphanPolicy;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyBuilder {
	orphans: OrphanPolicy,
}
impl HierarchyBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn orphans(mut self, policy: OrphanPolicy) -> Self {
		self.orphans = policy;

		self
	}

	/// Builds the ranked forest.
	///
	/// Each node's `avg_leaf_score` is the total of direct scores in its subtree divided by the
	/// number of scored nodes there; unscored nodes count for nothing. Roots are sorted
	/// descending by [`ContentNode::combined_score`], ties in input order. Children keep input
	/// order. Traversal is iterative, so depth is bounded only by memory.
	pub fn build<K, M>(
		&self,
		entities: Vec<ScoredEntity<K, M>>,
	) -> Result<Vec<ContentNode<K, M>>, HierarchyError>
	where
		K: Clone + Eq + Hash + Display,
	{
		let layout = Layout::index(&entities, self.orphans)?;
		let mut slots: Vec<Option<ScoredEntity<K, M>>> = entities.into_iter().map(Some).collect();
		let mut built: Vec<Option<Subtree<K, M>>> = Vec::with_capacity(slots.len());
		let mut visits = vec![Visit::Unseen; slots.len()];
		let mut roots = Vec::with_capacity(layout.roots.len());

		built.resize_with(slots.len(), || None);

		for &root in &layout.roots {
			let mut stack = vec![Frame::Enter(root)];

			while let Some(frame) = stack.pop() {
				match frame {
					Frame::Enter(index) => {
						if visits[index] != Visit::Unseen {
							return Err(HierarchyError::Cycle { id: layout.ids[index].clone() });
						}

						visits[index] = Visit::Open;

						stack.push(Frame::Exit(index));
						stack.extend(
							layout.children[index].iter().rev().map(|&child| Frame::Enter(child)),
						);
					},
					Frame::Exit(index) => {
						let Some(entity) = slots[index].take() else {
							return Err(HierarchyError::Cycle { id: layout.ids[index].clone() });
						};
						let mut subtree = Subtree::leaf(entity);

						for &child in &layout.children[index] {
							let Some(child) = built[child].take() else {
								return Err(HierarchyError::Cycle {
									id: layout.ids[child].clone(),
								});
							};

							subtree.adopt(child);
						}

						visits[index] = Visit::Done;
						built[index] = Some(subtree);
					},
				}
			}

			if let Some(subtree) = built[root].take() {
				roots.push(subtree.finish());
			}
		}

		layout.check_unreached(&visits)?;

		roots.sort_by(|a, b| b.combined_score().total_cmp(&a.combined_score()));

		Ok(roots)
	}
}

/// Builds the forest with [`OrphanPolicy::Reject`].
pub fn build<K, M>(
	entities: Vec<ScoredEntity<K, M>>,
) -> Result<Vec<ContentNode<K, M>>, HierarchyError>
where
	K: Clone + Eq + Hash + Display,
{
	HierarchyBuilder::new().build(entities)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
	Unseen,
	Open,
	Done,
}

enum Frame {
	Enter(usize),
	Exit(usize),
}

/// Positional view of the input: parent links resolved to indices.
struct Layout {
	ids: Vec<String>,
	parents: Vec<Option<usize>>,
	children: Vec<Vec<usize>>,
	roots: Vec<usize>,
}
impl Layout {
	fn index<K, M>(
		entities: &[ScoredEntity<K, M>],
		orphans: OrphanPolicy,
	) -> Result<Self, HierarchyError>
	where
		K: Clone + Eq + Hash + Display,
	{
		let mut positions: HashMap<&K, usize> = HashMap::with_capacity(entities.len());

		for (index, entity) in entities.iter().enumerate() {
			if entity.parent_id.as_ref() == Some(&entity.id) {
				return Err(HierarchyError::SelfParent { id: entity.id.to_string() });
			}
			if positions.insert(&entity.id, index).is_some() {
				return Err(HierarchyError::DuplicateId { id: entity.id.to_string() });
			}
		}

		let mut layout = Self {
			ids: entities.iter().map(|entity| entity.id.to_string()).collect(),
			parents: vec![None; entities.len()],
			children: vec![Vec::new(); entities.len()],
			roots: Vec::new(),
		};

		for (index, entity) in entities.iter().enumerate() {
			let Some(parent_id) = entity.parent_id.as_ref() else {
				layout.roots.push(index);

				continue;
			};

			match positions.get(parent_id) {
				Some(&parent) => {
					layout.parents[index] = Some(parent);
					layout.children[parent].push(index);
				},
				None => match orphans {
					OrphanPolicy::Reject =>
						return Err(HierarchyError::DanglingParent {
							id: entity.id.to_string(),
							parent_id: parent_id.to_string(),
						}),
					OrphanPolicy::Promote => layout.roots.push(index),
					OrphanPolicy::Drop => {
						tracing::debug!(
							id = %entity.id,
							parent_id = %parent_id,
							"Dropping entity with missing parent."
						);
					},
				},
			}
		}

		Ok(layout)
	}

	/// Every entity not reached from a root either sits below a dropped orphan or on a parent
	/// cycle. Walks parent links from each unreached entity to tell the two apart.
	fn check_unreached(&self, visits: &[Visit]) -> Result<(), HierarchyError> {
		let mut dropped = vec![false; visits.len()];
		let mut walked_from = vec![usize::MAX; visits.len()];

		for start in 0..visits.len() {
			if visits[start] != Visit::Unseen || dropped[start] {
				continue;
			}

			let mut path = Vec::new();
			let mut cursor = start;

			loop {
				if walked_from[cursor] == start {
					return Err(HierarchyError::Cycle { id: self.ids[cursor].clone() });
				}

				walked_from[cursor] = start;

				path.push(cursor);

				match self.parents[cursor] {
					Some(parent) if !dropped[parent] => cursor = parent,
					_ => break,
				}
			}

			for index in path {
				dropped[index] = true;
			}
		}

		Ok(())
	}
}

/// A finished subtree plus the totals its parent needs.
struct Subtree<K, M> {
	node: ContentNode<K, M>,
	total_score: f32,
	leaf_count: usize,
}
impl<K, M> Subtree<K, M> {
	fn leaf(entity: ScoredEntity<K, M>) -> Self {
		let ScoredEntity { id, parent_id, meta, score } = entity;
		let (total_score, leaf_count) = match score {
			Some(score) => (score, 1),
			None => (0.0, 0),
		};

		Self {
			node: ContentNode {
				id,
				parent_id,
				meta,
				score,
				avg_leaf_score: None,
				children: Vec::new(),
			},
			total_score,
			leaf_count,
		}
	}

	fn adopt(&mut self, child: Self) {
		self.total_score += child.total_score;
		self.leaf_count += child.leaf_count;

		self.node.children.push(child.finish());
	}

	fn finish(mut self) -> ContentNode<K, M> {
		self.node.avg_leaf_score =
			(self.leaf_count > 0).then(|| self.total_score / self.leaf_count as f32);

		self.node
	}
}
