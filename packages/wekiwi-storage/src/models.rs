use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A nearest-neighbour match from the vector index. Several hits may share a `content_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
	pub content_id: u32,
	pub text: String,
	pub score: f32,
}

/// One row of the `contents` collection as requested by the search path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
	pub content_id: u32,
	#[serde(default)]
	pub parent_id: Option<u32>,
	#[serde(flatten)]
	pub meta: ContentMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMeta {
	#[serde(default)]
	pub file_id: Option<Uuid>,
	#[serde(default)]
	pub content_type: Option<String>,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default, with = "crate::dates::option")]
	pub date_created: Option<OffsetDateTime>,
	#[serde(default, with = "crate::dates::option")]
	pub date_updated: Option<OffsetDateTime>,
	/// Directus returns the relation as `{ "interaction_id": n }`; exposed flat.
	#[serde(default, deserialize_with = "interaction_ref")]
	pub interaction_id: Option<u32>,
	#[serde(default)]
	pub user_created: Option<UserRef>,
	#[serde(default)]
	pub user_updated: Option<UserRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
	#[serde(default)]
	pub avatar: Option<Uuid>,
	#[serde(default)]
	pub username: Option<String>,
}

/// Content-level fields copied onto every indexed chunk of a content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
	#[serde(default)]
	pub parent_id: Option<u32>,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub content_type: Option<String>,
	/// Unix seconds.
	#[serde(default, deserialize_with = "crate::dates::unix_seconds")]
	pub date_created: Option<i64>,
	/// Unix seconds.
	#[serde(default, deserialize_with = "crate::dates::unix_seconds")]
	pub date_updated: Option<i64>,
	/// Directus user id.
	#[serde(default)]
	pub user_created: Option<String>,
	#[serde(default)]
	pub user_updated: Option<String>,
}
impl ChunkMeta {
	/// Overwrites every field that is set in `patch`.
	pub fn merge(&mut self, patch: &ChunkMeta) {
		merge_field(&mut self.parent_id, &patch.parent_id);
		merge_field(&mut self.title, &patch.title);
		merge_field(&mut self.content_type, &patch.content_type);
		merge_field(&mut self.date_created, &patch.date_created);
		merge_field(&mut self.date_updated, &patch.date_updated);
		merge_field(&mut self.user_created, &patch.user_created);
		merge_field(&mut self.user_updated, &patch.user_updated);
	}
}

/// Payload stored with every point of the vector index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
	pub content_id: u32,
	pub company_id: u32,
	pub circle_ids: Vec<u32>,
	pub text: String,
	#[serde(flatten)]
	pub meta: ChunkMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPoint {
	pub vector: Vec<f32>,
	pub payload: ChunkPayload,
}

/// Partial update applied to every chunk of one content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPatch {
	#[serde(default)]
	pub company_id: Option<u32>,
	#[serde(default)]
	pub circle_ids: Option<Vec<u32>>,
	#[serde(flatten)]
	pub meta: ChunkMeta,
}
impl ContentPatch {
	pub fn apply(&self, payload: &mut ChunkPayload) {
		merge_field(&mut payload.company_id, &self.company_id);

		if let Some(circle_ids) = &self.circle_ids {
			payload.circle_ids = circle_ids.clone();
		}

		payload.meta.merge(&self.meta);
	}
}

/// A content row with everything the index needs, as listed for a rebuild.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexSource {
	pub content_id: u32,
	#[serde(default)]
	pub company_id: Option<u32>,
	#[serde(default)]
	pub text: Option<String>,
	/// Directus returns the junction rows as `[{ "circle_id": { "circle_id": n } }]`.
	#[serde(default, rename = "circle_contents", deserialize_with = "circle_refs")]
	pub circle_ids: Vec<u32>,
	#[serde(flatten)]
	pub meta: ChunkMeta,
}

fn merge_field<T, U>(target: &mut T, patch: &Option<U>)
where
	U: Clone + Into<T>,
{
	if let Some(value) = patch {
		*target = value.clone().into();
	}
}

fn circle_refs<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	struct Junction {
		circle_id: Option<CircleRef>,
	}

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum CircleRef {
		Nested { circle_id: u32 },
		Flat(u32),
	}

	let rows = Option::<Vec<Junction>>::deserialize(deserializer)?.unwrap_or_default();

	Ok(rows
		.into_iter()
		.filter_map(|row| match row.circle_id? {
			CircleRef::Nested { circle_id } | CircleRef::Flat(circle_id) => Some(circle_id),
		})
		.collect())
}

fn interaction_ref<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Nested { interaction_id: Option<u32> },
		Flat(u32),
	}

	Ok(match Option::<Raw>::deserialize(deserializer)? {
		Some(Raw::Nested { interaction_id }) => interaction_id,
		Some(Raw::Flat(id)) => Some(id),
		None => None,
	})
}
