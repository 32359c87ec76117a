use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, Query, QueryPointsBuilder,
		Range, ScoredPoint, ScrollPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder,
		Value, VectorParamsBuilder, value::Kind,
	},
};
use uuid::Uuid;

use crate::{
	Error, Result,
	filter::{ContentFilter, TimeRange},
	models::{ChunkPayload, ChunkPoint, ContentPatch, VectorHit},
};

/// Payload fields that get an index when the collection is created.
const INDEXED_FIELDS: [(&str, FieldType); 7] = [
	("content_id", FieldType::Integer),
	("company_id", FieldType::Integer),
	("circle_ids", FieldType::Integer),
	("content_type", FieldType::Keyword),
	("date_created", FieldType::Integer),
	("date_updated", FieldType::Integer),
	("user_created", FieldType::Keyword),
];

pub struct QdrantIndex {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantIndex {
	pub fn new(cfg: &wekiwi_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Nearest chunks visible to `company_id` through any of `circle_ids` that pass `filter`.
	pub async fn search(
		&self,
		vector: Vec<f32>,
		company_id: u32,
		circle_ids: &[u32],
		filter: &ContentFilter,
		limit: u64,
		offset: u64,
	) -> Result<Vec<VectorHit>> {
		self.check_dim(&vector)?;

		let query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.filter(access_filter(company_id, circle_ids, filter))
			.limit(limit)
			.offset(offset)
			.with_payload(true);
		let response = self.client.query(query).await?;

		Ok(collect_hits(response.result))
	}

	pub async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
		if points.is_empty() {
			return Ok(());
		}

		let mut structs = Vec::with_capacity(points.len());

		for point in points {
			self.check_dim(&point.vector)?;

			let payload = Payload::try_from(serde_json::to_value(&point.payload)?)?;

			structs.push(PointStruct::new(Uuid::new_v4().to_string(), point.vector, payload));
		}

		let count = structs.len();
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), structs).wait(true);

		self.client.upsert_points(upsert).await?;

		tracing::debug!(points = count, "Upserted chunk points.");

		Ok(())
	}

	/// Number of chunk points stored for `content_ids`.
	pub async fn count(&self, content_ids: &[u32]) -> Result<u64> {
		if content_ids.is_empty() {
			return Ok(0);
		}

		let count = CountPointsBuilder::new(self.collection.clone())
			.filter(contents_filter(content_ids))
			.exact(true);
		let response = self.client.count(count).await?;

		Ok(response.result.map(|result| result.count).unwrap_or(0))
	}

	pub async fn delete(&self, content_ids: &[u32]) -> Result<()> {
		if content_ids.is_empty() {
			return Ok(());
		}

		let delete = DeletePointsBuilder::new(self.collection.clone())
			.points(contents_filter(content_ids))
			.wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	/// Payload of any one chunk of `content_id`.
	pub async fn first_payload(&self, content_id: u32) -> Result<Option<ChunkPayload>> {
		let scroll = ScrollPointsBuilder::new(self.collection.clone())
			.filter(contents_filter(&[content_id]))
			.limit(1)
			.with_payload(true);
		let response = self.client.scroll(scroll).await?;
		let Some(point) = response.result.into_iter().next() else {
			return Ok(None);
		};

		Ok(Some(Payload::from(point.payload).deserialize()?))
	}

	/// Writes the fields set in `patch` onto every chunk of `content_id`.
	pub async fn set_payload(&self, content_id: u32, patch: &ContentPatch) -> Result<()> {
		let fields = patch_fields(patch)?;

		if fields.is_empty() {
			return Ok(());
		}

		let set = SetPayloadPointsBuilder::new(self.collection.clone(), Payload::from(fields))
			.points_selector(contents_filter(&[content_id]))
			.wait(true);

		self.client.set_payload(set).await?;

		Ok(())
	}

	/// Drops the collection if present and creates it empty, with payload indexes.
	pub async fn recreate(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			self.client.delete_collection(self.collection.clone()).await?;
		}

		let create = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine));

		self.client.create_collection(create).await?;

		for (field, field_type) in INDEXED_FIELDS {
			let index =
				CreateFieldIndexCollectionBuilder::new(self.collection.clone(), field, field_type)
					.wait(true);

			self.client.create_field_index(index).await?;
		}

		tracing::info!(collection = %self.collection, "Recreated vector collection.");

		Ok(())
	}

	fn check_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector has {} dimensions; collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		Ok(())
	}
}

/// Company and circle scoping plus the metadata clauses of `filter`.
pub fn access_filter(company_id: u32, circle_ids: &[u32], filter: &ContentFilter) -> Filter {
	let circles: Vec<i64> = circle_ids.iter().map(|id| i64::from(*id)).collect();
	let mut must = vec![
		Condition::matches("company_id", i64::from(company_id)),
		Condition::matches("circle_ids", circles),
	];
	let mut must_not = Vec::new();

	for (field, value) in [
		("content_type", &filter.content_type),
		("user_created", &filter.user_created),
		("user_updated", &filter.user_updated),
	] {
		if let Some(value) = value {
			must.push(Condition::matches(field, value.clone()));
		}
	}
	for (field, range) in
		[("date_created", &filter.date_created), ("date_updated", &filter.date_updated)]
	{
		let Some(range) = range else {
			continue;
		};

		if range.has_bounds() {
			must.push(Condition::range(field, bounds(range)));
		}
		if let Some(excluded) = range.ne {
			must_not.push(Condition::matches(field, excluded));
		}
	}

	Filter { must, must_not, ..Filter::default() }
}

fn contents_filter(content_ids: &[u32]) -> Filter {
	let ids: Vec<i64> = content_ids.iter().map(|id| i64::from(*id)).collect();

	Filter::must([Condition::matches("content_id", ids)])
}

fn bounds(range: &TimeRange) -> Range {
	let seconds = |bound: Option<i64>| bound.map(|value| value as f64);

	Range {
		gt: seconds(range.gt),
		gte: seconds(range.gte),
		lt: seconds(range.lt),
		lte: seconds(range.lte),
	}
}

fn patch_fields(patch: &ContentPatch) -> Result<serde_json::Map<String, serde_json::Value>> {
	let serde_json::Value::Object(mut fields) = serde_json::to_value(patch)? else {
		return Err(Error::InvalidArgument("Content patch must be an object.".to_string()));
	};

	fields.retain(|_, value| !value.is_null());

	Ok(fields)
}

fn collect_hits(points: Vec<ScoredPoint>) -> Vec<VectorHit> {
	let mut hits = Vec::with_capacity(points.len());

	for point in points {
		let Some(content_id) = payload_u32(&point.payload, "content_id") else {
			tracing::warn!("Vector hit missing content_id.");

			continue;
		};
		let Some(text) = payload_string(&point.payload, "text") else {
			tracing::warn!(content_id, "Vector hit missing text.");

			continue;
		};

		hits.push(VectorHit { content_id, text, score: point.score });
	}

	hits
}

fn payload_u32(payload: &HashMap<String, Value>, key: &str) -> Option<u32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => u32::try_from(*value).ok(),
		_ => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}
