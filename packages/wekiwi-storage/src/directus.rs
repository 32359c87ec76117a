use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
	Result,
	models::{ContentRecord, IndexSource},
};

/// Fields requested for every content row, in wire order.
pub const CONTENT_FIELDS: [&str; 13] = [
	"content_id",
	"file_id",
	"content_type",
	"title",
	"text",
	"parent_id",
	"date_created",
	"date_updated",
	"interaction_id.interaction_id",
	"user_created.avatar",
	"user_created.username",
	"user_updated.avatar",
	"user_updated.username",
];

/// Fields requested when listing contents for a rebuild.
pub const INDEX_SOURCE_FIELDS: [&str; 11] = [
	"content_id",
	"company_id",
	"parent_id",
	"content_type",
	"title",
	"text",
	"date_created",
	"date_updated",
	"user_created",
	"user_updated",
	"circle_contents.circle_id.circle_id",
];

#[derive(Deserialize)]
struct ItemsResponse<T> {
	data: Vec<T>,
}

pub struct DirectusClient {
	client: Client,
	base_url: String,
	admin_key: String,
}
impl DirectusClient {
	pub fn new(cfg: &wekiwi_config::Directus) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, base_url: cfg.url.clone(), admin_key: cfg.admin_key.clone() })
	}

	/// Rows in `company_id` whose id, child's id, or grandchild's id is in `content_ids`.
	///
	/// The parents come back alongside the matches so the caller can rebuild the tree.
	pub async fn get_contents(
		&self,
		content_ids: &[u32],
		company_id: u32,
	) -> Result<Vec<ContentRecord>> {
		if content_ids.is_empty() {
			return Ok(Vec::new());
		}

		let filter = serde_json::to_string(&contents_filter(content_ids, company_id))?;
		let fields = CONTENT_FIELDS.join(",");
		let data: Vec<ContentRecord> = self
			.items(&[("filter", filter.as_str()), ("fields", fields.as_str()), ("limit", "-1")])
			.await?;

		tracing::debug!(requested = content_ids.len(), returned = data.len(), "Fetched contents.");

		Ok(data)
	}

	/// One page of text contents in `content_id` order, with their circles.
	pub async fn index_sources(&self, offset: u64, limit: u64) -> Result<Vec<IndexSource>> {
		let filter = serde_json::to_string(&index_sources_filter())?;
		let fields = INDEX_SOURCE_FIELDS.join(",");
		let offset = offset.to_string();
		let limit = limit.to_string();

		self.items(&[
			("filter", filter.as_str()),
			("fields", fields.as_str()),
			("sort", "content_id"),
			("offset", offset.as_str()),
			("limit", limit.as_str()),
		])
		.await
	}

	async fn items<T>(&self, query: &[(&str, &str)]) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		let res = self
			.client
			.get(format!("{}/items/contents", self.base_url))
			.bearer_auth(&self.admin_key)
			.query(query)
			.send()
			.await?;
		let body: ItemsResponse<T> = res.error_for_status()?.json().await?;

		Ok(body.data)
	}
}

pub fn contents_filter(content_ids: &[u32], company_id: u32) -> Value {
	json!({
		"_and": [
			{ "company_id": { "_eq": company_id } },
			{
				"_or": [
					{ "content_id": { "_in": content_ids } },
					{ "child_id": { "content_id": { "_in": content_ids } } },
					{ "child_id": { "child_id": { "content_id": { "_in": content_ids } } } },
				]
			},
		]
	})
}

/// Only text contents are indexed.
pub fn index_sources_filter() -> Value {
	json!({ "content_type": { "_eq": "text" } })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filter_scopes_company_and_matches_three_levels() {
		let filter = contents_filter(&[5, 8], 2);

		assert_eq!(filter["_and"][0], json!({ "company_id": { "_eq": 2 } }));
		assert_eq!(filter["_and"][1]["_or"][0], json!({ "content_id": { "_in": [5, 8] } }));
		assert_eq!(
			filter["_and"][1]["_or"][2]["child_id"]["child_id"],
			json!({ "content_id": { "_in": [5, 8] } })
		);
	}

	#[test]
	fn response_envelope_unwraps_data() {
		let body: ItemsResponse<ContentRecord> = serde_json::from_value(json!({
			"data": [{ "content_id": 1, "parent_id": null, "title": "Root" }]
		}))
		.expect("Decode failed.");

		assert_eq!(body.data.len(), 1);
		assert_eq!(body.data[0].meta.title.as_deref(), Some("Root"));
	}
}
