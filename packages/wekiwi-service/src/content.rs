use serde::{Deserialize, Serialize};

use wekiwi_storage::models::{ChunkMeta, ChunkPayload, ChunkPoint, ContentPatch};

use crate::{Error, Result, WekiwiService, text};

/// A content as sent by the application: HTML `text` plus the metadata copied onto its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentInput {
	pub content_id: u32,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(flatten)]
	pub meta: ChunkMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContentRequest {
	pub content: ContentInput,
	pub company_id: u32,
	pub circle_ids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContentRequest {
	pub content: ContentInput,
	#[serde(default)]
	pub company_id: Option<u32>,
	#[serde(default)]
	pub circle_ids: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMessage {
	pub message: String,
}
impl ContentMessage {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
	pub contents: u64,
	pub chunks: u64,
	/// Contents with neither title nor text.
	pub skipped: u64,
	pub failed: u64,
}

impl WekiwiService {
	/// Chunks, embeds, and indexes a content, replacing any chunks it already had.
	pub async fn create_content(&self, req: CreateContentRequest) -> Result<ContentMessage> {
		let CreateContentRequest { content, company_id, circle_ids } = req;
		let content_id = content.content_id;
		let texts = self.chunk_texts(content.meta.title.as_deref(), content.text.as_deref());

		if texts.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Title or text must be provided.".to_string(),
			});
		}

		let base = ChunkPayload {
			content_id,
			company_id,
			circle_ids,
			text: String::new(),
			meta: content.meta,
		};
		let points = self.embed_chunks(&base, texts).await?;
		let chunks = points.len();

		self.index.delete(&[content_id]).await?;
		self.index.upsert(points).await?;

		tracing::info!(content_id, company_id, chunks, "Content indexed.");

		Ok(ContentMessage::new(format!("Indexed content {content_id} in {chunks} chunks.")))
	}

	/// Applies new metadata to an indexed content. New text re-chunks and re-embeds it.
	pub async fn update_content(&self, req: UpdateContentRequest) -> Result<ContentMessage> {
		let UpdateContentRequest { content, company_id, circle_ids } = req;
		let content_id = content.content_id;
		let Some(mut payload) = self.index.first_payload(content_id).await? else {
			return Err(Error::NotFound { message: format!("Content {content_id} is not indexed.") });
		};
		let patch = ContentPatch { company_id, circle_ids, meta: content.meta };

		match content.text.filter(|text| !text.trim().is_empty()) {
			Some(body) => {
				patch.apply(&mut payload);

				let texts = self.chunk_texts(payload.meta.title.as_deref(), Some(body.as_str()));
				let points = self.embed_chunks(&payload, texts).await?;
				let chunks = points.len();

				self.index.delete(&[content_id]).await?;
				self.index.upsert(points).await?;

				tracing::info!(content_id, chunks, "Content re-indexed.");
			},
			None => {
				self.index.set_payload(content_id, &patch).await?;

				tracing::info!(content_id, "Content metadata updated.");
			},
		}

		Ok(ContentMessage::new(format!("Updated content {content_id}.")))
	}

	/// Removes every chunk of `content_ids`.
	pub async fn delete_contents(&self, content_ids: &[u32]) -> Result<ContentMessage> {
		if content_ids.is_empty() {
			return Err(Error::InvalidRequest {
				message: "content_ids must be non-empty.".to_string(),
			});
		}

		let deleted = self.index.count(content_ids).await?;

		self.index.delete(content_ids).await?;

		tracing::info!(contents = content_ids.len(), deleted, "Contents deleted.");

		Ok(ContentMessage::new(format!("Deleted {deleted} entities.")))
	}

	/// Recreates the index and fills it from every text content in the store.
	///
	/// A content whose chunks fail to embed or store is logged and counted; the rebuild goes on.
	pub async fn rebuild(&self) -> Result<RebuildReport> {
		let page_size = self.cfg.indexing.rebuild_page_size;
		let mut report = RebuildReport::default();
		let mut offset = 0;

		self.index.recreate().await?;

		loop {
			let sources = self.contents.index_sources(offset, page_size).await?;
			let fetched = sources.len() as u64;

			for source in sources {
				let content_id = source.content_id;
				let texts = self.chunk_texts(source.meta.title.as_deref(), source.text.as_deref());

				if texts.is_empty() {
					report.skipped += 1;

					continue;
				}

				let company_id = source.company_id.unwrap_or_else(|| {
					tracing::warn!(content_id, "Content has no company; indexing under 0.");

					0
				});
				let base = ChunkPayload {
					content_id,
					company_id,
					circle_ids: source.circle_ids,
					text: String::new(),
					meta: source.meta,
				};

				match self.index_chunks(&base, texts).await {
					Ok(chunks) => {
						report.contents += 1;
						report.chunks += chunks;
					},
					Err(err) => {
						tracing::warn!(error = %err, content_id, "Failed to index content.");

						report.failed += 1;
					},
				}
			}

			if fetched < page_size {
				break;
			}

			offset += fetched;
		}

		tracing::info!(
			contents = report.contents,
			chunks = report.chunks,
			skipped = report.skipped,
			failed = report.failed,
			"Index rebuild completed."
		);

		Ok(report)
	}

	/// Plain-text windows of `text`, or the title alone when the text is blank.
	fn chunk_texts(&self, title: Option<&str>, body: Option<&str>) -> Vec<String> {
		let cfg = &self.cfg.indexing;
		let plain = body.map(text::plain_text).unwrap_or_default();

		if !plain.is_empty() {
			return text::split_windows(&plain, cfg.chunk_chars, cfg.overlap_chars);
		}

		title
			.map(str::trim)
			.filter(|title| !title.is_empty())
			.map(|title| vec![title.to_string()])
			.unwrap_or_default()
	}

	async fn embed_chunks(
		&self,
		base: &ChunkPayload,
		texts: Vec<String>,
	) -> Result<Vec<ChunkPoint>> {
		let handles: Vec<_> = texts
			.into_iter()
			.map(|text| {
				let handle = self.models.embedding.embed(text.as_str());

				(text, handle)
			})
			.collect();
		let mut points = Vec::with_capacity(handles.len());

		for (text, handle) in handles {
			let payload = ChunkPayload { text, ..base.clone() };

			points.push(ChunkPoint { vector: handle.await?, payload });
		}

		Ok(points)
	}

	async fn index_chunks(&self, base: &ChunkPayload, texts: Vec<String>) -> Result<u64> {
		let points = self.embed_chunks(base, texts).await?;
		let chunks = points.len() as u64;

		self.index.upsert(points).await?;

		Ok(chunks)
	}
}
