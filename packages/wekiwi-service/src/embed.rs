use serde::{Deserialize, Serialize};

use crate::{Error, Result, WekiwiService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
	pub texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
	pub embeddings: Vec<Vec<f32>>,
}

impl WekiwiService {
	/// Embeds every text through the shared embedding coalescer.
	pub async fn embed(&self, req: EmbedRequest) -> Result<EmbedResponse> {
		if req.texts.is_empty() {
			return Err(Error::InvalidRequest { message: "texts must be non-empty.".to_string() });
		}

		let handles: Vec<_> =
			req.texts.into_iter().map(|text| self.models.embedding.embed(text)).collect();
		let mut embeddings = Vec::with_capacity(handles.len());

		for handle in handles {
			embeddings.push(handle.await?);
		}

		Ok(EmbedResponse { embeddings })
	}
}
