use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub store: Store,
	pub embedding: Embedding,
	pub search: Search,
	pub context: Context,
	pub clustering: Clustering,
	pub values: Values,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Store {
	pub url: String,
}
impl Default for Store {
	fn default() -> Self {
		Self { url: "http://127.0.0.1:6334".to_string() }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Embedding {
	pub semantic: EmbeddingProviderConfig,
	pub code: EmbeddingProviderConfig,
}
impl Default for Embedding {
	fn default() -> Self {
		Self {
			semantic: EmbeddingProviderConfig {
				provider_id: "local".to_string(),
				api_base: "http://127.0.0.1:8080".to_string(),
				api_key: None,
				path: "/v1/embeddings".to_string(),
				model: "nomic-embed-text-v1.5".to_string(),
				dimensions: 768,
				timeout_ms: 30_000,
				default_headers: Map::new(),
			},
			code: EmbeddingProviderConfig {
				provider_id: "local".to_string(),
				api_base: "http://127.0.0.1:8080".to_string(),
				api_key: None,
				path: "/v1/embeddings".to_string(),
				model: "all-minilm-l6-v2".to_string(),
				dimensions: 384,
				timeout_ms: 30_000,
				default_headers: Map::new(),
			},
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: Option<String>,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}
impl Default for EmbeddingProviderConfig {
	fn default() -> Self {
		Embedding::default().semantic
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Records scanned per collection when keyword scoring runs.
	pub keyword_scroll_limit: u32,
	/// Score boost for hits present in both semantic and keyword results.
	pub hybrid_boost: f32,
	pub default_limit: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self { keyword_scroll_limit: 1000, hybrid_boost: 0.15, default_limit: 20 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Context {
	pub default_limit: u32,
	pub default_max_tokens: u32,
	/// Values are fetched with this fixed limit regardless of the per-type
	/// limit; a handful of principles suffices.
	pub values_limit: u32,
	/// Per-source search timeout during assembly fan-out.
	pub source_timeout_ms: u64,
	pub premortem_limit: u32,
	pub premortem_max_tokens: u32,
}
impl Default for Context {
	fn default() -> Self {
		Self {
			default_limit: 20,
			default_max_tokens: 2000,
			values_limit: 5,
			source_timeout_ms: 10_000,
			premortem_limit: 10,
			premortem_max_tokens: 1500,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Clustering {
	pub min_cluster_size: u32,
	pub min_samples: u32,
	/// Minimum experiences on an axis before clustering runs at all.
	pub min_experiences: u32,
	pub scroll_limit: u32,
}
impl Default for Clustering {
	fn default() -> Self {
		Self { min_cluster_size: 5, min_samples: 3, min_experiences: 20, scroll_limit: 10_000 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Values {
	pub min_members: u32,
	pub min_similarity: f32,
	pub scroll_limit: u32,
}
impl Default for Values {
	fn default() -> Self {
		Self { min_members: 5, min_similarity: 0.5, scroll_limit: 1000 }
	}
}
