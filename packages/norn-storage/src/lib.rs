pub mod collections;
pub mod memory;
pub mod qdrant;

mod error;

pub use collections::{Axis, CollectionKind, CollectionSpec};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

use std::{future::Future, pin::Pin};

use serde_json::{Map, Value};

use norn_domain::SearchResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One record to write: free-form string id, embedding, payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PointRecord {
	pub id: String,
	pub vector: Vec<f32>,
	pub payload: Map<String, Value>,
}
impl PointRecord {
	pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: Map<String, Value>) -> Self {
		Self { id: id.into(), vector, payload }
	}
}

/// Exact-match payload conditions, all of which must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
	pub must: Vec<Condition>,
}
impl Filter {
	pub fn none() -> Self {
		Self::default()
	}

	pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
		Self { must: conditions.into_iter().collect() }
	}

	pub fn is_empty(&self) -> bool {
		self.must.is_empty()
	}

	pub fn matches(&self, payload: &Map<String, Value>) -> bool {
		self.must.iter().all(|condition| condition.matches(payload))
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
	Eq { field: String, value: String },
}
impl Condition {
	pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
		Self::Eq { field: field.into(), value: value.into() }
	}

	fn matches(&self, payload: &Map<String, Value>) -> bool {
		match self {
			Self::Eq { field, value } =>
				payload.get(field).and_then(Value::as_str) == Some(value.as_str()),
		}
	}
}

/// Storage backend surface the service is written against.
///
/// Object-safe by construction (boxed futures) so a service can hold
/// `Arc<dyn VectorStore>` and tests can swap in [`MemoryStore`].
pub trait VectorStore: Send + Sync {
	/// Creates the collection if it does not exist. Must be idempotent and
	/// tolerate concurrent creators racing on the same name.
	fn ensure_collection<'a>(&'a self, spec: &'a CollectionSpec) -> BoxFuture<'a, Result<()>>;

	fn collection_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn upsert<'a>(
		&'a self,
		collection: &'a str,
		points: Vec<PointRecord>,
	) -> BoxFuture<'a, Result<()>>;

	/// Nearest-neighbour search, best score first.
	fn search<'a>(
		&'a self,
		collection: &'a str,
		vector: Vec<f32>,
		limit: usize,
		filter: &'a Filter,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>>;

	/// Bulk read in stable insertion order, without scoring. Scores on the
	/// returned records are zero.
	fn scroll<'a>(
		&'a self,
		collection: &'a str,
		limit: usize,
		filter: &'a Filter,
		with_vectors: bool,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>>;

	/// Fetches specific points by id. Unknown ids are skipped.
	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		ids: &'a [String],
		with_vectors: bool,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>>;

	fn count<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> BoxFuture<'a, Result<u64>>;

	fn delete_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;
}
