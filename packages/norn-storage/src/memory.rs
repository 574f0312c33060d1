//! In-process [`VectorStore`] used by tests and offline runs.
//!
//! Matches the behaviour the service relies on from the real backend:
//! cosine ordering, exact-match filters, stable scroll order, idempotent
//! collection creation. Clones share state.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use norn_domain::SearchResult;

use crate::{BoxFuture, CollectionSpec, Error, Filter, PointRecord, Result, VectorStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
	inner: Arc<RwLock<HashMap<String, StoredCollection>>>,
}

struct StoredCollection {
	dimensions: u32,
	points: Vec<PointRecord>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Collection names currently present, sorted. Test helper.
	pub async fn collection_names(&self) -> Vec<String> {
		let collections = self.inner.read().await;
		let mut names = collections.keys().cloned().collect::<Vec<_>>();

		names.sort();

		names
	}
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.;
	}

	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0. || norm_b == 0. {
		return 0.;
	}

	dot / (norm_a * norm_b)
}

fn to_result(point: &PointRecord, score: f32, with_vector: bool) -> SearchResult {
	SearchResult {
		id: point.id.clone(),
		score,
		payload: point.payload.clone(),
		vector: with_vector.then(|| point.vector.clone()),
	}
}

impl VectorStore for MemoryStore {
	fn ensure_collection<'a>(&'a self, spec: &'a CollectionSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut collections = self.inner.write().await;

			match collections.get(&spec.name) {
				Some(existing) if existing.dimensions != spec.dimensions => Err(Error::Backend {
					message: format!(
						"collection {} already exists with {} dimensions, requested {}.",
						spec.name, existing.dimensions, spec.dimensions
					),
				}),
				Some(_) => Ok(()),
				None => {
					collections.insert(spec.name.clone(), StoredCollection {
						dimensions: spec.dimensions,
						points: Vec::new(),
					});

					Ok(())
				},
			}
		})
	}

	fn collection_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(self.inner.read().await.contains_key(name)) })
	}

	fn upsert<'a>(
		&'a self,
		collection: &'a str,
		points: Vec<PointRecord>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut collections = self.inner.write().await;
			let stored = collections
				.get_mut(collection)
				.ok_or_else(|| Error::CollectionNotFound { name: collection.to_owned() })?;

			for point in points {
				if point.vector.len() != stored.dimensions as usize {
					return Err(Error::Backend {
						message: format!(
							"vector for point {} has {} dimensions, collection {} expects {}.",
							point.id,
							point.vector.len(),
							collection,
							stored.dimensions
						),
					});
				}

				match stored.points.iter_mut().find(|existing| existing.id == point.id) {
					Some(existing) => *existing = point,
					None => stored.points.push(point),
				}
			}

			Ok(())
		})
	}

	fn search<'a>(
		&'a self,
		collection: &'a str,
		vector: Vec<f32>,
		limit: usize,
		filter: &'a Filter,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async move {
			let collections = self.inner.read().await;
			let stored = collections
				.get(collection)
				.ok_or_else(|| Error::CollectionNotFound { name: collection.to_owned() })?;
			let mut scored = stored
				.points
				.iter()
				.filter(|point| filter.matches(&point.payload))
				.map(|point| to_result(point, cosine_similarity(&vector, &point.vector), false))
				.collect::<Vec<_>>();

			scored.sort_by(|a, b| {
				b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
			});
			scored.truncate(limit);

			Ok(scored)
		})
	}

	fn scroll<'a>(
		&'a self,
		collection: &'a str,
		limit: usize,
		filter: &'a Filter,
		with_vectors: bool,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async move {
			let collections = self.inner.read().await;
			let stored = collections
				.get(collection)
				.ok_or_else(|| Error::CollectionNotFound { name: collection.to_owned() })?;

			Ok(stored
				.points
				.iter()
				.filter(|point| filter.matches(&point.payload))
				.take(limit)
				.map(|point| to_result(point, 0., with_vectors))
				.collect())
		})
	}

	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		ids: &'a [String],
		with_vectors: bool,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async move {
			let collections = self.inner.read().await;
			let stored = collections
				.get(collection)
				.ok_or_else(|| Error::CollectionNotFound { name: collection.to_owned() })?;

			Ok(ids
				.iter()
				.filter_map(|id| stored.points.iter().find(|point| point.id == *id))
				.map(|point| to_result(point, 0., with_vectors))
				.collect())
		})
	}

	fn count<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let collections = self.inner.read().await;
			let stored = collections
				.get(collection)
				.ok_or_else(|| Error::CollectionNotFound { name: collection.to_owned() })?;

			Ok(stored.points.iter().filter(|point| filter.matches(&point.payload)).count() as u64)
		})
	}

	fn delete_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.inner.write().await.remove(name);

			Ok(())
		})
	}
}
