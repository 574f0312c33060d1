//! Qdrant-backed [`VectorStore`].
//!
//! Qdrant only accepts UUID or integer point ids, so free-form ids (entry
//! ids, file paths, commit shas) are mapped to a deterministic UUIDv5 and
//! the original id travels in the payload under [`ORIGINAL_ID_KEY`]. The
//! read side restores it and strips the marker before handing results up.

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition as QdrantCondition, CountPointsBuilder, CreateCollectionBuilder, Distance,
		Filter as QdrantFilter, GetPointsBuilder, PointId, PointStruct, Query, QueryPointsBuilder,
		RetrievedPoint, ScoredPoint, ScrollPointsBuilder, UpsertPointsBuilder,
		Value as QdrantValue, VectorParamsBuilder, VectorsOutput, point_id::PointIdOptions,
		value::Kind, vectors_output::VectorsOptions,
	},
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
	BoxFuture, CollectionSpec, Condition, Error, Filter, PointRecord, Result, VectorStore,
};
use norn_domain::SearchResult;

pub const ORIGINAL_ID_KEY: &str = "_id";

pub struct QdrantStore {
	pub client: Qdrant,
}

impl QdrantStore {
	pub fn new(cfg: &norn_config::Store) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url)
			.build()
			.map_err(|err| Error::Backend { message: err.to_string() })?;

		Ok(Self { client })
	}

	/// Maps a request failure to [`Error::CollectionNotFound`] when the
	/// collection is missing, otherwise wraps it as a backend error.
	async fn classify_failure(&self, collection: &str, err: qdrant_client::QdrantError) -> Error {
		match self.client.collection_exists(collection).await {
			Ok(false) => Error::CollectionNotFound { name: collection.to_owned() },
			_ => Error::Backend { message: err.to_string() },
		}
	}
}

pub fn point_uuid(id: &str) -> String {
	match Uuid::parse_str(id) {
		Ok(parsed) => parsed.to_string(),
		Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string(),
	}
}

fn to_point(record: PointRecord) -> PointStruct {
	let mut payload = Payload::new();

	for (key, value) in record.payload {
		payload.insert(key, value);
	}

	payload.insert(ORIGINAL_ID_KEY, record.id.clone());

	PointStruct::new(point_uuid(&record.id), record.vector, payload)
}

fn to_qdrant_filter(filter: &Filter) -> Option<QdrantFilter> {
	if filter.is_empty() {
		return None;
	}

	Some(QdrantFilter::all(filter.must.iter().map(|condition| {
		let Condition::Eq { field, value } = condition;

		QdrantCondition::matches(field.clone(), value.clone())
	})))
}

fn json_value(value: QdrantValue) -> Value {
	match value.kind {
		None | Some(Kind::NullValue(_)) => Value::Null,
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::IntegerValue(number)) => Value::from(number),
		Some(Kind::DoubleValue(number)) =>
			serde_json::Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(json_value).collect()),
		Some(Kind::StructValue(nested)) => Value::Object(
			nested.fields.into_iter().map(|(key, value)| (key, json_value(value))).collect(),
		),
	}
}

fn json_payload(
	payload: std::collections::HashMap<String, QdrantValue>,
) -> Map<String, Value> {
	payload.into_iter().map(|(key, value)| (key, json_value(value))).collect()
}

fn restore_id(point_id: Option<&PointId>, payload: &mut Map<String, Value>) -> Option<String> {
	if let Some(Value::String(original)) = payload.remove(ORIGINAL_ID_KEY) {
		return Some(original);
	}

	match point_id?.point_id_options.as_ref()? {
		PointIdOptions::Uuid(id) => Some(id.clone()),
		PointIdOptions::Num(number) => Some(number.to_string()),
	}
}

fn vector_data(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
	match vectors?.vectors_options? {
		VectorsOptions::Vector(vector) => Some(vector.data),
		VectorsOptions::Vectors(_) => None,
	}
}

fn from_scored(point: ScoredPoint) -> Option<SearchResult> {
	let mut payload = json_payload(point.payload);
	let id = restore_id(point.id.as_ref(), &mut payload)?;

	Some(SearchResult { id, score: point.score, payload, vector: vector_data(point.vectors) })
}

fn from_retrieved(point: RetrievedPoint) -> Option<SearchResult> {
	let mut payload = json_payload(point.payload);
	let id = restore_id(point.id.as_ref(), &mut payload)?;

	Some(SearchResult { id, score: 0., payload, vector: vector_data(point.vectors) })
}

impl VectorStore for QdrantStore {
	fn ensure_collection<'a>(&'a self, spec: &'a CollectionSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let exists = self
				.client
				.collection_exists(spec.name.clone())
				.await
				.map_err(|err| Error::Backend { message: err.to_string() })?;

			if exists {
				return Ok(());
			}

			let builder = CreateCollectionBuilder::new(spec.name.clone())
				.vectors_config(VectorParamsBuilder::new(spec.dimensions.into(), Distance::Cosine));

			match self.client.create_collection(builder).await {
				Ok(_) => Ok(()),
				// A concurrent caller may have created it between the two calls.
				Err(err) =>
					if matches!(self.client.collection_exists(spec.name.clone()).await, Ok(true)) {
						Ok(())
					} else {
						Err(Error::Backend { message: err.to_string() })
					},
			}
		})
	}

	fn collection_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.client
				.collection_exists(name)
				.await
				.map_err(|err| Error::Backend { message: err.to_string() })
		})
	}

	fn upsert<'a>(
		&'a self,
		collection: &'a str,
		points: Vec<PointRecord>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let points = points.into_iter().map(to_point).collect::<Vec<_>>();
			let request = UpsertPointsBuilder::new(collection.to_owned(), points).wait(true);

			match self.client.upsert_points(request).await {
				Ok(_) => Ok(()),
				Err(err) => Err(self.classify_failure(collection, err).await),
			}
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
			let mut request = QueryPointsBuilder::new(collection.to_owned())
				.query(Query::new_nearest(vector))
				.limit(limit as u64)
				.with_payload(true);

			if let Some(filter) = to_qdrant_filter(filter) {
				request = request.filter(filter);
			}

			match self.client.query(request).await {
				Ok(response) =>
					Ok(response.result.into_iter().filter_map(from_scored).collect()),
				Err(err) => Err(self.classify_failure(collection, err).await),
			}
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
			let mut request = ScrollPointsBuilder::new(collection.to_owned())
				.limit(limit as u32)
				.with_payload(true)
				.with_vectors(with_vectors);

			if let Some(filter) = to_qdrant_filter(filter) {
				request = request.filter(filter);
			}

			match self.client.scroll(request).await {
				Ok(response) =>
					Ok(response.result.into_iter().filter_map(from_retrieved).collect()),
				Err(err) => Err(self.classify_failure(collection, err).await),
			}
		})
	}

	fn retrieve<'a>(
		&'a self,
		collection: &'a str,
		ids: &'a [String],
		with_vectors: bool,
	) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
		Box::pin(async move {
			let point_ids =
				ids.iter().map(|id| PointId::from(point_uuid(id))).collect::<Vec<_>>();
			let request = GetPointsBuilder::new(collection.to_owned(), point_ids)
				.with_payload(true)
				.with_vectors(with_vectors);

			match self.client.get_points(request).await {
				Ok(response) =>
					Ok(response.result.into_iter().filter_map(from_retrieved).collect()),
				Err(err) => Err(self.classify_failure(collection, err).await),
			}
		})
	}

	fn count<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut request = CountPointsBuilder::new(collection.to_owned()).exact(true);

			if let Some(filter) = to_qdrant_filter(filter) {
				request = request.filter(filter);
			}

			match self.client.count(request).await {
				Ok(response) => Ok(response.result.map(|result| result.count).unwrap_or(0)),
				Err(err) => Err(self.classify_failure(collection, err).await),
			}
		})
	}

	fn delete_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match self.client.delete_collection(name.to_owned()).await {
				Ok(_) => Ok(()),
				Err(err) =>
					if matches!(self.client.collection_exists(name).await, Ok(false)) {
						Ok(())
					} else {
						Err(Error::Backend { message: err.to_string() })
					},
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn point_uuid_passes_uuids_through_and_derives_the_rest() {
		let uuid = "8b2a1ad4-6f5c-4a8e-9c33-2f6b0c2f7d1e";

		assert_eq!(point_uuid(uuid), uuid);

		let derived = point_uuid("ghap_20250115_093000_a1b2c3");

		assert!(Uuid::parse_str(&derived).is_ok());
		assert_eq!(derived, point_uuid("ghap_20250115_093000_a1b2c3"));
		assert_ne!(derived, point_uuid("ghap_20250115_093000_a1b2c4"));
	}

	#[test]
	fn payload_round_trips_through_qdrant_values() {
		let Some(payload) = json!({
			"content": "prefers tabs",
			"importance": 0.8,
			"iteration_count": 3,
			"tags": ["style", "rust"],
			"lesson": { "what_worked": "retry", "takeaway": "backoff" },
			"confidence_tier": null,
			"auto_captured": true,
		})
		.as_object()
		.cloned() else {
			unreachable!()
		};
		let record = PointRecord::new("mem_1", vec![0.1, 0.2], payload.clone());
		let point = to_point(record);
		let mut restored = json_payload(point.payload);

		assert_eq!(restored.remove(ORIGINAL_ID_KEY), Some(Value::String("mem_1".into())));
		assert_eq!(Value::Object(restored), Value::Object(payload));
	}

	#[test]
	fn restore_id_prefers_the_payload_marker() {
		let mut payload = Map::new();

		payload.insert(ORIGINAL_ID_KEY.to_owned(), Value::String("commit_abc".into()));

		let native = PointId::from(point_uuid("commit_abc"));

		assert_eq!(restore_id(Some(&native), &mut payload), Some("commit_abc".to_owned()));
		assert!(!payload.contains_key(ORIGINAL_ID_KEY));
		assert_eq!(restore_id(Some(&PointId::from(7_u64)), &mut Map::new()), Some("7".to_owned()));
	}

	#[test]
	fn empty_filters_are_omitted_from_requests() {
		assert!(to_qdrant_filter(&Filter::none()).is_none());

		let filter = Filter::all([Condition::eq("domain", "debugging")]);

		assert!(to_qdrant_filter(&filter).is_some());
	}
}
