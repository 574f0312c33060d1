use serde_json::{Map, json};
use time::OffsetDateTime;
use uuid::Uuid;

use norn_domain::{ValueResult, timestamp};
use norn_storage::{Axis, CollectionKind, Condition, Filter, PointRecord};

use crate::{
	NornService, ServiceError, ServiceResult,
	cluster::{self, ClusterInfo},
	observe::{Ack, AckStatus},
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoreValueRequest {
	pub text: String,
	pub cluster_id: String,
}

/// The verdict on a candidate value statement. Every numeric field is a
/// finite number on every path, including lookups that never reached a
/// cluster.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ValidationOutcome {
	pub valid: bool,
	pub similarity: f32,
	pub reason: Option<String>,
	pub candidate_distance: f32,
	pub mean_distance: f32,
	pub std_distance: f32,
	pub threshold: f32,
}

impl ValidationOutcome {
	fn rejected(reason: String) -> Self {
		Self {
			valid: false,
			similarity: 0.,
			reason: Some(reason),
			candidate_distance: 0.,
			mean_distance: 0.,
			std_distance: 0.,
			threshold: 0.,
		}
	}
}

/// A candidate that made it through the full geometry check, whatever the
/// verdict was.
struct Validated {
	cluster: ClusterInfo,
	candidate: Vec<f32>,
}

impl NornService {
	/// Validates a candidate value statement against a cluster. Lookup
	/// problems (unknown cluster, malformed id, gated axis) degrade to an
	/// invalid outcome with a reason; storage and embedding failures
	/// propagate as errors.
	pub async fn validate_value(
		&self,
		text: &str,
		cluster_id: &str,
	) -> ServiceResult<ValidationOutcome> {
		Ok(self.validate_against_cluster(text, cluster_id).await?.0)
	}

	/// Stores a value statement after it passes validation against its
	/// source cluster.
	pub async fn store_value(&self, req: StoreValueRequest) -> ServiceResult<Ack> {
		let (outcome, validated) = self.validate_against_cluster(&req.text, &req.cluster_id).await?;
		let Some(Validated { cluster, candidate }) = validated.filter(|_| outcome.valid) else {
			return Err(ServiceError::InvalidRequest {
				message: format!(
					"Value failed validation: {}",
					outcome.reason.as_deref().unwrap_or("similarity below threshold")
				),
			});
		};

		self.ensure_ready(CollectionKind::Values).await?;

		let suffix = Uuid::new_v4().simple().to_string();
		let value_id = format!("value_{}_{}", cluster.cluster_id, &suffix[..8]);
		let mut payload = Map::new();

		payload.insert("text".into(), req.text.clone().into());
		payload.insert("cluster_id".into(), cluster.cluster_id.clone().into());
		payload.insert("axis".into(), cluster.axis.clone().into());
		payload.insert("member_count".into(), (cluster.size as u64).into());
		payload.insert("avg_confidence".into(), f64::from(cluster.avg_weight).into());
		payload.insert("cluster_label".into(), cluster.label.into());
		payload.insert("cluster_size".into(), (cluster.size as u64).into());
		payload
			.insert("created_at".into(), timestamp::to_rfc3339(OffsetDateTime::now_utc()).into());
		payload.insert(
			"validation".into(),
			json!({
				"candidate_distance": outcome.candidate_distance,
				"mean_distance": outcome.mean_distance,
				"std_distance": outcome.std_distance,
				"threshold": outcome.threshold,
				"similarity": outcome.similarity,
			}),
		);

		self.store
			.upsert(
				CollectionKind::Values.collection_name(),
				vec![PointRecord::new(value_id.clone(), candidate, payload)],
			)
			.await?;

		tracing::info!(
			id = %value_id,
			cluster_id = %cluster.cluster_id,
			similarity = outcome.similarity,
			"Stored validated value."
		);

		Ok(Ack { id: value_id, status: AckStatus::Stored })
	}

	/// Stored values, newest first, optionally narrowed to one axis.
	pub async fn list_values(&self, axis: Option<&str>) -> ServiceResult<Vec<ValueResult>> {
		self.ensure_ready(CollectionKind::Values).await?;

		let filter = match axis {
			Some(axis) => Filter::all(Some(Condition::eq("axis", Axis::parse(axis)?.as_str()))),
			None => Filter::none(),
		};
		let cap = self.cfg.values.scroll_limit as usize;
		let records =
			self.store.scroll(CollectionKind::Values.collection_name(), cap, &filter, false).await?;
		let mut values =
			records.iter().map(ValueResult::from_raw).collect::<Result<Vec<_>, _>>()?;

		values.sort_by(|a, b| b.created_at.cmp(&a.created_at));

		Ok(values)
	}

	async fn validate_against_cluster(
		&self,
		text: &str,
		cluster_id: &str,
	) -> ServiceResult<(ValidationOutcome, Option<Validated>)> {
		let (axis, cluster) = match self.lookup_cluster(cluster_id).await {
			Ok(found) => found,
			Err(err @ (ServiceError::Storage { .. } | ServiceError::Embedding { .. })) =>
				return Err(err),
			Err(err) => return Ok((ValidationOutcome::rejected(err.to_string()), None)),
		};
		let members = self.hydrate_members(axis, &cluster).await?;

		if members.is_empty() {
			return Ok((
				ValidationOutcome::rejected(format!("Cluster {cluster_id} has no members.")),
				None,
			));
		}

		let candidate = self.embed_one(&self.cfg.embedding.semantic, text).await?;
		let candidate_distance = cluster::cosine_distance(&candidate, &cluster.centroid);
		let distances = members
			.iter()
			.map(|member| cluster::cosine_distance(&member.vector, &cluster.centroid))
			.collect::<Vec<_>>();
		let (mean_distance, std_distance) = distance_stats(&distances);
		let threshold = mean_distance + 0.5 * std_distance;
		let similarity = 1. - candidate_distance;
		let min_members = self.cfg.values.min_members as usize;
		let min_similarity = self.cfg.values.min_similarity;
		let reason = if members.len() < min_members {
			Some(format!(
				"Cluster has {} members; at least {min_members} are required.",
				members.len()
			))
		} else if candidate_distance > threshold {
			Some(format!(
				"Candidate distance {candidate_distance:.3} exceeds the cluster threshold {threshold:.3}."
			))
		} else if similarity < min_similarity {
			Some(format!("Similarity {similarity:.3} is below the minimum {min_similarity:.3}."))
		} else {
			None
		};
		let outcome = ValidationOutcome {
			valid: reason.is_none(),
			similarity,
			reason,
			candidate_distance,
			mean_distance,
			std_distance,
			threshold,
		};

		Ok((outcome, Some(Validated { cluster, candidate })))
	}

	async fn lookup_cluster(&self, cluster_id: &str) -> ServiceResult<(Axis, ClusterInfo)> {
		let (axis, _) = cluster::parse_cluster_id(cluster_id)?;
		let cluster = self.find_cluster(axis, cluster_id).await?;

		Ok((axis, cluster))
	}
}

// Accumulates in f64 so a cluster of identical members gets an exact mean
// and a zero deviation instead of ulp noise.
fn distance_stats(distances: &[f32]) -> (f32, f32) {
	let count = distances.len().max(1) as f64;
	let mean = distances.iter().map(|&d| f64::from(d)).sum::<f64>() / count;
	let variance = distances
		.iter()
		.map(|&d| (f64::from(d) - mean) * (f64::from(d) - mean))
		.sum::<f64>()
		/ count;

	(mean as f32, variance.sqrt() as f32)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn distance_stats_match_hand_computation() {
		let (mean, std) = distance_stats(&[0.1, 0.2, 0.3]);

		assert!((mean - 0.2).abs() < 1e-6);
		assert!((std - 0.081_649_66).abs() < 1e-6);

		let (mean, std) = distance_stats(&[]);

		assert_eq!((mean, std), (0., 0.));
	}

	#[test]
	fn identical_distances_yield_an_exact_mean_and_zero_spread() {
		let sample = 1.192_092_9e-7_f32;
		let (mean, std) = distance_stats(&[sample; 12]);

		assert_eq!(mean, sample);
		assert_eq!(std, 0.);
	}

	#[test]
	fn rejections_keep_every_metric_finite() {
		let outcome = ValidationOutcome::rejected("cluster missing".into());

		assert!(!outcome.valid);
		assert_eq!(outcome.similarity, 0.);
		assert!(outcome.threshold.is_finite());
		assert!(outcome.candidate_distance.is_finite());
	}
}
