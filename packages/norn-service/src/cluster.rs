use std::collections::{BTreeMap, HashMap, VecDeque};

use serde_json::{Map, Value};

use norn_domain::{Error as DomainError, ghap};
use norn_storage::{Axis, Filter};

use crate::{NornService, ServiceError, ServiceResult};

/// One density cluster on an experience axis.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ClusterInfo {
	pub cluster_id: String,
	pub axis: String,
	pub label: i32,
	pub centroid: Vec<f32>,
	pub member_ids: Vec<String>,
	pub size: usize,
	pub avg_weight: f32,
}

/// A hydrated cluster member: the stored point plus its clustering weight.
#[derive(Clone, Debug)]
pub struct ClusterMember {
	pub id: String,
	pub vector: Vec<f32>,
	pub payload: Map<String, Value>,
	pub weight: f32,
}

impl NornService {
	pub async fn count_experiences(&self, axis: &str) -> ServiceResult<u64> {
		let axis = Axis::parse(axis)?;

		self.axis_count(axis).await
	}

	/// Clusters one axis. Below the minimum-experience gate this reports an
	/// empty list rather than an error.
	pub async fn cluster_axis(&self, axis: &str) -> ServiceResult<Vec<ClusterInfo>> {
		let axis = Axis::parse(axis)?;

		match self.axis_clusters(axis).await {
			Ok(clusters) => Ok(clusters),
			Err(ServiceError::Domain(DomainError::ClusterUnavailable { found, needed, .. })) => {
				tracing::info!(
					axis = axis.as_str(),
					found,
					needed,
					"Not enough experiences to cluster."
				);

				Ok(Vec::new())
			},
			Err(err) => Err(err),
		}
	}

	/// Clusters every axis, skipping the ones that fail.
	pub async fn cluster_all_axes(&self) -> ServiceResult<BTreeMap<String, Vec<ClusterInfo>>> {
		let mut clusters_by_axis = BTreeMap::new();

		for axis in Axis::ALL {
			match self.cluster_axis(axis.as_str()).await {
				Ok(clusters) => {
					clusters_by_axis.insert(axis.as_str().to_owned(), clusters);
				},
				Err(err) => {
					tracing::warn!(
						axis = axis.as_str(),
						error = %err,
						"Axis clustering failed; skipping."
					);
				},
			}
		}

		Ok(clusters_by_axis)
	}

	/// Finds a cluster by its `{axis}_{label}` id and loads its members
	/// with vectors. Members whose vector has gone missing are skipped.
	pub async fn get_cluster_members(&self, cluster_id: &str) -> ServiceResult<Vec<ClusterMember>> {
		let (axis, _) = parse_cluster_id(cluster_id)?;
		let cluster = self.find_cluster(axis, cluster_id).await?;

		self.hydrate_members(axis, &cluster).await
	}

	pub(crate) async fn find_cluster(
		&self,
		axis: Axis,
		cluster_id: &str,
	) -> ServiceResult<ClusterInfo> {
		let clusters = self.axis_clusters(axis).await?;

		clusters.into_iter().find(|cluster| cluster.cluster_id == cluster_id).ok_or_else(|| {
			ServiceError::InvalidRequest { message: format!("Cluster {cluster_id} was not found.") }
		})
	}

	pub(crate) async fn hydrate_members(
		&self,
		axis: Axis,
		cluster: &ClusterInfo,
	) -> ServiceResult<Vec<ClusterMember>> {
		let records = self.store.retrieve(axis.collection_name(), &cluster.member_ids, true).await?;

		Ok(records
			.into_iter()
			.filter_map(|record| {
				let vector = record.vector?;
				let weight = ghap::tier_weight(
					record.payload.get("confidence_tier").and_then(Value::as_str),
				);

				Some(ClusterMember { id: record.id, vector, payload: record.payload, weight })
			})
			.collect())
	}

	async fn axis_count(&self, axis: Axis) -> ServiceResult<u64> {
		match self.store.count(axis.collection_name(), &Filter::none()).await {
			Ok(count) => Ok(count),
			Err(norn_storage::Error::CollectionNotFound { .. }) => Ok(0),
			Err(err) => Err(err.into()),
		}
	}

	/// The full pipeline for one axis: gate, scroll, cluster, centroids.
	///
	/// Distances use L2-normalized copies so euclidean proximity matches
	/// cosine similarity; centroids average the original embeddings,
	/// weighted by each member's confidence tier.
	pub(crate) async fn axis_clusters(&self, axis: Axis) -> ServiceResult<Vec<ClusterInfo>> {
		let needed = u64::from(self.cfg.clustering.min_experiences);
		let found = self.axis_count(axis).await?;

		if found < needed {
			return Err(DomainError::ClusterUnavailable {
				axis: axis.as_str().to_owned(),
				found,
				needed,
			}
			.into());
		}

		let cap = self.cfg.clustering.scroll_limit as usize;
		let records = self.store.scroll(axis.collection_name(), cap, &Filter::none(), true).await?;

		if records.len() == cap {
			tracing::warn!(
				axis = axis.as_str(),
				cap,
				"Clustering scroll hit the cap; clustering a sample of the axis."
			);
		}

		let mut ids = Vec::new();
		let mut embeddings = Vec::new();
		let mut weights = Vec::new();

		for record in records {
			let Some(vector) = record.vector else {
				continue;
			};

			weights.push(ghap::tier_weight(
				record.payload.get("confidence_tier").and_then(Value::as_str),
			));
			ids.push(record.id);
			embeddings.push(vector);
		}

		if embeddings.is_empty() {
			return Err(ServiceError::Storage {
				message: format!("No embeddings found for axis {}.", axis.as_str()),
			});
		}

		let normalized =
			embeddings.iter().map(|embedding| l2_normalize(embedding)).collect::<Vec<_>>();
		let labels = density_cluster(
			&normalized,
			self.cfg.clustering.min_cluster_size as usize,
			self.cfg.clustering.min_samples as usize,
		);
		let cluster_count = labels.iter().copied().max().map_or(0, |label| label + 1);

		if cluster_count == 0 {
			tracing::warn!(axis = axis.as_str(), "Every point was labelled noise; no clusters.");

			return Ok(Vec::new());
		}

		let mut clusters = Vec::new();

		for label in 0..cluster_count {
			let members = labels
				.iter()
				.enumerate()
				.filter(|&(_, &candidate)| candidate == label)
				.map(|(index, _)| index)
				.collect::<Vec<_>>();
			let weight_sum = members.iter().map(|&index| weights[index]).sum::<f32>();

			if weight_sum <= 0. {
				return Err(ServiceError::InvalidRequest {
					message: format!("Cluster {label} has a zero weight sum."),
				});
			}

			clusters.push(ClusterInfo {
				cluster_id: format!("{}_{label}", axis.as_str()),
				axis: axis.as_str().to_owned(),
				label,
				centroid: weighted_centroid(&embeddings, &members, &weights, weight_sum),
				member_ids: members.iter().map(|&index| ids[index].clone()).collect(),
				size: members.len(),
				avg_weight: weight_sum / members.len() as f32,
			});
		}

		clusters.sort_by(|a, b| b.size.cmp(&a.size));

		Ok(clusters)
	}
}

pub(crate) fn parse_cluster_id(cluster_id: &str) -> ServiceResult<(Axis, i32)> {
	let invalid = || ServiceError::InvalidRequest {
		message: format!("Invalid cluster id format: {cluster_id}."),
	};
	let (axis_part, label_part) = cluster_id.rsplit_once('_').ok_or_else(invalid)?;
	let label = label_part.parse::<i32>().map_err(|_| invalid())?;
	let axis = Axis::parse(axis_part)?;

	Ok((axis, label))
}

pub(crate) fn l2_normalize(vector: &[f32]) -> Vec<f32> {
	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0. { vector.iter().map(|value| value / norm).collect() } else { vector.to_vec() }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Cosine distance in [0, 2]. Zero-magnitude inputs read as fully distant
/// rather than producing a NaN.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm_a = a.iter().map(|value| value * value).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm_a == 0. || norm_b == 0. {
		return 1.;
	}

	1. - dot / (norm_a * norm_b)
}

fn weighted_centroid(
	embeddings: &[Vec<f32>],
	members: &[usize],
	weights: &[f32],
	weight_sum: f32,
) -> Vec<f32> {
	let dimensions = members.first().map_or(0, |&index| embeddings[index].len());
	let mut centroid = vec![0_f32; dimensions];

	for &index in members {
		let weight = weights[index];

		for (slot, value) in centroid.iter_mut().zip(&embeddings[index]) {
			*slot += weight * value;
		}
	}
	for slot in &mut centroid {
		*slot /= weight_sum;
	}

	centroid
}

/// Density clustering with noise. DBSCAN over a self-tuned radius (the
/// median distance to each point's `min_samples`-th nearest neighbour),
/// then clusters under `min_cluster_size` drop back into noise (-1) and
/// surviving labels compact to 0..n in discovery order. Deterministic for
/// a given input order.
pub(crate) fn density_cluster(
	points: &[Vec<f32>],
	min_cluster_size: usize,
	min_samples: usize,
) -> Vec<i32> {
	let n = points.len();

	if n == 0 {
		return Vec::new();
	}
	if n <= min_samples {
		return vec![-1; n];
	}

	let eps = neighbourhood_radius(points, min_samples);
	let mut labels = vec![-1_i32; n];
	let mut visited = vec![false; n];
	let mut next_label = 0_i32;

	for seed in 0..n {
		if visited[seed] {
			continue;
		}

		visited[seed] = true;

		let neighbours = region_query(points, seed, eps);

		if neighbours.len() < min_samples {
			continue;
		}

		labels[seed] = next_label;

		let mut queue = VecDeque::from(neighbours);

		while let Some(point) = queue.pop_front() {
			// Noise reached from a core point joins as a border member.
			if labels[point] == -1 {
				labels[point] = next_label;
			}
			if visited[point] {
				continue;
			}

			visited[point] = true;

			let expansion = region_query(points, point, eps);

			if expansion.len() >= min_samples {
				queue.extend(expansion);
			}
		}

		next_label += 1;
	}

	compact_labels(labels, next_label, min_cluster_size)
}

fn neighbourhood_radius(points: &[Vec<f32>], min_samples: usize) -> f32 {
	let mut core_distances = Vec::with_capacity(points.len());
	let mut scratch = Vec::new();

	for (index, point) in points.iter().enumerate() {
		scratch.clear();

		for (other_index, other) in points.iter().enumerate() {
			if index != other_index {
				scratch.push(euclidean(point, other));
			}
		}

		let k = min_samples.clamp(1, scratch.len()) - 1;

		scratch.select_nth_unstable_by(k, |a, b| {
			a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
		});
		core_distances.push(scratch[k]);
	}

	let mid = core_distances.len() / 2;

	core_distances.select_nth_unstable_by(mid, |a, b| {
		a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
	});

	core_distances[mid]
}

/// Indices within `eps` of the center, the center included.
fn region_query(points: &[Vec<f32>], center: usize, eps: f32) -> Vec<usize> {
	points
		.iter()
		.enumerate()
		.filter(|(_, point)| euclidean(&points[center], point) <= eps)
		.map(|(index, _)| index)
		.collect()
}

fn compact_labels(mut labels: Vec<i32>, label_count: i32, min_cluster_size: usize) -> Vec<i32> {
	let mut sizes = HashMap::new();

	for &label in &labels {
		if label >= 0 {
			*sizes.entry(label).or_insert(0_usize) += 1;
		}
	}

	let mut remap = HashMap::new();
	let mut next = 0_i32;

	for label in 0..label_count {
		if sizes.get(&label).copied().unwrap_or(0) >= min_cluster_size {
			remap.insert(label, next);

			next += 1;
		}
	}
	for label in &mut labels {
		*label = remap.get(label).copied().unwrap_or(-1);
	}

	labels
}

#[cfg(test)]
mod tests {
	use super::*;

	fn clump(center: [f32; 3], count: usize) -> Vec<Vec<f32>> {
		(0..count)
			.map(|i| {
				let jitter = i as f32 * 0.001;

				vec![center[0] + jitter, center[1], center[2]]
			})
			.collect()
	}

	#[test]
	fn separated_clumps_form_clusters_and_outliers_stay_noise() {
		let mut points = clump([1., 0., 0.], 6);

		points.extend(clump([0., 1., 0.], 6));
		points.push(vec![0., 0., 1.]);
		points.push(vec![0., 0., -1.]);

		let labels = density_cluster(&points, 5, 3);

		assert!(labels[..6].iter().all(|&label| label == labels[0]));
		assert!(labels[6..12].iter().all(|&label| label == labels[6]));
		assert!(labels[0] >= 0);
		assert!(labels[6] >= 0);
		assert_ne!(labels[0], labels[6]);
		assert_eq!(&labels[12..], [-1, -1]);

		// Same input, same labels.
		assert_eq!(density_cluster(&points, 5, 3), labels);
	}

	#[test]
	fn small_clusters_are_pruned_to_noise() {
		let mut points = clump([1., 0., 0.], 6);

		points.extend(clump([0., 1., 0.], 3));

		let labels = density_cluster(&points, 5, 3);

		assert!(labels[..6].iter().all(|&label| label == 0));
		assert!(labels[6..].iter().all(|&label| label == -1));
	}

	#[test]
	fn weighted_centroid_leans_toward_heavier_members() {
		let embeddings = vec![vec![1., 0.], vec![0., 1.]];
		let weights = [1., 3.];
		let centroid = weighted_centroid(&embeddings, &[0, 1], &weights, 4.);

		assert!((centroid[0] - 0.25).abs() < 1e-6);
		assert!((centroid[1] - 0.75).abs() < 1e-6);
	}

	#[test]
	fn cosine_distance_is_finite_for_degenerate_input() {
		assert_eq!(cosine_distance(&[0., 0.], &[1., 0.]), 1.);
		assert!((cosine_distance(&[1., 0.], &[1., 0.])).abs() < 1e-6);
	}

	#[test]
	fn cluster_ids_parse_by_right_splitting() {
		let (axis, label) = parse_cluster_id("root_cause_3").unwrap();

		assert_eq!(axis, Axis::RootCause);
		assert_eq!(label, 3);
		assert!(parse_cluster_id("full_x").is_err());
		assert!(parse_cluster_id("nonsense_1").is_err());
		assert!(parse_cluster_id("full").is_err());
	}
}
