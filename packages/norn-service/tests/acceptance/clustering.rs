use norn_domain::Error as DomainError;
use norn_service::ServiceError;
use norn_storage::{Axis, CollectionKind, PointRecord};

use super::{
	CLUSTER_GOAL_A, SEMANTIC_DIM, embedding, experience_payload, seed, seed_clustered_experiences,
	service,
};

#[tokio::test]
async fn sparse_axes_report_no_clusters() {
	let (service, store) = service();
	let goals = ["first unique goal", "second unique goal", "third unique goal"];
	let points = goals
		.iter()
		.enumerate()
		.map(|(index, goal)| {
			let id = format!("exp_{index}");

			PointRecord::new(
				id.clone(),
				embedding(goal),
				experience_payload(&id, "full", goal, "debugging", "confirmed", "gold"),
			)
		})
		.collect();

	seed(&store, CollectionKind::Experiences(Axis::Full), points).await;

	assert_eq!(service.count_experiences("full").await.expect("Count failed."), 3);
	assert_eq!(service.count_experiences("surprise").await.expect("Count failed."), 0);
	assert!(service.cluster_axis("full").await.expect("Clustering failed.").is_empty());

	let err = service.cluster_axis("sideways").await.expect_err("A bogus axis must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::UnknownVariant { .. })));
}

#[tokio::test]
async fn dense_goal_groups_form_weighted_clusters() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;

	let clusters = service.cluster_axis("full").await.expect("Clustering failed.");

	assert_eq!(clusters.len(), 2);

	let first = &clusters[0];

	assert_eq!(first.cluster_id, "full_0");
	assert_eq!(first.axis, "full");
	assert_eq!(first.size, 12);
	assert_eq!(first.member_ids.len(), 12);
	assert!(first.member_ids.contains(&"exp_a0".to_owned()));
	assert!((first.avg_weight - 1.0).abs() < 1e-6);

	// Identical member texts make the centroid the shared embedding.
	let goal_vector = embedding(CLUSTER_GOAL_A);

	assert_eq!(first.centroid.len(), SEMANTIC_DIM as usize);
	for (got, want) in first.centroid.iter().zip(&goal_vector) {
		assert!((got - want).abs() < 1e-5);
	}

	let second = &clusters[1];

	assert_eq!(second.cluster_id, "full_1");
	assert_eq!(second.size, 10);
	// Five gold and five bronze members average out.
	assert!((second.avg_weight - 0.75).abs() < 1e-6);

	// The stray goal stays out of every cluster.
	assert_eq!(clusters.iter().map(|cluster| cluster.size).sum::<usize>(), 22);
	assert!(clusters.iter().all(|cluster| !cluster.member_ids.contains(&"exp_stray".to_owned())));
}

#[tokio::test]
async fn cluster_members_hydrate_vectors_and_weights() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;

	let members = service.get_cluster_members("full_1").await.expect("Hydration failed.");

	assert_eq!(members.len(), 10);
	assert_eq!(members.iter().filter(|member| (member.weight - 1.0).abs() < 1e-6).count(), 5);
	assert_eq!(members.iter().filter(|member| (member.weight - 0.5).abs() < 1e-6).count(), 5);
	assert!(members.iter().all(|member| member.vector.len() == SEMANTIC_DIM as usize));
	assert!(members.iter().all(|member| member.id.starts_with("exp_b")));

	let err = service.get_cluster_members("full_9").await.expect_err("A missing label must fail.");

	assert!(matches!(err, ServiceError::InvalidRequest { .. }));
	assert!(err.to_string().contains("full_9 was not found"));

	let err = service.get_cluster_members("junk").await.expect_err("A malformed id must fail.");

	assert!(err.to_string().contains("Invalid cluster id format"));

	let err = service
		.get_cluster_members("surprise_0")
		.await
		.expect_err("A sparse axis has no members to serve.");

	assert!(matches!(err, ServiceError::Domain(DomainError::ClusterUnavailable { .. })));
}

#[tokio::test]
async fn cluster_all_axes_reports_every_axis() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;

	let by_axis = service.cluster_all_axes().await.expect("Clustering failed.");

	assert_eq!(by_axis.len(), 4);
	assert_eq!(by_axis["full"].len(), 2);
	assert!(by_axis["strategy"].is_empty());
	assert!(by_axis["surprise"].is_empty());
	assert!(by_axis["root_cause"].is_empty());
}
