use norn_domain::Error as DomainError;
use norn_service::{AckStatus, ServiceError, StoreValueRequest, ValueSearchRequest};

use super::{CLUSTER_GOAL_A, seed_clustered_experiences, service};

fn store_request(text: &str, cluster_id: &str) -> StoreValueRequest {
	StoreValueRequest { text: text.to_owned(), cluster_id: cluster_id.to_owned() }
}

#[tokio::test]
async fn validation_reports_finite_metrics_on_every_path() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;

	let missing =
		service.validate_value("anything at all", "full_9").await.expect("Validation failed.");

	assert!(!missing.valid);
	assert_eq!(missing.similarity, 0.);
	assert!(missing.reason.as_deref().unwrap_or_default().contains("full_9 was not found"));

	let gated =
		service.validate_value("anything at all", "surprise_0").await.expect("Validation failed.");

	assert!(!gated.valid);
	assert!(gated.reason.as_deref().unwrap_or_default().contains("not enough experiences"));

	let malformed =
		service.validate_value("anything at all", "junk").await.expect("Validation failed.");

	assert!(!malformed.valid);
	assert!(
		malformed.reason.as_deref().unwrap_or_default().contains("Invalid cluster id format")
	);

	let matching =
		service.validate_value(CLUSTER_GOAL_A, "full_0").await.expect("Validation failed.");

	assert!(matching.valid);
	assert!(matching.reason.is_none());
	assert!(matching.similarity > 0.999);
	assert!(matching.candidate_distance.abs() < 1e-5);

	let unrelated = service
		.validate_value("bake sourdough loaves on sunday mornings", "full_0")
		.await
		.expect("Validation failed.");

	assert!(!unrelated.valid);
	assert!(unrelated.similarity < 0.5);
	assert!(
		unrelated.reason.as_deref().unwrap_or_default().contains("exceeds the cluster threshold")
	);

	for outcome in [&missing, &gated, &malformed, &matching, &unrelated] {
		assert!(outcome.similarity.is_finite());
		assert!(outcome.candidate_distance.is_finite());
		assert!(outcome.mean_distance.is_finite());
		assert!(outcome.std_distance.is_finite());
		assert!(outcome.threshold.is_finite());
	}
}

#[tokio::test]
async fn store_value_gates_on_validation() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;

	let err = service
		.store_value(store_request("bake sourdough loaves on sunday mornings", "full_0"))
		.await
		.expect_err("An off-cluster value must be rejected.");

	assert!(matches!(err, ServiceError::InvalidRequest { .. }));
	assert!(err.to_string().contains("Value failed validation"));
	assert!(service.list_values(None).await.expect("List failed.").is_empty());

	let ack = service
		.store_value(store_request(CLUSTER_GOAL_A, "full_0"))
		.await
		.expect("A value matching its cluster must store.");

	assert_eq!(ack.status, AckStatus::Stored);
	assert!(ack.id.starts_with("value_full_0_"));

	let values = service.list_values(None).await.expect("List failed.");

	assert_eq!(values.len(), 1);
	assert_eq!(values[0].id, ack.id);
	assert_eq!(values[0].axis, "full");
	assert_eq!(values[0].cluster_id, "full_0");
	assert_eq!(values[0].text, CLUSTER_GOAL_A);
	assert_eq!(values[0].member_count, 12);
	assert!((values[0].avg_confidence - 1.0).abs() < 1e-6);

	// The stored value is searchable like any other collection.
	let hits = service
		.search_values(ValueSearchRequest {
			query: CLUSTER_GOAL_A.to_owned(),
			axis: None,
			limit: None,
			mode: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(hits.len(), 1);
	assert!(hits[0].score > 0.999);
}

#[tokio::test]
async fn list_values_narrows_by_axis() {
	let (service, store) = service();

	seed_clustered_experiences(&store).await;
	service
		.store_value(store_request(CLUSTER_GOAL_A, "full_0"))
		.await
		.expect("Store failed.");

	assert_eq!(service.list_values(Some("full")).await.expect("List failed.").len(), 1);
	assert!(service.list_values(Some("strategy")).await.expect("List failed.").is_empty());

	let err = service.list_values(Some("bogus")).await.expect_err("A bogus axis must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::UnknownVariant { .. })));
}
