use std::sync::{Arc, atomic::Ordering};

use norn_domain::{Error as DomainError, Lesson, RootCause};
use norn_service::{
	AbandonObservationRequest, AckStatus, ResolveObservationRequest, ServiceError,
	StartObservationRequest, UpdateObservationRequest,
};
use norn_storage::{Filter, MemoryStore, VectorStore};

use super::{FailingStore, service, service_on, spy_service};

fn start_request() -> StartObservationRequest {
	StartObservationRequest {
		domain: "debugging".to_owned(),
		strategy: "read-the-error".to_owned(),
		goal: "stop the nightly batch from timing out".to_owned(),
		hypothesis: "the connection pool is too small".to_owned(),
		action: "double the pool size in staging".to_owned(),
		prediction: "timeouts disappear overnight".to_owned(),
	}
}

fn confirm_request() -> ResolveObservationRequest {
	ResolveObservationRequest {
		outcome: "confirmed".to_owned(),
		result: "raising the floor removed the timeouts".to_owned(),
		surprise: None,
		root_cause: None,
		lesson: None,
		auto_captured: None,
	}
}

#[tokio::test]
async fn lifecycle_iterates_then_persists_two_axes_on_confirmation() {
	let (service, store, calls) = spy_service();
	let started = service.start_observation(start_request()).await.expect("Start failed.");

	assert_eq!(started.status, AckStatus::Started);
	assert!(started.id.starts_with("ghap_"));

	let err = service
		.start_observation(start_request())
		.await
		.expect_err("A second start must fail while one is active.");

	assert!(matches!(err, ServiceError::Domain(DomainError::ObservationActive { .. })));
	assert!(err.to_string().contains(&started.id));

	let revised = UpdateObservationRequest {
		hypothesis: Some("the pool is drained by the cron burst".to_owned()),
		..Default::default()
	};
	let updated = service.update_observation(revised.clone()).await.expect("Update failed.");

	assert_eq!(updated.status, AckStatus::Updated);
	assert_eq!(updated.id, started.id);

	let active = service.active_observation().await.expect("An entry must be active.");

	assert_eq!(active.iteration_count, 2);

	// Re-submitting the same hypothesis is not a new iteration.
	service.update_observation(revised).await.expect("Update failed.");

	let active = service.active_observation().await.expect("An entry must be active.");

	assert_eq!(active.iteration_count, 2);
	assert_eq!(calls.load(Ordering::SeqCst), 0, "Start and update must not embed.");

	let resolved = service
		.resolve_observation(ResolveObservationRequest {
			lesson: Some(Lesson {
				what_worked: "watching the pool gauge".to_owned(),
				takeaway: "alert on pool saturation".to_owned(),
			}),
			..confirm_request()
		})
		.await
		.expect("Resolve failed.");

	assert_eq!(resolved.status, AckStatus::Resolved);
	assert_eq!(resolved.id, started.id);
	// Every axis projection goes out in one embedding batch.
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(service.active_observation().await.is_none());
	assert_eq!(store.collection_names().await, ["ghap_full", "ghap_strategy"]);

	let records =
		store.scroll("ghap_full", 10, &Filter::none(), false).await.expect("Scroll failed.");

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].id, started.id);

	let payload = &records[0].payload;

	assert_eq!(payload["outcome_status"], "confirmed");
	assert_eq!(payload["confidence_tier"], "silver");
	assert_eq!(payload["iteration_count"], 2);
	assert_eq!(payload["axis"], "full");
	assert_eq!(payload["lesson"]["what_worked"], "watching the pool gauge");

	let strategy =
		store.scroll("ghap_strategy", 10, &Filter::none(), false).await.expect("Scroll failed.");

	assert_eq!(strategy[0].payload["axis"], "strategy");
}

#[tokio::test]
async fn falsified_without_surprise_skips_the_surprise_axis() {
	let (service, store) = service();

	service.start_observation(start_request()).await.expect("Start failed.");
	service
		.resolve_observation(ResolveObservationRequest {
			outcome: "falsified".to_owned(),
			result: "timeouts persisted with a larger pool".to_owned(),
			surprise: None,
			root_cause: Some(RootCause {
				category: "environment".to_owned(),
				description: "staging config diverged from production".to_owned(),
			}),
			lesson: None,
			auto_captured: Some(true),
		})
		.await
		.expect("Resolve failed.");

	assert_eq!(
		store.collection_names().await,
		["ghap_full", "ghap_root_cause", "ghap_strategy"]
	);

	let roots =
		store.scroll("ghap_root_cause", 10, &Filter::none(), false).await.expect("Scroll failed.");

	assert_eq!(roots.len(), 1);
	assert_eq!(roots[0].payload["axis"], "root_cause");
	assert_eq!(roots[0].payload["root_cause"]["category"], "environment");

	let full = store.scroll("ghap_full", 10, &Filter::none(), false).await.expect("Scroll failed.");

	assert!(full[0].payload.get("surprise").is_none());
	// Auto-captured outcomes earn the top tier.
	assert_eq!(full[0].payload["confidence_tier"], "gold");
}

#[tokio::test]
async fn mutations_require_an_active_entry() {
	let (service, _store) = service();
	let err = service
		.update_observation(UpdateObservationRequest::default())
		.await
		.expect_err("Update must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::NoActiveObservation { .. })));
	assert!(err.to_string().contains("update"));

	let err = service.resolve_observation(confirm_request()).await.expect_err("Resolve must fail.");

	assert!(err.to_string().contains("resolve"));

	let err = service
		.abandon_observation(AbandonObservationRequest { reason: "nothing to abandon".to_owned() })
		.await
		.expect_err("Abandon must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::NoActiveObservation { .. })));
	assert!(service.active_observation().await.is_none());
}

#[tokio::test]
async fn abandonment_lands_with_the_lowest_tier() {
	let (service, store) = service();
	let started = service.start_observation(start_request()).await.expect("Start failed.");
	let ack = service
		.abandon_observation(AbandonObservationRequest {
			reason: "superseded by a config rollback".to_owned(),
		})
		.await
		.expect("Abandon failed.");

	assert_eq!(ack.status, AckStatus::Resolved);
	assert_eq!(ack.id, started.id);
	assert_eq!(store.collection_names().await, ["ghap_full", "ghap_strategy"]);

	let records =
		store.scroll("ghap_full", 10, &Filter::none(), false).await.expect("Scroll failed.");
	let payload = &records[0].payload;

	assert_eq!(payload["outcome_status"], "abandoned");
	assert_eq!(payload["confidence_tier"], "abandoned");
	assert_eq!(payload["outcome_result"], "superseded by a config rollback");

	// The slot is free again.
	service.start_observation(start_request()).await.expect("Restart failed.");
}

#[tokio::test]
async fn failed_persistence_keeps_the_entry_for_retry() {
	let inner = MemoryStore::new();
	let service = service_on(Arc::new(FailingStore::failing_once(inner.clone(), "ghap_full")));

	service.start_observation(start_request()).await.expect("Start failed.");

	let err = service
		.resolve_observation(confirm_request())
		.await
		.expect_err("The injected failure must surface.");

	assert!(matches!(err, ServiceError::Storage { .. }));
	assert!(service.active_observation().await.is_some());

	service.resolve_observation(confirm_request()).await.expect("Retry failed.");

	assert!(service.active_observation().await.is_none());

	let records =
		inner.scroll("ghap_full", 10, &Filter::none(), false).await.expect("Scroll failed.");

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].payload["outcome_status"], "confirmed");
}
