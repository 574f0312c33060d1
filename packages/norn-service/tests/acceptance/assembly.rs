use std::sync::Arc;

use serde_json::json;

use norn_domain::Error as DomainError;
use norn_service::{ContextRequest, PremortemRequest, ServiceError};
use norn_storage::{Axis, CollectionKind, MemoryStore, PointRecord};

use super::{
	FailingStore, embedding, experience_payload, memory_payload, object, seed, service, service_on,
};

fn context_request(query: &str, types: &[&str], max_tokens: Option<usize>) -> ContextRequest {
	ContextRequest {
		query: query.to_owned(),
		context_types: types.iter().map(|&name| name.to_owned()).collect(),
		limit: None,
		max_tokens,
	}
}

async fn seed_premortem_fixture(store: &MemoryStore) {
	seed(store, CollectionKind::Experiences(Axis::Full), vec![
		PointRecord::new(
			"f1",
			embedding("retry storm overwhelmed the queue"),
			object(json!({
				"ghap_id": "f1",
				"axis": "full",
				"domain": "debugging",
				"strategy": "read-the-error",
				"goal": "retry storm overwhelmed the queue",
				"hypothesis": "the backoff was linear",
				"action": "switch to exponential backoff",
				"prediction": "queue depth falls",
				"outcome_status": "falsified",
				"outcome_result": "queue depth kept climbing",
				"iteration_count": 2,
				"created_at": "2025-05-20T09:00:00Z",
			})),
		),
		PointRecord::new(
			"c1",
			embedding("cache warmed up as planned"),
			experience_payload(
				"c1",
				"full",
				"cache warmed up as planned",
				"debugging",
				"confirmed",
				"gold",
			),
		),
		PointRecord::new(
			"f2",
			embedding("flaky test masked the regression"),
			experience_payload(
				"f2",
				"full",
				"flaky test masked the regression",
				"testing",
				"falsified",
				"silver",
			),
		),
	])
	.await;
	seed(store, CollectionKind::Experiences(Axis::Strategy), vec![PointRecord::new(
		"s1",
		embedding("read the stack trace before theorizing"),
		experience_payload(
			"s1",
			"strategy",
			"read the stack trace before theorizing",
			"debugging",
			"confirmed",
			"gold",
		),
	)])
	.await;

	// Stored under the surprise collection with a stale payload axis; the
	// assembled item must report the axis it was retrieved from.
	let mut surprised = experience_payload(
		"u1",
		"full",
		"the fix landed but latency doubled",
		"debugging",
		"falsified",
		"silver",
	);

	surprised.insert("surprise".to_owned(), json!("the retry path masked the real error"));
	seed(store, CollectionKind::Experiences(Axis::Surprise), vec![PointRecord::new(
		"u1",
		embedding("the fix landed but latency doubled"),
		surprised,
	)])
	.await;

	let mut rooted = experience_payload(
		"r1",
		"root_cause",
		"staging drifted from production",
		"debugging",
		"falsified",
		"silver",
	);

	rooted.insert(
		"root_cause".to_owned(),
		json!({ "category": "environment", "description": "staging config diverged" }),
	);
	seed(store, CollectionKind::Experiences(Axis::RootCause), vec![PointRecord::new(
		"r1",
		embedding("staging drifted from production"),
		rooted,
	)])
	.await;

	seed(store, CollectionKind::Values, vec![PointRecord::new(
		"v1",
		embedding("hold a reserve of database connections"),
		object(json!({
			"axis": "full",
			"cluster_id": "full_0",
			"text": "hold a reserve of database connections",
			"member_count": 6,
			"avg_confidence": 0.9,
			"created_at": "2025-05-01T08:00:00Z",
		})),
	)])
	.await;
}

#[tokio::test]
async fn oversized_items_are_truncated_and_recorded() {
	let (service, store) = service();
	let small = "keep the connection pool above twenty for batch jobs";
	let big = "database pool diagnostics. ".repeat(90);

	seed(&store, CollectionKind::Memories, vec![
		PointRecord::new("m_small", embedding(small), memory_payload(small)),
		PointRecord::new("m_big", embedding(&big), memory_payload(&big)),
	])
	.await;
	seed(&store, CollectionKind::Experiences(Axis::Full), vec![PointRecord::new(
		"e1",
		embedding("always check connection pool limits"),
		experience_payload(
			"e1",
			"full",
			"always check connection pool limits",
			"debugging",
			"confirmed",
			"silver",
		),
	)])
	.await;

	let context = service
		.assemble_context(context_request(
			"database pool diagnostics",
			&["memories", "experiences"],
			Some(500),
		))
		.await
		.expect("Assembly failed.");

	assert_eq!(context.truncated_items, ["m_big"]);
	assert!(!context.budget_exceeded);
	assert!(context.token_count < 500);
	assert_eq!(context.items.len(), 3);
	assert_eq!(context.sources_used.get("memories"), Some(&2));
	assert_eq!(context.sources_used.get("experiences"), Some(&1));
	assert!(context.markdown.starts_with("# Context\n"));
	assert!(context.markdown.contains("*(truncated)*"));

	let memories_at = context.markdown.find("## Memories").expect("Missing memories section.");
	let experiences_at =
		context.markdown.find("## Experiences").expect("Missing experiences section.");

	assert!(memories_at < experiences_at);
}

#[tokio::test]
async fn bad_requests_fail_before_any_source_is_queried() {
	let (service, store) = service();
	let err = service
		.assemble_context(context_request("anything", &["memories", "decisions"], None))
		.await
		.expect_err("A bogus context type must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::InvalidContextType { .. })));
	assert!(err.to_string().contains("decisions"));
	assert!(err.to_string().contains("memories, code, experiences, values, commits"));

	let err = service
		.assemble_context(context_request("anything", &["memories"], Some(0)))
		.await
		.expect_err("A zero budget must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::BudgetOutOfRange { .. })));
	assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn failed_sources_drop_out_instead_of_failing_the_assembly() {
	let inner = MemoryStore::new();

	seed(&inner, CollectionKind::Experiences(Axis::Full), vec![
		PointRecord::new(
			"e1",
			embedding("connection pool drained during deploys"),
			experience_payload(
				"e1",
				"full",
				"connection pool drained during deploys",
				"debugging",
				"confirmed",
				"gold",
			),
		),
		PointRecord::new(
			"e2",
			embedding("pool metrics lag behind reality"),
			experience_payload(
				"e2",
				"full",
				"pool metrics lag behind reality",
				"debugging",
				"confirmed",
				"silver",
			),
		),
	])
	.await;

	let service = service_on(Arc::new(FailingStore::new(inner, "memories")));
	let context = service
		.assemble_context(context_request("connection pool", &["memories", "experiences"], None))
		.await
		.expect("Assembly must survive a failing source.");

	assert_eq!(context.sources_used.get("memories"), None);
	assert_eq!(context.sources_used.get("experiences"), Some(&2));
	assert!(!context.markdown.contains("## Memories"));
	assert!(context.markdown.contains("## Experiences"));
}

#[tokio::test]
async fn duplicate_content_collapses_to_one_item() {
	let (service, store) = service();
	let repeated = "prefer structured logs over printf debugging";

	seed(&store, CollectionKind::Memories, vec![
		PointRecord::new("m1", embedding(repeated), memory_payload(repeated)),
		PointRecord::new("m2", embedding(repeated), memory_payload(repeated)),
		PointRecord::new(
			"m3",
			embedding("profile before optimizing"),
			memory_payload("profile before optimizing"),
		),
	])
	.await;

	let context = service
		.assemble_context(context_request("debugging habits", &["memories"], None))
		.await
		.expect("Assembly failed.");

	assert_eq!(context.sources_used.get("memories"), Some(&2));
	assert_eq!(context.items.len(), 2);
	assert!(context.markdown.contains("*2 items from 1 sources*"));
}

#[tokio::test]
async fn premortem_groups_failures_by_retrieval_axis() {
	let (service, store) = service();

	seed_premortem_fixture(&store).await;

	let context = service
		.premortem_context(PremortemRequest {
			domain: "debugging".to_owned(),
			strategy: Some("read-the-error".to_owned()),
			limit: None,
			max_tokens: Some(5_000),
		})
		.await
		.expect("Premortem assembly failed.");

	assert!(context.markdown.starts_with("# Premortem: debugging with read-the-error"));
	assert_eq!(context.sources_used.get("experiences"), Some(&4));
	assert_eq!(context.sources_used.get("values"), Some(&1));
	assert_eq!(context.items.len(), 5);
	assert!(!context.budget_exceeded);

	// Only falsified entries from the requested domain reach the failure
	// section.
	assert!(context.markdown.contains("retry storm overwhelmed the queue"));
	assert!(!context.markdown.contains("cache warmed up as planned"));
	assert!(!context.markdown.contains("flaky test masked the regression"));

	// The surprise entry carries a stale payload axis, but grouping follows
	// the collection it was retrieved from.
	let surprises_at = context
		.markdown
		.find("## Unexpected Outcomes")
		.expect("Missing surprise section.");
	let roots_at = context
		.markdown
		.find("## Root Causes to Watch")
		.expect("Missing root cause section.");
	let surprise_goal_at = context
		.markdown
		.find("the fix landed but latency doubled")
		.expect("Missing surprise entry.");

	assert!(surprises_at < surprise_goal_at && surprise_goal_at < roots_at);
	assert!(context.markdown.contains("## Common Failures"));
	assert!(context.markdown.contains("## Strategy Performance"));
	assert!(context.markdown.contains("## Relevant Principles"));
	assert!(context.markdown.contains("hold a reserve of database connections"));
	assert!(context.markdown.contains("*Based on 4 past experiences*"));
}

#[tokio::test]
async fn premortem_reports_budget_pressure_without_dropping_items() {
	let (service, store) = service();

	seed_premortem_fixture(&store).await;

	let context = service
		.premortem_context(PremortemRequest {
			domain: "debugging".to_owned(),
			strategy: Some("read-the-error".to_owned()),
			limit: None,
			max_tokens: Some(50),
		})
		.await
		.expect("Premortem assembly failed.");

	assert!(context.budget_exceeded);
	assert!(context.truncated_items.is_empty());
	assert_eq!(context.items.len(), 5);
}
