use norn_domain::Error as DomainError;
use norn_service::{CodeSearchRequest, CommitSearchRequest, MemorySearchRequest, ServiceError};
use norn_storage::{CollectionKind, PointRecord};

use super::{
	code_embedding, code_payload, commit_payload, embedding, memory_payload, object, seed, service,
};

fn memory_request(query: &str, mode: Option<&str>) -> MemorySearchRequest {
	MemorySearchRequest {
		query: query.to_owned(),
		category: None,
		limit: None,
		mode: mode.map(str::to_owned),
	}
}

#[tokio::test]
async fn semantic_search_ranks_related_memories_first() {
	let (service, store) = service();
	let texts = [
		("m1", "database connection pool exhaustion under load"),
		("m2", "tune the database connection pool size"),
		("m3", "parse yaml frontmatter blocks"),
	];
	let points = texts
		.iter()
		.map(|(id, text)| PointRecord::new(*id, embedding(text), memory_payload(text)))
		.collect();

	seed(&store, CollectionKind::Memories, points).await;

	let results = service
		.search_memories(memory_request("database connection pool tuning", None))
		.await
		.expect("Search failed.");

	assert_eq!(results.len(), 3);
	assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
	assert_eq!(results[2].id, "m3");
	assert_eq!(results[0].category, "insight");
}

#[tokio::test]
async fn hybrid_search_boosts_exact_matches() {
	let (service, store) = service();
	let texts = [
		("m_exact", "restart the ingest worker"),
		("m_related", "automatically restart the ingest worker after crashes"),
		("m_off", "parse yaml frontmatter blocks"),
	];
	let points = texts
		.iter()
		.map(|(id, text)| PointRecord::new(*id, embedding(text), memory_payload(text)))
		.collect();

	seed(&store, CollectionKind::Memories, points).await;

	let results = service
		.search_memories(memory_request("restart the ingest worker", Some("hybrid")))
		.await
		.expect("Search failed.");
	let ids = results.iter().map(|result| result.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, ["m_exact", "m_related", "m_off"]);
	// Cosine tops out at 1.0, so only the keyword boost pushes past it.
	assert!(results[0].score > 1.0);
}

#[tokio::test]
async fn keyword_search_requires_textual_overlap() {
	let (service, store) = service();

	seed(&store, CollectionKind::Memories, vec![
		PointRecord::new(
			"m_exact",
			embedding("restart the ingest worker"),
			memory_payload("restart the ingest worker"),
		),
		PointRecord::new(
			"m_off",
			embedding("parse yaml frontmatter blocks"),
			memory_payload("parse yaml frontmatter blocks"),
		),
	])
	.await;

	let results = service
		.search_memories(memory_request("restart the ingest worker", Some("keyword")))
		.await
		.expect("Search failed.");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].id, "m_exact");
	assert!((results[0].score - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn blank_queries_return_nothing_and_touch_no_collections() {
	let (service, store) = service();

	let memories =
		service.search_memories(memory_request("   ", None)).await.expect("Search failed.");
	let code = service
		.search_code(CodeSearchRequest {
			query: String::new(),
			project: None,
			language: None,
			unit_type: None,
			limit: None,
			mode: None,
		})
		.await
		.expect("Search failed.");

	assert!(memories.is_empty());
	assert!(code.is_empty());
	assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn unknown_search_modes_are_rejected() {
	let (service, store) = service();
	let err = service
		.search_memories(memory_request("anything", Some("fuzzy")))
		.await
		.expect_err("A bogus mode must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::InvalidSearchMode { .. })));
	assert!(err.to_string().contains("semantic, keyword, hybrid"));
	assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn code_search_filters_by_language() {
	let (service, store) = service();

	seed(&store, CollectionKind::Code, vec![
		PointRecord::new(
			"c_rust",
			code_embedding("fn parse_config(path: &Path) -> Result<Config>"),
			code_payload(
				"norn::config::parse_config",
				"rust",
				"fn parse_config(path: &Path) -> Result<Config>",
			),
		),
		PointRecord::new(
			"c_py",
			code_embedding("def parse_config(path):"),
			code_payload("tools.config.parse_config", "python", "def parse_config(path):"),
		),
	])
	.await;

	let results = service
		.search_code(CodeSearchRequest {
			query: "parse configuration file".to_owned(),
			project: None,
			language: Some("rust".to_owned()),
			unit_type: None,
			limit: None,
			mode: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].qualified_name, "norn::config::parse_config");
	assert_eq!(results[0].language, "rust");
}

#[tokio::test]
async fn commit_search_honors_the_since_bound() {
	let (service, store) = service();

	seed(&store, CollectionKind::Commits, vec![
		PointRecord::new(
			"c_old",
			embedding("fix pool sizing"),
			commit_payload("aaaa111a2b3c4d5e", "fix pool sizing", "2024-06-01T12:00:00Z"),
		),
		PointRecord::new(
			"c_new",
			embedding("raise pool ceiling"),
			commit_payload("bbbb222a2b3c4d5e", "raise pool ceiling", "2025-06-15T09:30:00Z"),
		),
	])
	.await;

	let results = service
		.search_commits(CommitSearchRequest {
			query: "pool fix".to_owned(),
			author: None,
			since: Some("2025-01-01T00:00:00Z".to_owned()),
			limit: None,
			mode: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].sha, "bbbb222a2b3c4d5e");

	let err = service
		.search_commits(CommitSearchRequest {
			query: "pool fix".to_owned(),
			author: None,
			since: Some("last tuesday".to_owned()),
			limit: None,
			mode: None,
		})
		.await
		.expect_err("Garbage since must fail.");

	assert!(err.to_string().contains("ISO-8601"));
}

#[tokio::test]
async fn malformed_payloads_surface_as_contract_violations() {
	let (service, store) = service();
	let broken = object(serde_json::json!({
		"category": "insight",
		"created_at": "2025-06-01T10:00:00Z",
	}));

	seed(&store, CollectionKind::Memories, vec![PointRecord::new(
		"bad",
		embedding("broken row"),
		broken,
	)])
	.await;

	let err = service
		.search_memories(memory_request("broken row", None))
		.await
		.expect_err("A payload without content must fail.");

	assert!(matches!(err, ServiceError::Domain(DomainError::Contract(_))));
	assert!(err.to_string().contains("`content`"));
}
