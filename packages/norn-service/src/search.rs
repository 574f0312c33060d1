mod keyword;

use std::collections::HashSet;

use serde_json::Value;
use time::OffsetDateTime;

use norn_domain::{
	CodeResult, CommitResult, Error as DomainError, ExperienceResult, MemoryResult, SearchResult,
	ValueResult, timestamp,
};
use norn_storage::{Axis, CollectionKind, Condition, Filter};

use crate::{NornService, ServiceError, ServiceResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
	Semantic,
	Keyword,
	Hybrid,
}
impl SearchMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Semantic => "semantic",
			Self::Keyword => "keyword",
			Self::Hybrid => "hybrid",
		}
	}

	/// An absent mode means semantic.
	pub fn parse(value: Option<&str>) -> Result<Self, DomainError> {
		match value {
			None => Ok(Self::Semantic),
			Some("semantic") => Ok(Self::Semantic),
			Some("keyword") => Ok(Self::Keyword),
			Some("hybrid") => Ok(Self::Hybrid),
			Some(other) => Err(DomainError::InvalidSearchMode {
				requested: other.to_string(),
				valid: "semantic, keyword, hybrid".to_string(),
			}),
		}
	}
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MemorySearchRequest {
	pub query: String,
	pub category: Option<String>,
	pub limit: Option<usize>,
	pub mode: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CodeSearchRequest {
	pub query: String,
	pub project: Option<String>,
	pub language: Option<String>,
	pub unit_type: Option<String>,
	pub limit: Option<usize>,
	pub mode: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ExperienceSearchRequest {
	pub query: String,
	pub axis: Option<String>,
	pub domain: Option<String>,
	pub strategy: Option<String>,
	pub outcome: Option<String>,
	pub limit: Option<usize>,
	pub mode: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ValueSearchRequest {
	pub query: String,
	pub axis: Option<String>,
	pub limit: Option<usize>,
	pub mode: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CommitSearchRequest {
	pub query: String,
	pub author: Option<String>,
	pub since: Option<String>,
	pub limit: Option<usize>,
	pub mode: Option<String>,
}

impl NornService {
	pub async fn search_memories(
		&self,
		req: MemorySearchRequest,
	) -> ServiceResult<Vec<MemoryResult>> {
		if req.query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mode = SearchMode::parse(req.mode.as_deref())?;
		let limit = self.effective_limit(req.limit);
		let filter = Filter::all(
			req.category.as_deref().map(|category| Condition::eq("category", category)),
		);
		let raw = self
			.search_collection(CollectionKind::Memories, &req.query, mode, limit, &filter)
			.await?;

		Ok(raw.iter().map(MemoryResult::from_raw).collect::<Result<Vec<_>, _>>()?)
	}

	pub async fn search_code(&self, req: CodeSearchRequest) -> ServiceResult<Vec<CodeResult>> {
		if req.query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mode = SearchMode::parse(req.mode.as_deref())?;
		let limit = self.effective_limit(req.limit);
		let filter = Filter::all(
			[
				req.project.as_deref().map(|project| Condition::eq("project", project)),
				req.language.as_deref().map(|language| Condition::eq("language", language)),
				req.unit_type.as_deref().map(|unit_type| Condition::eq("unit_type", unit_type)),
			]
			.into_iter()
			.flatten(),
		);
		let raw =
			self.search_collection(CollectionKind::Code, &req.query, mode, limit, &filter).await?;

		Ok(raw.iter().map(CodeResult::from_raw).collect::<Result<Vec<_>, _>>()?)
	}

	pub async fn search_experiences(
		&self,
		req: ExperienceSearchRequest,
	) -> ServiceResult<Vec<ExperienceResult>> {
		if req.query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mode = SearchMode::parse(req.mode.as_deref())?;
		let limit = self.effective_limit(req.limit);
		let axis = match req.axis.as_deref() {
			None => Axis::Full,
			Some(value) => Axis::parse(value)?,
		};
		let filter = Filter::all(
			[
				req.domain.as_deref().map(|domain| Condition::eq("domain", domain)),
				req.strategy.as_deref().map(|strategy| Condition::eq("strategy", strategy)),
				req.outcome.as_deref().map(|outcome| Condition::eq("outcome_status", outcome)),
			]
			.into_iter()
			.flatten(),
		);
		let raw = self
			.search_collection(CollectionKind::Experiences(axis), &req.query, mode, limit, &filter)
			.await?;

		Ok(raw.iter().map(ExperienceResult::from_raw).collect::<Result<Vec<_>, _>>()?)
	}

	pub async fn search_values(&self, req: ValueSearchRequest) -> ServiceResult<Vec<ValueResult>> {
		if req.query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mode = SearchMode::parse(req.mode.as_deref())?;
		let limit = req.limit.unwrap_or(self.cfg.context.values_limit as usize);
		let filter = Filter::all(req.axis.as_deref().map(|axis| Condition::eq("axis", axis)));
		let raw =
			self.search_collection(CollectionKind::Values, &req.query, mode, limit, &filter).await?;

		Ok(raw.iter().map(ValueResult::from_raw).collect::<Result<Vec<_>, _>>()?)
	}

	pub async fn search_commits(
		&self,
		req: CommitSearchRequest,
	) -> ServiceResult<Vec<CommitResult>> {
		if req.query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let mode = SearchMode::parse(req.mode.as_deref())?;
		let limit = self.effective_limit(req.limit);
		let since = req.since.as_deref().map(parse_since).transpose()?;
		let filter =
			Filter::all(req.author.as_deref().map(|author| Condition::eq("author", author)));
		let raw = self
			.search_collection(CollectionKind::Commits, &req.query, mode, limit, &filter)
			.await?;
		let mut commits = raw.iter().map(CommitResult::from_raw).collect::<Result<Vec<_>, _>>()?;

		// The store only filters on exact payload matches, so the time bound
		// is applied after parsing.
		if let Some(since) = since {
			commits.retain(|commit| commit.committed_at >= since);
		}

		Ok(commits)
	}

	fn effective_limit(&self, limit: Option<usize>) -> usize {
		limit.unwrap_or(self.cfg.search.default_limit as usize)
	}

	pub(crate) async fn search_collection(
		&self,
		kind: CollectionKind,
		query: &str,
		mode: SearchMode,
		limit: usize,
		filter: &Filter,
	) -> ServiceResult<Vec<SearchResult>> {
		self.ensure_ready(kind).await?;

		match mode {
			SearchMode::Semantic => self.semantic_search(kind, query, limit, filter).await,
			SearchMode::Keyword => self.keyword_search(kind, query, limit, filter).await,
			SearchMode::Hybrid => self.hybrid_search(kind, query, limit, filter).await,
		}
	}

	async fn semantic_search(
		&self,
		kind: CollectionKind,
		query: &str,
		limit: usize,
		filter: &Filter,
	) -> ServiceResult<Vec<SearchResult>> {
		let vector = self.embed_one(self.embedding_for(kind), query).await?;

		Ok(self.store.search(kind.collection_name(), vector, limit, filter).await?)
	}

	/// Semantic results win the ordering; anything the keyword scan also
	/// found gets a fixed boost, and keyword-only hits fill in after.
	async fn hybrid_search(
		&self,
		kind: CollectionKind,
		query: &str,
		limit: usize,
		filter: &Filter,
	) -> ServiceResult<Vec<SearchResult>> {
		let (semantic, keyword) = tokio::join!(
			self.semantic_search(kind, query, limit, filter),
			self.keyword_search(kind, query, limit, filter),
		);
		let mut merged = semantic?;
		let boost = self.cfg.search.hybrid_boost;
		let semantic_ids = merged.iter().map(|result| result.id.clone()).collect::<HashSet<_>>();

		for result in keyword? {
			if semantic_ids.contains(&result.id) {
				if let Some(hit) = merged.iter_mut().find(|hit| hit.id == result.id) {
					hit.score += boost;
				}
			} else {
				merged.push(result);
			}
		}

		merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		merged.truncate(limit);

		Ok(merged)
	}
}

fn parse_since(value: &str) -> Result<OffsetDateTime, ServiceError> {
	let trimmed = value.trim();

	if let Ok(seconds) = trimmed.parse::<f64>() {
		return timestamp::from_epoch_seconds(seconds).ok_or_else(|| ServiceError::InvalidRequest {
			message: format!("since is out of range: {trimmed}."),
		});
	}

	timestamp::parse_timestamp("since", &Value::String(trimmed.to_owned())).map_err(|_| {
		ServiceError::InvalidRequest {
			message: "since must be an ISO-8601 timestamp or epoch seconds.".to_string(),
		}
	})
}
