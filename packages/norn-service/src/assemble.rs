use std::{
	collections::{BTreeMap, HashMap, HashSet},
	future::Future,
	time::Duration,
};

use tokio::{task::JoinHandle, time, time::error::Elapsed};

use norn_domain::{
	ContextItem, FormattedContext, SourceKind, assemble_markdown, assemble_premortem_markdown,
	cap_item_tokens, deduplicate_items, distribute_budget, estimate_tokens, parse_context_types,
};
use norn_storage::Axis;

use crate::{
	CodeSearchRequest, CommitSearchRequest, ExperienceSearchRequest, MemorySearchRequest,
	NornService, ServiceResult, ValueSearchRequest,
};

type SourceHandle = JoinHandle<Result<ServiceResult<Vec<ContextItem>>, Elapsed>>;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ContextRequest {
	pub query: String,
	pub context_types: Vec<String>,
	pub limit: Option<usize>,
	pub max_tokens: Option<usize>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PremortemRequest {
	pub domain: String,
	pub strategy: Option<String>,
	pub limit: Option<usize>,
	pub max_tokens: Option<usize>,
}

impl NornService {
	/// Queries every requested source in parallel, merges and deduplicates
	/// the hits, then selects items within a per-source token budget and
	/// renders the grouped document.
	pub async fn assemble_context(&self, req: ContextRequest) -> ServiceResult<FormattedContext> {
		let kinds = dedup_kinds(&parse_context_types(&req.context_types)?);
		let limit = req.limit.unwrap_or(self.cfg.context.default_limit as usize);
		let max_tokens = req.max_tokens.unwrap_or(self.cfg.context.default_max_tokens as usize);
		let budget = distribute_budget(&req.context_types, max_tokens)?;

		tracing::info!(
			query = %req.query,
			context_types = ?req.context_types,
			limit,
			max_tokens,
			"Assembling context."
		);

		let items_by_source = self.query_sources(&req.query, &kinds, limit).await;
		let fetched = items_by_source.iter().map(|(_, items)| items.len()).sum::<usize>();
		let merged = items_by_source.into_iter().flat_map(|(_, items)| items).collect::<Vec<_>>();
		let deduped = deduplicate_items(merged);

		tracing::debug!(fetched, kept = deduped.len(), "Deduplicated assembled items.");

		let (sections, truncated_items) = select_items(deduped, &kinds, &budget);
		let markdown = assemble_markdown(&sections);
		let token_count = estimate_tokens(&markdown);
		let budget_exceeded = token_count > max_tokens;

		if budget_exceeded {
			tracing::warn!(token_count, max_tokens, "Assembled context exceeds the token budget.");
		}

		let sources_used = sections
			.iter()
			.map(|(kind, picked)| (kind.context_type().to_owned(), picked.len()))
			.collect::<BTreeMap<_, _>>();
		let items = sections.into_iter().flat_map(|(_, picked)| picked).collect();

		Ok(FormattedContext {
			markdown,
			items,
			token_count,
			sources_used,
			budget_exceeded,
			truncated_items,
		})
	}

	/// Runs the fixed failure-focused query slate for a domain and renders
	/// the premortem document. Everything fetched is included; there is no
	/// dedup or budget-driven truncation here, only the exceeded flag.
	pub async fn premortem_context(
		&self,
		req: PremortemRequest,
	) -> ServiceResult<FormattedContext> {
		let limit = req.limit.unwrap_or(self.cfg.context.premortem_limit as usize);
		let max_tokens = req.max_tokens.unwrap_or(self.cfg.context.premortem_max_tokens as usize);

		tracing::info!(
			domain = %req.domain,
			strategy = req.strategy.as_deref().unwrap_or_default(),
			limit,
			max_tokens,
			"Assembling premortem context."
		);

		let mut slate = vec![premortem_query(
			Axis::Full,
			format!("failures and issues in {}", req.domain),
			Some(req.domain.clone()),
			None,
			Some("falsified".to_owned()),
			limit,
		)];

		if let Some(strategy) = &req.strategy {
			slate.push(premortem_query(
				Axis::Strategy,
				format!("outcomes using {strategy} strategy"),
				None,
				Some(strategy.clone()),
				None,
				limit,
			));
		}

		slate.push(premortem_query(
			Axis::Surprise,
			format!("unexpected outcomes in {}", req.domain),
			Some(req.domain.clone()),
			None,
			None,
			limit,
		));
		slate.push(premortem_query(
			Axis::RootCause,
			format!("why hypotheses fail in {}", req.domain),
			Some(req.domain.clone()),
			None,
			None,
			limit,
		));

		let mut handles = Vec::new();

		for (axis, request) in slate {
			let service = self.clone();

			handles.push((
				axis,
				self.spawn_with_timeout(async move {
					let results = service.search_experiences(request).await?;

					Ok(results
						.iter()
						.map(|result| {
							let mut item = ContextItem::from_experience(result);

							// The item reports the axis it was retrieved
							// from, not the axis stored in its payload.
							item.metadata.insert("axis".into(), axis.as_str().into());

							item
						})
						.collect())
				}),
			));
		}

		let mut values_query = format!("principles for {}", req.domain);

		if let Some(strategy) = &req.strategy {
			values_query.push_str(&format!(" using {strategy}"));
		}

		let values_request = ValueSearchRequest {
			query: values_query,
			axis: None,
			limit: Some(self.cfg.context.values_limit as usize),
			mode: None,
		};
		let service = self.clone();
		let values_handle = self.spawn_with_timeout(async move {
			let results = service.search_values(values_request).await?;

			Ok(results.iter().map(ContextItem::from_value).collect())
		});
		let mut experiences = Vec::new();

		for (index, (axis, handle)) in handles.into_iter().enumerate() {
			let label = format!("experiences[{index}]:{}", axis.as_str());

			experiences.extend(join_source(handle, &label).await);
		}

		let values = join_source(values_handle, "values").await;
		let markdown = assemble_premortem_markdown(
			&req.domain,
			req.strategy.as_deref(),
			&experiences,
			&values,
		);
		let token_count = estimate_tokens(&markdown);
		let budget_exceeded = token_count > max_tokens;
		let mut sources_used = BTreeMap::new();

		sources_used.insert("experiences".to_owned(), experiences.len());
		sources_used.insert("values".to_owned(), values.len());

		let mut items = experiences;

		items.extend(values);

		Ok(FormattedContext {
			markdown,
			items,
			token_count,
			sources_used,
			budget_exceeded,
			truncated_items: Vec::new(),
		})
	}

	async fn query_sources(
		&self,
		query: &str,
		kinds: &[SourceKind],
		limit: usize,
	) -> Vec<(SourceKind, Vec<ContextItem>)> {
		let mut handles = Vec::new();

		for &kind in kinds {
			let service = self.clone();
			let query = query.to_owned();

			handles.push((
				kind,
				self.spawn_with_timeout(
					async move { service.source_items(kind, &query, limit).await },
				),
			));
		}

		let mut items_by_source = Vec::new();

		for (kind, handle) in handles {
			items_by_source.push((kind, join_source(handle, kind.context_type()).await));
		}

		items_by_source
	}

	async fn source_items(
		&self,
		kind: SourceKind,
		query: &str,
		limit: usize,
	) -> ServiceResult<Vec<ContextItem>> {
		match kind {
			SourceKind::Memory => {
				let results = self
					.search_memories(MemorySearchRequest {
						query: query.to_owned(),
						category: None,
						limit: Some(limit),
						mode: None,
					})
					.await?;

				Ok(results.iter().map(ContextItem::from_memory).collect())
			},
			SourceKind::Code => {
				let results = self
					.search_code(CodeSearchRequest {
						query: query.to_owned(),
						project: None,
						language: None,
						unit_type: None,
						limit: Some(limit),
						mode: None,
					})
					.await?;

				Ok(results.iter().map(ContextItem::from_code).collect())
			},
			SourceKind::Experience => {
				let results = self
					.search_experiences(ExperienceSearchRequest {
						query: query.to_owned(),
						axis: Some(Axis::Full.as_str().to_owned()),
						domain: None,
						strategy: None,
						outcome: None,
						limit: Some(limit),
						mode: None,
					})
					.await?;

				Ok(results.iter().map(ContextItem::from_experience).collect())
			},
			SourceKind::Value => {
				let results = self
					.search_values(ValueSearchRequest {
						query: query.to_owned(),
						axis: None,
						limit: Some(self.cfg.context.values_limit as usize),
						mode: None,
					})
					.await?;

				Ok(results.iter().map(ContextItem::from_value).collect())
			},
			SourceKind::Commit => {
				let results = self
					.search_commits(CommitSearchRequest {
						query: query.to_owned(),
						author: None,
						since: None,
						limit: Some(limit),
						mode: None,
					})
					.await?;

				Ok(results.iter().map(ContextItem::from_commit).collect())
			},
		}
	}

	fn spawn_with_timeout(
		&self,
		future: impl Future<Output = ServiceResult<Vec<ContextItem>>> + Send + 'static,
	) -> SourceHandle {
		let timeout = Duration::from_millis(self.cfg.context.source_timeout_ms);

		tokio::spawn(time::timeout(timeout, future))
	}
}

/// A failed or timed-out source degrades to an empty result list so the
/// remaining sources still assemble.
async fn join_source(handle: SourceHandle, label: &str) -> Vec<ContextItem> {
	match handle.await {
		Ok(Ok(Ok(items))) => items,
		Ok(Ok(Err(err))) => {
			tracing::warn!(
				source = label,
				error = %err,
				"Source query failed; continuing without its results."
			);

			Vec::new()
		},
		Ok(Err(_)) => {
			tracing::warn!(
				source = label,
				"Source query timed out; continuing without its results."
			);

			Vec::new()
		},
		Err(err) => {
			tracing::warn!(
				source = label,
				error = %err,
				"Source task failed; continuing without its results."
			);

			Vec::new()
		},
	}
}

fn premortem_query(
	axis: Axis,
	query: String,
	domain: Option<String>,
	strategy: Option<String>,
	outcome: Option<String>,
	limit: usize,
) -> (Axis, ExperienceSearchRequest) {
	let request = ExperienceSearchRequest {
		query,
		axis: Some(axis.as_str().to_owned()),
		domain,
		strategy,
		outcome,
		limit: Some(limit),
		mode: None,
	};

	(axis, request)
}

fn dedup_kinds(kinds: &[SourceKind]) -> Vec<SourceKind> {
	let mut seen = HashSet::new();

	kinds.iter().copied().filter(|&kind| seen.insert(kind)).collect()
}

/// Fills each source section up to its budget share in relevance order,
/// then hands any unspent budget evenly to sources that still have items.
///
/// An item too large for its share is truncated and recorded; whether or
/// not the truncated form then fits, the id stays recorded so callers can
/// fetch the full record.
fn select_items(
	items: Vec<ContextItem>,
	kinds: &[SourceKind],
	budget: &HashMap<SourceKind, usize>,
) -> (Vec<(SourceKind, Vec<ContextItem>)>, Vec<String>) {
	let mut by_source: HashMap<SourceKind, Vec<ContextItem>> = HashMap::new();

	for item in items {
		by_source.entry(item.source).or_default().push(item);
	}

	let mut sections: Vec<(SourceKind, Vec<ContextItem>)> = Vec::new();
	let mut truncated = Vec::new();
	let mut unused = 0_usize;

	for &kind in kinds {
		let Some(source_items) = by_source.get(&kind) else {
			continue;
		};
		let source_budget = budget.get(&kind).copied().unwrap_or(0);

		if source_budget == 0 {
			continue;
		}

		let mut used = 0_usize;
		let mut picked = Vec::new();

		for item in source_items {
			let Some(capped) = cap_and_fit(item, kind, source_budget, &mut used, &mut truncated)
			else {
				break;
			};

			picked.push(capped);
		}

		if used < source_budget {
			unused += source_budget - used;
		}

		sections.push((kind, picked));
	}

	if unused > 0 {
		let needing_more = sections
			.iter()
			.enumerate()
			.filter(|(_, (kind, picked))| {
				by_source.get(kind).map(|all| all.len() > picked.len()).unwrap_or(false)
			})
			.map(|(index, _)| index)
			.collect::<Vec<_>>();

		if !needing_more.is_empty() {
			let extra = unused / needing_more.len();

			for index in needing_more {
				let (kind, picked) = &mut sections[index];
				let kind = *kind;
				let Some(source_items) = by_source.get(&kind) else {
					continue;
				};
				let source_budget = budget.get(&kind).copied().unwrap_or(0) + extra;
				let mut used =
					picked.iter().map(|item| estimate_tokens(&item.content)).sum::<usize>();
				let start = picked.len();

				for item in &source_items[start..] {
					let Some(capped) =
						cap_and_fit(item, kind, source_budget, &mut used, &mut truncated)
					else {
						break;
					};

					picked.push(capped);
				}
			}
		}
	}

	(sections, truncated)
}

/// Caps one item against its source budget and checks the fit. Returns the
/// selected item, or `None` when the source is out of room.
fn cap_and_fit(
	item: &ContextItem,
	kind: SourceKind,
	source_budget: usize,
	used: &mut usize,
	truncated: &mut Vec<String>,
) -> Option<ContextItem> {
	let (capped, was_truncated) =
		cap_item_tokens(&item.content, source_budget, &item.metadata, kind);

	if was_truncated {
		truncated.push(item.metadata_str("id").unwrap_or("unknown").to_owned());
	}

	let item_tokens = estimate_tokens(&capped);

	if *used + item_tokens > source_budget {
		return None;
	}

	*used += item_tokens;

	let mut selected = item.clone();

	selected.content = capped;

	Some(selected)
}
