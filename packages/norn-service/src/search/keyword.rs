use serde_json::{Map, Value};

use norn_domain::SearchResult;
use norn_storage::{CollectionKind, Filter};

use crate::{NornService, ServiceResult};

impl NornService {
	/// Scores a scrolled window of the collection against the query text.
	/// Never touches the embedding provider.
	pub(crate) async fn keyword_search(
		&self,
		kind: CollectionKind,
		query: &str,
		limit: usize,
		filter: &Filter,
	) -> ServiceResult<Vec<SearchResult>> {
		let cap = self.cfg.search.keyword_scroll_limit as usize;
		let mut records = self.store.scroll(kind.collection_name(), cap, filter, false).await?;

		if records.len() == cap {
			tracing::warn!(
				collection = kind.collection_name(),
				cap,
				"Keyword scan hit the scroll cap; results may be incomplete."
			);
		}

		let fields = kind.keyword_fields();

		records.retain_mut(|record| {
			record.score = keyword_score(&record.payload, fields, query);

			record.score > 0.
		});
		records.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		records.truncate(limit);

		Ok(records)
	}
}

/// Best score across the searchable fields: 1.0 for an exact
/// case-insensitive match, at least 0.6 when the whole query appears as a
/// substring (scaled by how much of the field it covers), else the fraction
/// of query terms present scaled into the band below 0.6.
pub(crate) fn keyword_score(payload: &Map<String, Value>, fields: &[&str], query: &str) -> f32 {
	let needle = query.trim().to_lowercase();

	if needle.is_empty() {
		return 0.;
	}

	let terms = needle.split_whitespace().collect::<Vec<_>>();
	let mut best = 0_f32;

	for field in fields {
		let Some(text) = payload.get(*field).and_then(Value::as_str) else {
			continue;
		};
		let haystack = text.to_lowercase();
		let score = if haystack == needle {
			1.
		} else if haystack.contains(&needle) {
			0.6 + 0.4 * (needle.chars().count() as f32 / haystack.chars().count().max(1) as f32)
		} else {
			let matched = terms.iter().filter(|&&term| haystack.contains(term)).count();

			matched as f32 / terms.len().max(1) as f32 * 0.6
		};

		best = best.max(score);
	}

	best
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn content(text: &str) -> Map<String, Value> {
		let Value::Object(payload) = json!({ "content": text }) else { unreachable!() };

		payload
	}

	#[test]
	fn exact_match_scores_one() {
		let payload = content("Retry with backoff");

		assert_eq!(keyword_score(&payload, &["content"], "retry with backoff"), 1.);
	}

	#[test]
	fn substring_match_lands_in_upper_band() {
		let payload = content("Always retry with backoff on transient failures");
		let score = keyword_score(&payload, &["content"], "retry with backoff");

		assert!(score >= 0.6);
		assert!(score < 1.);
	}

	#[test]
	fn partial_term_overlap_stays_below_substring_band() {
		let payload = content("Backoff intervals double on every failure");
		let score = keyword_score(&payload, &["content"], "retry with backoff");

		assert!(score > 0.);
		assert!(score < 0.6);
	}

	#[test]
	fn no_overlap_scores_zero() {
		let payload = content("Unrelated note about formatting");

		assert_eq!(keyword_score(&payload, &["content"], "retry with backoff"), 0.);
	}

	#[test]
	fn missing_and_non_string_fields_are_skipped() {
		let Value::Object(payload) = json!({ "content": 42 }) else { unreachable!() };

		assert_eq!(keyword_score(&payload, &["content", "absent"], "anything"), 0.);
	}

	#[test]
	fn best_field_wins() {
		let Value::Object(payload) = json!({
			"qualified_name": "norn::search::keyword_score",
			"docstring": "scores a query",
		}) else {
			unreachable!()
		};
		let score = keyword_score(&payload, &["qualified_name", "docstring"], "keyword_score");

		assert!(score >= 0.6);
	}
}
