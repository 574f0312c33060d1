//! Token estimation and budget distribution.
//!
//! Counting is heuristic (four characters per token) and intentionally
//! cheap; the assembler only needs relative sizes, not tokenizer-exact
//! numbers.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
	context::{SourceKind, parse_context_types},
	error::{Error, Result},
};

/// Largest total budget a caller may request.
pub const MAX_TOTAL_TOKENS: usize = 100_000;
/// Largest share of its source budget a single item may consume.
pub const MAX_ITEM_FRACTION: f64 = 0.25;

/// Relative budget weight per source. Experiences are verbose and earn the
/// largest share; memories and values are single statements.
pub fn source_weight(kind: SourceKind) -> usize {
	match kind {
		SourceKind::Memory => 1,
		SourceKind::Code => 2,
		SourceKind::Experience => 3,
		SourceKind::Value => 1,
		SourceKind::Commit => 2,
	}
}

pub fn estimate_tokens(text: &str) -> usize {
	text.chars().count() / 4
}

/// Truncates to roughly `max_tokens`, preferring to break at the last
/// newline when that keeps at least 80% of the target length.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
	let max_chars = max_tokens * 4;
	let chars = text.chars().collect::<Vec<_>>();

	if chars.len() <= max_chars {
		return text.to_owned();
	}

	let truncated = &chars[..max_chars];

	match truncated.iter().rposition(|&ch| ch == '\n') {
		Some(newline) if newline as f64 > max_chars as f64 * 0.8 =>
			truncated[..newline].iter().collect(),
		_ => truncated.iter().collect(),
	}
}

/// Splits `max_tokens` across the requested types proportionally to their
/// weights.
///
/// The returned allocations always sum to exactly `max_tokens`: integer
/// division leaves a remainder, which goes to the highest-weighted requested
/// type (first in [`SourceKind::ALL`] order on ties). Requested types are
/// validated up front and duplicates collapse into one allocation.
pub fn distribute_budget(
	context_types: &[String],
	max_tokens: usize,
) -> Result<HashMap<SourceKind, usize>> {
	let mut kinds = Vec::new();

	for kind in parse_context_types(context_types)? {
		if !kinds.contains(&kind) {
			kinds.push(kind);
		}
	}

	if max_tokens < 1 || max_tokens > MAX_TOTAL_TOKENS {
		return Err(Error::BudgetOutOfRange { requested: max_tokens, ceiling: MAX_TOTAL_TOKENS });
	}
	if kinds.is_empty() {
		return Ok(HashMap::new());
	}

	let total_weight = kinds.iter().map(|&kind| source_weight(kind)).sum::<usize>();
	let mut budget = kinds
		.iter()
		.map(|&kind| (kind, max_tokens * source_weight(kind) / total_weight))
		.collect::<HashMap<_, _>>();
	let allocated = budget.values().sum::<usize>();
	let remainder = max_tokens - allocated;

	if remainder > 0 {
		let top_weight = kinds.iter().map(|&kind| source_weight(kind)).max().unwrap_or(0);
		let winner = SourceKind::ALL
			.into_iter()
			.filter(|kind| kinds.contains(kind))
			.find(|&kind| source_weight(kind) == top_weight);

		if let Some(winner) = winner
			&& let Some(allocation) = budget.get_mut(&winner)
		{
			*allocation += remainder;
		}
	}

	Ok(budget)
}

/// Caps one item's content to [`MAX_ITEM_FRACTION`] of its source budget.
///
/// Returns the (possibly truncated) content and whether truncation
/// happened. Truncated content ends with `...` and a source-aware pointer
/// back to the full record.
pub fn cap_item_tokens(
	content: &str,
	source_budget: usize,
	metadata: &Map<String, Value>,
	source: SourceKind,
) -> (String, bool) {
	let max_item_tokens = (source_budget as f64 * MAX_ITEM_FRACTION) as usize;

	if estimate_tokens(content) <= max_item_tokens {
		return (content.to_owned(), false);
	}

	let truncated = truncate_to_tokens(content, max_item_tokens);
	let note = match source {
		SourceKind::Code => format!(
			"\n\n*(truncated, see full at {}:{})*",
			metadata_display(metadata, "file_path", "unknown"),
			metadata_display(metadata, "line_start", "?")
		),
		SourceKind::Experience => format!(
			"\n\n*(truncated, full experience ID: {})*",
			metadata_display(metadata, "id", "unknown")
		),
		_ => "\n\n*(truncated)*".to_owned(),
	};

	(format!("{truncated}...{note}"), true)
}

fn metadata_display(metadata: &Map<String, Value>, key: &str, fallback: &str) -> String {
	match metadata.get(key) {
		Some(Value::String(text)) => text.clone(),
		Some(Value::Number(number)) => number.to_string(),
		_ => fallback.to_owned(),
	}
}
