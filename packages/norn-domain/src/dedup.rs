//! Duplicate removal for merged context items.
//!
//! Two passes: exact identity via a per-item key (stable ids beat content
//! hashes), then a fuzzy pass that collapses near-identical short texts.
//! When two items collide the higher-relevance one survives.

use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
};

use crate::context::ContextItem;

/// Minimum similarity for the fuzzy pass to call two texts duplicates.
pub const SIMILARITY_THRESHOLD: f64 = 0.9;
/// Texts longer than this skip the fuzzy pass entirely.
pub const MAX_FUZZY_CONTENT_LENGTH: usize = 1000;

pub fn deduplicate_items(items: Vec<ContextItem>) -> Vec<ContextItem> {
	if items.is_empty() {
		return items;
	}

	// Insertion-ordered so the fuzzy scan sees candidates oldest-first.
	let mut seen = Vec::<(String, ContextItem)>::new();

	for item in items {
		let key = dedup_key(&item);

		if let Some(position) = seen.iter().position(|(existing, _)| *existing == key) {
			if item.relevance > seen[position].1.relevance {
				seen[position].1 = item;
			}

			continue;
		}

		match find_fuzzy_duplicate(&item, &seen) {
			Some(position) => {
				if item.relevance > seen[position].1.relevance {
					seen.remove(position);
					seen.push((key, item));
				}
			},
			None => seen.push((key, item)),
		}
	}

	let mut deduplicated = seen.into_iter().map(|(_, item)| item).collect::<Vec<_>>();

	deduplicated.sort_by(|a, b| {
		b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal)
	});

	deduplicated
}

/// Identity key for an item, preferring stable upstream ids over content.
fn dedup_key(item: &ContextItem) -> String {
	if let Some(ghap_id) = non_empty(item.metadata_str("ghap_id")) {
		return format!("ghap:{ghap_id}");
	}
	if let Some(file_path) = non_empty(item.metadata_str("file_path")) {
		return format!("file:{file_path}");
	}
	if let Some(sha) = non_empty(item.metadata_str("sha")) {
		return format!("commit:{sha}");
	}
	if let Some(id) = non_empty(item.metadata_str("id")) {
		return format!("memory:{id}");
	}

	let mut hasher = DefaultHasher::new();

	item.content.hash(&mut hasher);

	format!("content:{}", hasher.finish())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.filter(|text| !text.is_empty())
}

fn find_fuzzy_duplicate(item: &ContextItem, seen: &[(String, ContextItem)]) -> Option<usize> {
	let item_len = item.content.chars().count();

	if item_len > MAX_FUZZY_CONTENT_LENGTH {
		return None;
	}

	let min_len = (item_len as f64 * 0.8) as usize;
	let max_len = (item_len as f64 * 1.2) as usize;

	for (position, (_, candidate)) in seen.iter().enumerate() {
		let candidate_len = candidate.content.chars().count();

		if candidate_len < min_len || candidate_len > max_len {
			continue;
		}
		if candidate_len > MAX_FUZZY_CONTENT_LENGTH {
			continue;
		}
		if similarity(&item.content, &candidate.content) >= SIMILARITY_THRESHOLD {
			return Some(position);
		}
	}

	None
}

/// Normalized edit-distance similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
	let a = a.chars().collect::<Vec<_>>();
	let b = b.chars().collect::<Vec<_>>();
	let longest = a.len().max(b.len());

	if longest == 0 {
		return 1.;
	}

	1. - edit_distance(&a, &b) as f64 / longest as f64
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
	if a.is_empty() {
		return b.len();
	}
	if b.is_empty() {
		return a.len();
	}

	let mut previous = (0..=b.len()).collect::<Vec<_>>();
	let mut current = vec![0_usize; b.len() + 1];

	for (row, &left) in a.iter().enumerate() {
		current[0] = row + 1;

		for (column, &right) in b.iter().enumerate() {
			let substitution = previous[column] + usize::from(left != right);
			let insertion = current[column] + 1;
			let deletion = previous[column + 1] + 1;

			current[column + 1] = substitution.min(insertion).min(deletion);
		}

		std::mem::swap(&mut previous, &mut current);
	}

	previous[b.len()]
}
