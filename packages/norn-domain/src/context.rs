//! Context items and markdown rendering.
//!
//! Every retrieval source renders to a [`ContextItem`]: a pre-formatted
//! markdown fragment plus the payload it came from. Items from different
//! sources are merged, deduplicated, budgeted, and finally assembled into a
//! single document.

use std::{
	collections::BTreeMap,
	hash::{Hash, Hasher},
};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
	error::{Error, Result},
	result::{CodeResult, CommitResult, ExperienceResult, MemoryResult, ValueResult},
	timestamp,
};

/// Number of leading characters of `content` that participate in an item's
/// hash. Equality still compares the full content.
const HASH_PREFIX_CHARS: usize = 100;

/// Where a context item came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
	Memory,
	Code,
	Experience,
	Value,
	Commit,
}
impl SourceKind {
	/// Canonical order; also the order budget ties are broken in.
	pub const ALL: [Self; 5] =
		[Self::Memory, Self::Code, Self::Experience, Self::Value, Self::Commit];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
			Self::Code => "code",
			Self::Experience => "experience",
			Self::Value => "value",
			Self::Commit => "commit",
		}
	}

	/// The plural request-facing name, e.g. `memories`.
	pub fn context_type(&self) -> &'static str {
		match self {
			Self::Memory => "memories",
			Self::Code => "code",
			Self::Experience => "experiences",
			Self::Value => "values",
			Self::Commit => "commits",
		}
	}

	pub fn section_title(&self) -> &'static str {
		match self {
			Self::Memory => "Memories",
			Self::Code => "Code",
			Self::Experience => "Experiences",
			Self::Value => "Values",
			Self::Commit => "Commits",
		}
	}

	pub fn from_context_type(context_type: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.context_type() == context_type)
	}
}

pub fn valid_context_types() -> String {
	SourceKind::ALL.map(|kind| kind.context_type()).join(", ")
}

/// Parses request-facing type names, failing fast on the first unknown one.
pub fn parse_context_types(context_types: &[String]) -> Result<Vec<SourceKind>> {
	context_types
		.iter()
		.map(|context_type| {
			SourceKind::from_context_type(context_type).ok_or_else(|| Error::InvalidContextType {
				requested: context_type.clone(),
				valid: valid_context_types(),
			})
		})
		.collect()
}

/// One formatted fragment of assembled context.
///
/// Identity is `(source, content)`; relevance and metadata do not
/// participate, so the same fragment reached via two queries compares equal.
#[derive(Clone, Debug, Serialize)]
pub struct ContextItem {
	pub source: SourceKind,
	pub content: String,
	pub relevance: f32,
	pub metadata: Map<String, Value>,
}
impl ContextItem {
	pub fn from_memory(result: &MemoryResult) -> Self {
		Self {
			source: SourceKind::Memory,
			content: format_memory(result),
			relevance: result.score,
			metadata: with_id(result.to_payload(), &result.id),
		}
	}

	pub fn from_code(result: &CodeResult) -> Self {
		Self {
			source: SourceKind::Code,
			content: format_code(result),
			relevance: result.score,
			metadata: with_id(result.to_payload(), &result.id),
		}
	}

	pub fn from_experience(result: &ExperienceResult) -> Self {
		Self {
			source: SourceKind::Experience,
			content: format_experience(result),
			relevance: result.score,
			metadata: with_id(result.to_payload(), &result.id),
		}
	}

	pub fn from_value(result: &ValueResult) -> Self {
		Self {
			source: SourceKind::Value,
			content: format_value(result),
			relevance: result.score,
			metadata: with_id(result.to_payload(), &result.id),
		}
	}

	pub fn from_commit(result: &CommitResult) -> Self {
		Self {
			source: SourceKind::Commit,
			content: format_commit(result),
			relevance: result.score,
			metadata: with_id(result.to_payload(), &result.id),
		}
	}

	pub fn metadata_str(&self, key: &str) -> Option<&str> {
		self.metadata.get(key).and_then(Value::as_str)
	}
}
impl PartialEq for ContextItem {
	fn eq(&self, other: &Self) -> bool {
		self.source == other.source && self.content == other.content
	}
}
impl Eq for ContextItem {}
impl Hash for ContextItem {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.source.hash(state);

		let mut chars = 0_usize;

		for ch in self.content.chars().take(HASH_PREFIX_CHARS) {
			ch.hash(state);

			chars += 1;
		}

		// Items sharing a prefix but differing in length still hash apart.
		(chars + self.content.chars().skip(HASH_PREFIX_CHARS).count()).hash(state);
	}
}

fn with_id(mut payload: Map<String, Value>, id: &str) -> Map<String, Value> {
	payload.insert("id".into(), id.into());

	payload
}

/// Final assembled document plus everything a caller needs to judge it.
#[derive(Clone, Debug, Serialize)]
pub struct FormattedContext {
	pub markdown: String,
	pub items: Vec<ContextItem>,
	pub token_count: usize,
	pub sources_used: BTreeMap<String, usize>,
	pub budget_exceeded: bool,
	pub truncated_items: Vec<String>,
}

pub fn format_memory(result: &MemoryResult) -> String {
	format!(
		"**Memory**: {}\n*Category: {}, Importance: {:.2}*",
		result.content, result.category, result.importance
	)
}

pub fn format_code(result: &CodeResult) -> String {
	let mut formatted = format!(
		"**{}** `{}` in `{}:{}`\n",
		capitalize(&result.unit_type),
		result.qualified_name,
		result.file_path,
		result.line_start
	);

	formatted.push_str(&format!("```{}\n{}\n", result.language, result.code));

	if let Some(docstring) = result.docstring.as_deref().filter(|docstring| !docstring.is_empty()) {
		formatted.push_str(&format!("\"\"\"{docstring}\"\"\"\n"));
	}

	formatted.push_str("```");

	formatted
}

pub fn format_experience(result: &ExperienceResult) -> String {
	let mut formatted = format!("**Experience**: {} | {}\n", result.domain, result.strategy);

	formatted.push_str(&format!("- **Goal**: {}\n", result.goal));
	formatted.push_str(&format!("- **Hypothesis**: {}\n", result.hypothesis));
	formatted.push_str(&format!("- **Action**: {}\n", result.action));
	formatted.push_str(&format!("- **Prediction**: {}\n", result.prediction));
	formatted.push_str(&format!(
		"- **Outcome**: {} - {}\n",
		result.outcome_status, result.outcome_result
	));

	if let Some(surprise) = result.surprise.as_deref().filter(|surprise| !surprise.is_empty()) {
		formatted.push_str(&format!("- **Surprise**: {surprise}\n"));
	}
	if let Some(lesson) = &result.lesson {
		formatted.push_str(&format!("- **Lesson**: {}\n", lesson.what_worked));
	}

	formatted
}

pub fn format_value(result: &ValueResult) -> String {
	format!(
		"**Value** ({}, cluster size: {}):\n{}",
		result.axis, result.member_count, result.text
	)
}

pub fn format_commit(result: &CommitResult) -> String {
	let sha = result.sha.chars().take(7).collect::<String>();
	let mut formatted = format!(
		"**Commit** `{sha}` by {} on {}\n{}\n",
		result.author,
		timestamp::to_rfc3339(result.committed_at),
		result.message
	);

	if !result.files_changed.is_empty() {
		let mut file_list =
			result.files_changed.iter().take(3).cloned().collect::<Vec<_>>().join(", ");

		if result.files_changed.len() > 3 {
			file_list.push_str(&format!(", ... ({} more)", result.files_changed.len() - 3));
		}

		formatted.push_str(&format!("*Files: {file_list}*"));
	}

	formatted
}

/// Renders the standard grouped document. Sections appear in the order
/// given; empty sections are skipped.
pub fn assemble_markdown(sections: &[(SourceKind, Vec<ContextItem>)]) -> String {
	let mut parts = vec!["# Context\n".to_owned()];
	let mut total_items = 0_usize;
	let mut source_count = 0_usize;

	for (kind, items) in sections {
		if items.is_empty() {
			continue;
		}

		parts.push(format!("\n## {}\n", kind.section_title()));

		for item in items {
			parts.push(format!("\n{}\n", item.content));

			total_items += 1;
		}

		source_count += 1;
	}

	parts.push(format!("\n---\n*{total_items} items from {source_count} sources*"));

	parts.join("\n")
}

/// Axis names paired with their premortem section titles, in render order.
pub const PREMORTEM_SECTIONS: [(&str, &str); 4] = [
	("full", "Common Failures"),
	("strategy", "Strategy Performance"),
	("surprise", "Unexpected Outcomes"),
	("root_cause", "Root Causes to Watch"),
];

/// Renders the failure-focused premortem document. Experience items are
/// grouped by their `axis` metadata into the [`PREMORTEM_SECTIONS`] order.
pub fn assemble_premortem_markdown(
	domain: &str,
	strategy: Option<&str>,
	experiences: &[ContextItem],
	values: &[ContextItem],
) -> String {
	let mut header = format!("# Premortem: {domain}");

	if let Some(strategy) = strategy {
		header.push_str(&format!(" with {strategy}"));
	}

	header.push('\n');

	let mut parts = vec![header];
	let mut experience_count = 0_usize;

	for (axis, title) in PREMORTEM_SECTIONS {
		let axis_items = experiences
			.iter()
			.filter(|item| item.metadata_str("axis") == Some(axis))
			.collect::<Vec<_>>();

		if axis_items.is_empty() {
			continue;
		}

		parts.push(format!("\n## {title}\n"));

		for item in axis_items {
			parts.push(format!("\n{}\n", item.content));

			experience_count += 1;
		}
	}

	if !values.is_empty() {
		parts.push("\n## Relevant Principles\n".to_owned());

		for item in values {
			parts.push(format!("\n{}\n", item.content));
		}
	}

	parts.push(format!("\n---\n*Based on {experience_count} past experiences*"));

	parts.join("\n")
}

fn capitalize(text: &str) -> String {
	let mut chars = text.chars();

	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
		None => String::new(),
	}
}
