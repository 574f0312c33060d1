//! Typed search results.
//!
//! Raw vector-store hits carry a free-form payload. Each collection has a
//! schema, and these types are the only path from payload to caller: a hit
//! either parses into its typed result or fails with a [`ContractViolation`]
//! naming the field, never a silent default for required data.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{
	error::ContractViolation,
	ghap::{Lesson, RootCause},
	timestamp,
};

/// One raw hit from a vector store, before schema checks.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
	pub id: String,
	pub score: f32,
	pub payload: Map<String, Value>,
	pub vector: Option<Vec<f32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryResult {
	pub id: String,
	pub score: f32,
	pub category: String,
	pub content: String,
	pub importance: f64,
	pub tags: Vec<String>,
	pub created_at: OffsetDateTime,
	pub verified_at: Option<OffsetDateTime>,
	pub verification_status: Option<String>,
}
impl MemoryResult {
	pub fn from_raw(raw: &SearchResult) -> Result<Self, ContractViolation> {
		let payload = &raw.payload;

		Ok(Self {
			id: raw.id.clone(),
			score: raw.score,
			category: require_str(payload, "category")?,
			content: require_str(payload, "content")?,
			importance: f64_or(payload, "importance", 0.)?,
			tags: string_list(payload, "tags")?,
			created_at: require_timestamp(payload, "created_at")?,
			verified_at: optional_timestamp(payload, "verified_at")?,
			verification_status: optional_str(payload, "verification_status")?,
		})
	}

	pub fn to_payload(&self) -> Map<String, Value> {
		let mut payload = Map::new();

		payload.insert("category".into(), self.category.clone().into());
		payload.insert("content".into(), self.content.clone().into());
		payload.insert("importance".into(), self.importance.into());
		payload.insert("tags".into(), self.tags.clone().into());
		payload.insert("created_at".into(), timestamp::to_rfc3339(self.created_at).into());

		if let Some(verified_at) = self.verified_at {
			payload.insert("verified_at".into(), timestamp::to_rfc3339(verified_at).into());
		}
		if let Some(status) = &self.verification_status {
			payload.insert("verification_status".into(), status.clone().into());
		}

		payload
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeResult {
	pub id: String,
	pub score: f32,
	pub project: String,
	pub file_path: String,
	pub language: String,
	pub unit_type: String,
	pub qualified_name: String,
	pub code: String,
	pub docstring: Option<String>,
	pub line_start: u32,
	pub line_end: u32,
}
impl CodeResult {
	pub fn from_raw(raw: &SearchResult) -> Result<Self, ContractViolation> {
		let payload = &raw.payload;

		Ok(Self {
			id: raw.id.clone(),
			score: raw.score,
			project: require_str(payload, "project")?,
			file_path: require_str(payload, "file_path")?,
			language: require_str(payload, "language")?,
			unit_type: require_str(payload, "unit_type")?,
			qualified_name: require_str(payload, "qualified_name")?,
			code: require_str(payload, "code")?,
			docstring: optional_str(payload, "docstring")?,
			line_start: require_u32(payload, "line_start")?,
			line_end: require_u32(payload, "line_end")?,
		})
	}

	pub fn to_payload(&self) -> Map<String, Value> {
		let mut payload = Map::new();

		payload.insert("project".into(), self.project.clone().into());
		payload.insert("file_path".into(), self.file_path.clone().into());
		payload.insert("language".into(), self.language.clone().into());
		payload.insert("unit_type".into(), self.unit_type.clone().into());
		payload.insert("qualified_name".into(), self.qualified_name.clone().into());
		payload.insert("code".into(), self.code.clone().into());

		if let Some(docstring) = &self.docstring {
			payload.insert("docstring".into(), docstring.clone().into());
		}

		payload.insert("line_start".into(), self.line_start.into());
		payload.insert("line_end".into(), self.line_end.into());

		payload
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExperienceResult {
	pub id: String,
	pub score: f32,
	pub ghap_id: String,
	pub axis: String,
	pub domain: String,
	pub strategy: String,
	pub goal: String,
	pub hypothesis: String,
	pub action: String,
	pub prediction: String,
	pub outcome_status: String,
	pub outcome_result: String,
	pub surprise: Option<String>,
	pub root_cause: Option<RootCause>,
	pub lesson: Option<Lesson>,
	pub confidence_tier: Option<String>,
	pub iteration_count: u32,
	pub created_at: OffsetDateTime,
}
impl ExperienceResult {
	pub fn from_raw(raw: &SearchResult) -> Result<Self, ContractViolation> {
		let payload = &raw.payload;
		let root_cause = match optional_object(payload, "root_cause")? {
			Some(object) => Some(RootCause {
				category: require_str(object, "category")?,
				description: require_str(object, "description")?,
			}),
			None => None,
		};
		let lesson = match optional_object(payload, "lesson")? {
			Some(object) => Some(Lesson {
				what_worked: require_str(object, "what_worked")?,
				takeaway: require_str(object, "takeaway")?,
			}),
			None => None,
		};

		Ok(Self {
			id: raw.id.clone(),
			score: raw.score,
			ghap_id: require_str(payload, "ghap_id")?,
			axis: require_str(payload, "axis")?,
			domain: require_str(payload, "domain")?,
			strategy: require_str(payload, "strategy")?,
			goal: require_str(payload, "goal")?,
			hypothesis: require_str(payload, "hypothesis")?,
			action: require_str(payload, "action")?,
			prediction: require_str(payload, "prediction")?,
			outcome_status: require_str(payload, "outcome_status")?,
			outcome_result: require_str(payload, "outcome_result")?,
			surprise: optional_str(payload, "surprise")?,
			root_cause,
			lesson,
			confidence_tier: optional_str(payload, "confidence_tier")?,
			iteration_count: require_u32(payload, "iteration_count")?,
			created_at: require_timestamp(payload, "created_at")?,
		})
	}

	pub fn to_payload(&self) -> Map<String, Value> {
		let mut payload = Map::new();

		payload.insert("ghap_id".into(), self.ghap_id.clone().into());
		payload.insert("axis".into(), self.axis.clone().into());
		payload.insert("domain".into(), self.domain.clone().into());
		payload.insert("strategy".into(), self.strategy.clone().into());
		payload.insert("goal".into(), self.goal.clone().into());
		payload.insert("hypothesis".into(), self.hypothesis.clone().into());
		payload.insert("action".into(), self.action.clone().into());
		payload.insert("prediction".into(), self.prediction.clone().into());
		payload.insert("outcome_status".into(), self.outcome_status.clone().into());
		payload.insert("outcome_result".into(), self.outcome_result.clone().into());

		if let Some(surprise) = &self.surprise {
			payload.insert("surprise".into(), surprise.clone().into());
		}
		if let Some(root_cause) = &self.root_cause {
			let mut object = Map::new();

			object.insert("category".into(), root_cause.category.clone().into());
			object.insert("description".into(), root_cause.description.clone().into());
			payload.insert("root_cause".into(), object.into());
		}
		if let Some(lesson) = &self.lesson {
			let mut object = Map::new();

			object.insert("what_worked".into(), lesson.what_worked.clone().into());
			object.insert("takeaway".into(), lesson.takeaway.clone().into());
			payload.insert("lesson".into(), object.into());
		}

		match &self.confidence_tier {
			Some(tier) => payload.insert("confidence_tier".into(), tier.clone().into()),
			None => payload.insert("confidence_tier".into(), Value::Null),
		};
		payload.insert("iteration_count".into(), self.iteration_count.into());
		payload.insert("created_at".into(), timestamp::to_rfc3339(self.created_at).into());

		payload
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueResult {
	pub id: String,
	pub score: f32,
	pub axis: String,
	pub cluster_id: String,
	pub text: String,
	pub member_count: u64,
	pub avg_confidence: f64,
	pub created_at: OffsetDateTime,
}
impl ValueResult {
	pub fn from_raw(raw: &SearchResult) -> Result<Self, ContractViolation> {
		let payload = &raw.payload;

		Ok(Self {
			id: raw.id.clone(),
			score: raw.score,
			axis: require_str(payload, "axis")?,
			cluster_id: require_str(payload, "cluster_id")?,
			text: require_str(payload, "text")?,
			member_count: require_u64(payload, "member_count")?,
			avg_confidence: f64_or(payload, "avg_confidence", 0.)?,
			created_at: require_timestamp(payload, "created_at")?,
		})
	}

	pub fn to_payload(&self) -> Map<String, Value> {
		let mut payload = Map::new();

		payload.insert("axis".into(), self.axis.clone().into());
		payload.insert("cluster_id".into(), self.cluster_id.clone().into());
		payload.insert("text".into(), self.text.clone().into());
		payload.insert("member_count".into(), self.member_count.into());
		payload.insert("avg_confidence".into(), self.avg_confidence.into());
		payload.insert("created_at".into(), timestamp::to_rfc3339(self.created_at).into());

		payload
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommitResult {
	pub id: String,
	pub score: f32,
	pub sha: String,
	pub message: String,
	pub author: String,
	pub author_email: String,
	pub committed_at: OffsetDateTime,
	pub files_changed: Vec<String>,
}
impl CommitResult {
	pub fn from_raw(raw: &SearchResult) -> Result<Self, ContractViolation> {
		let payload = &raw.payload;

		Ok(Self {
			id: raw.id.clone(),
			score: raw.score,
			sha: require_str(payload, "sha")?,
			message: require_str(payload, "message")?,
			author: require_str(payload, "author")?,
			author_email: require_str(payload, "author_email")?,
			committed_at: require_timestamp(payload, "committed_at")?,
			files_changed: string_list(payload, "files_changed")?,
		})
	}

	pub fn to_payload(&self) -> Map<String, Value> {
		let mut payload = Map::new();

		payload.insert("sha".into(), self.sha.clone().into());
		payload.insert("message".into(), self.message.clone().into());
		payload.insert("author".into(), self.author.clone().into());
		payload.insert("author_email".into(), self.author_email.clone().into());
		payload.insert("committed_at".into(), timestamp::to_rfc3339(self.committed_at).into());
		payload.insert("files_changed".into(), self.files_changed.clone().into());

		payload
	}
}

fn require_str(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<String, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) =>
			Err(ContractViolation::MissingField { field, expected: "a string" }),
		Some(Value::String(text)) => Ok(text.clone()),
		Some(other) => Err(malformed(field, "a string", other)),
	}
}

fn optional_str(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<Option<String>, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(text)) => Ok(Some(text.clone())),
		Some(other) => Err(malformed(field, "a string", other)),
	}
}

fn f64_or(
	payload: &Map<String, Value>,
	field: &'static str,
	default: f64,
) -> Result<f64, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) => Ok(default),
		Some(Value::Number(number)) =>
			number.as_f64().ok_or_else(|| malformed(field, "a number", &number.clone().into())),
		Some(other) => Err(malformed(field, "a number", other)),
	}
}

fn require_u32(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<u32, ContractViolation> {
	let value = require_u64(payload, field)?;

	u32::try_from(value)
		.map_err(|_| malformed(field, "a 32-bit unsigned integer", &Value::from(value)))
}

fn require_u64(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<u64, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) =>
			Err(ContractViolation::MissingField { field, expected: "an unsigned integer" }),
		Some(Value::Number(number)) => number
			.as_u64()
			.ok_or_else(|| malformed(field, "an unsigned integer", &number.clone().into())),
		Some(other) => Err(malformed(field, "an unsigned integer", other)),
	}
}

fn string_list(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<Vec<String>, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) => Ok(Vec::new()),
		Some(Value::Array(values)) => values
			.iter()
			.map(|value| match value {
				Value::String(text) => Ok(text.clone()),
				other => Err(malformed(field, "a list of strings", other)),
			})
			.collect(),
		Some(other) => Err(malformed(field, "a list of strings", other)),
	}
}

fn require_timestamp(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<OffsetDateTime, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) =>
			Err(ContractViolation::MissingField { field, expected: "a timestamp" }),
		Some(value) => timestamp::parse_timestamp(field, value),
	}
}

fn optional_timestamp(
	payload: &Map<String, Value>,
	field: &'static str,
) -> Result<Option<OffsetDateTime>, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) => Ok(None),
		Some(value) => timestamp::parse_timestamp(field, value).map(Some),
	}
}

fn optional_object<'a>(
	payload: &'a Map<String, Value>,
	field: &'static str,
) -> Result<Option<&'a Map<String, Value>>, ContractViolation> {
	match payload.get(field) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Object(object)) => Ok(Some(object)),
		Some(other) => Err(malformed(field, "an object", other)),
	}
}

fn malformed(field: &'static str, expected: &'static str, found: &Value) -> ContractViolation {
	ContractViolation::MalformedField { field, expected, found: found.to_string() }
}
