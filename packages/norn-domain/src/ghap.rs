//! Observation entries: goal/hypothesis/action/prediction records with a
//! resolved outcome, revision history, and a confidence tier.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::format_description};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest text accepted for any observation field. Longer inputs are
/// clipped rather than rejected so a verbose caller never loses the entry.
pub const MAX_FIELD_CHARS: usize = 10_000;

/// Work domain an observation belongs to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
	Debugging,
	Refactoring,
	Feature,
	Testing,
	Configuration,
	Documentation,
	Performance,
	Security,
	Integration,
}
impl Domain {
	pub const ALL: [Self; 9] = [
		Self::Debugging,
		Self::Refactoring,
		Self::Feature,
		Self::Testing,
		Self::Configuration,
		Self::Documentation,
		Self::Performance,
		Self::Security,
		Self::Integration,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Debugging => "debugging",
			Self::Refactoring => "refactoring",
			Self::Feature => "feature",
			Self::Testing => "testing",
			Self::Configuration => "configuration",
			Self::Documentation => "documentation",
			Self::Performance => "performance",
			Self::Security => "security",
			Self::Integration => "integration",
		}
	}

	pub fn parse(value: &str) -> Result<Self> {
		Self::ALL.into_iter().find(|domain| domain.as_str() == value).ok_or_else(|| {
			Error::UnknownVariant {
				what: "domain",
				value: value.to_owned(),
				valid: join(Self::ALL.iter().map(Self::as_str)),
			}
		})
	}
}

/// Approach taken while working the observation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
	SystematicElimination,
	TrialAndError,
	ResearchFirst,
	DivideAndConquer,
	RootCauseAnalysis,
	CopyFromSimilar,
	CheckAssumptions,
	ReadTheError,
	AskUser,
}
impl Strategy {
	pub const ALL: [Self; 9] = [
		Self::SystematicElimination,
		Self::TrialAndError,
		Self::ResearchFirst,
		Self::DivideAndConquer,
		Self::RootCauseAnalysis,
		Self::CopyFromSimilar,
		Self::CheckAssumptions,
		Self::ReadTheError,
		Self::AskUser,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::SystematicElimination => "systematic-elimination",
			Self::TrialAndError => "trial-and-error",
			Self::ResearchFirst => "research-first",
			Self::DivideAndConquer => "divide-and-conquer",
			Self::RootCauseAnalysis => "root-cause-analysis",
			Self::CopyFromSimilar => "copy-from-similar",
			Self::CheckAssumptions => "check-assumptions",
			Self::ReadTheError => "read-the-error",
			Self::AskUser => "ask-user",
		}
	}

	pub fn parse(value: &str) -> Result<Self> {
		Self::ALL.into_iter().find(|strategy| strategy.as_str() == value).ok_or_else(|| {
			Error::UnknownVariant {
				what: "strategy",
				value: value.to_owned(),
				valid: join(Self::ALL.iter().map(Self::as_str)),
			}
		})
	}
}

/// How an observation ended.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
	Confirmed,
	Falsified,
	Abandoned,
}
impl OutcomeStatus {
	pub const ALL: [Self; 3] = [Self::Confirmed, Self::Falsified, Self::Abandoned];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Confirmed => "confirmed",
			Self::Falsified => "falsified",
			Self::Abandoned => "abandoned",
		}
	}

	pub fn parse(value: &str) -> Result<Self> {
		Self::ALL.into_iter().find(|status| status.as_str() == value).ok_or_else(|| {
			Error::UnknownVariant {
				what: "outcome status",
				value: value.to_owned(),
				valid: join(Self::ALL.iter().map(Self::as_str)),
			}
		})
	}
}

/// Evidence quality of a resolved observation, used to weight it during
/// value formation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
	Gold,
	Silver,
	Bronze,
	Abandoned,
}
impl ConfidenceTier {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Gold => "gold",
			Self::Silver => "silver",
			Self::Bronze => "bronze",
			Self::Abandoned => "abandoned",
		}
	}

	pub fn weight(&self) -> f32 {
		match self {
			Self::Gold => 1.,
			Self::Silver => 0.8,
			Self::Bronze => 0.5,
			Self::Abandoned => 0.2,
		}
	}
}

/// Clustering weight for a stored tier string. Unknown or missing tiers sit
/// between bronze and silver rather than dropping the point.
pub fn tier_weight(tier: Option<&str>) -> f32 {
	match tier {
		Some("gold") => ConfidenceTier::Gold.weight(),
		Some("silver") => ConfidenceTier::Silver.weight(),
		Some("bronze") => ConfidenceTier::Bronze.weight(),
		Some("abandoned") => ConfidenceTier::Abandoned.weight(),
		_ => 0.5,
	}
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootCause {
	pub category: String,
	pub description: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Lesson {
	pub what_worked: String,
	pub takeaway: String,
}

/// Snapshot of the hypothesis/action/prediction triple before a revision.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HistoryEntry {
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	pub hypothesis: String,
	pub action: String,
	pub prediction: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Outcome {
	pub status: OutcomeStatus,
	pub result: String,
	#[serde(with = "time::serde::rfc3339")]
	pub captured_at: OffsetDateTime,
	pub auto_captured: bool,
}

/// One observation, from start through revisions to resolution.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GhapEntry {
	pub id: String,
	pub session_id: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	pub domain: Domain,
	pub strategy: Strategy,
	pub goal: String,
	pub hypothesis: String,
	pub action: String,
	pub prediction: String,
	pub outcome: Option<Outcome>,
	pub surprise: Option<String>,
	pub root_cause: Option<RootCause>,
	pub lesson: Option<Lesson>,
	pub confidence_tier: Option<ConfidenceTier>,
	pub iteration_count: u32,
	pub history: Vec<HistoryEntry>,
	pub notes: Vec<String>,
}
impl GhapEntry {
	#[allow(clippy::too_many_arguments)]
	pub fn start(
		id: String,
		session_id: String,
		created_at: OffsetDateTime,
		domain: Domain,
		strategy: Strategy,
		goal: &str,
		hypothesis: &str,
		action: &str,
		prediction: &str,
	) -> Self {
		Self {
			id,
			session_id,
			created_at,
			domain,
			strategy,
			goal: clip_text(goal),
			hypothesis: clip_text(hypothesis),
			action: clip_text(action),
			prediction: clip_text(prediction),
			outcome: None,
			surprise: None,
			root_cause: None,
			lesson: None,
			confidence_tier: None,
			iteration_count: 1,
			history: Vec::new(),
			notes: Vec::new(),
		}
	}

	pub fn is_resolved(&self) -> bool {
		self.outcome.is_some()
	}

	/// Applies a revision. The previous hypothesis/action/prediction triple
	/// is archived and the iteration count bumped only when one of the three
	/// actually changes; strategy swaps and notes alone do not count as an
	/// iteration.
	pub fn revise(&mut self, revision: Revision, now: OffsetDateTime) -> bool {
		let hypothesis = revision.hypothesis.as_deref().map(clip_text);
		let action = revision.action.as_deref().map(clip_text);
		let prediction = revision.prediction.as_deref().map(clip_text);
		let changed = hypothesis.as_ref().is_some_and(|new| *new != self.hypothesis)
			|| action.as_ref().is_some_and(|new| *new != self.action)
			|| prediction.as_ref().is_some_and(|new| *new != self.prediction);

		if changed {
			self.history.push(HistoryEntry {
				timestamp: now,
				hypothesis: self.hypothesis.clone(),
				action: self.action.clone(),
				prediction: self.prediction.clone(),
			});

			if let Some(hypothesis) = hypothesis {
				self.hypothesis = hypothesis;
			}
			if let Some(action) = action {
				self.action = action;
			}
			if let Some(prediction) = prediction {
				self.prediction = prediction;
			}

			self.iteration_count += 1;
		}
		if let Some(strategy) = revision.strategy {
			self.strategy = strategy;
		}
		if let Some(note) = revision.note {
			self.notes.push(clip_text(&note));
		}

		changed
	}

	/// Resolves the entry and derives its confidence tier.
	pub fn resolve(&mut self, resolution: Resolution, now: OffsetDateTime) {
		let outcome = Outcome {
			status: resolution.status,
			result: clip_text(&resolution.result),
			captured_at: now,
			auto_captured: resolution.auto_captured,
		};

		self.confidence_tier = Some(confidence_tier_for(&outcome));
		self.surprise = resolution.surprise.as_deref().map(clip_text);
		self.root_cause = resolution.root_cause;
		self.lesson = resolution.lesson;
		self.outcome = Some(outcome);
	}
}

/// Partial update for an active entry. Absent fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct Revision {
	pub hypothesis: Option<String>,
	pub action: Option<String>,
	pub prediction: Option<String>,
	pub strategy: Option<Strategy>,
	pub note: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Resolution {
	pub status: OutcomeStatus,
	pub result: String,
	pub surprise: Option<String>,
	pub root_cause: Option<RootCause>,
	pub lesson: Option<Lesson>,
	pub auto_captured: bool,
}

/// Abandoned outcomes always land in the abandoned tier. Everything else is
/// gold when the outcome was captured automatically, silver when reported by
/// the caller.
pub fn confidence_tier_for(outcome: &Outcome) -> ConfidenceTier {
	if outcome.status == OutcomeStatus::Abandoned {
		ConfidenceTier::Abandoned
	} else if outcome.auto_captured {
		ConfidenceTier::Gold
	} else {
		ConfidenceTier::Silver
	}
}

/// Clips to [`MAX_FIELD_CHARS`] characters.
pub fn clip_text(text: &str) -> String {
	if text.chars().count() <= MAX_FIELD_CHARS {
		text.to_owned()
	} else {
		text.chars().take(MAX_FIELD_CHARS).collect()
	}
}

pub fn generate_entry_id(now: OffsetDateTime) -> String {
	format!("ghap_{}", stamp_with_nonce(now))
}

pub fn generate_session_id(now: OffsetDateTime) -> String {
	format!("session_{}", stamp_with_nonce(now))
}

fn stamp_with_nonce(now: OffsetDateTime) -> String {
	let format = format_description!("[year][month][day]_[hour][minute][second]");
	let stamp = now.format(&format).unwrap_or_else(|_| "00000000_000000".to_owned());
	let nonce = Uuid::new_v4().simple().to_string();

	format!("{stamp}_{}", &nonce[..6])
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
	values.collect::<Vec<_>>().join(", ")
}
