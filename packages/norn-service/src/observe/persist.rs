use serde_json::{Map, Value};

use norn_domain::{Error as DomainError, GhapEntry, Outcome, OutcomeStatus, RootCause, timestamp};
use norn_storage::{Axis, CollectionKind, PointRecord};

use super::{Ack, AckStatus};
use crate::{NornService, ServiceResult};

impl NornService {
	/// Writes one resolved entry to every applicable axis collection, one
	/// embedding per axis projection, all under the entry's own id.
	pub async fn persist_entry(&self, entry: &GhapEntry) -> ServiceResult<Ack> {
		let Some(outcome) = &entry.outcome else {
			return Err(DomainError::Unresolved { id: entry.id.clone() }.into());
		};

		let projections = axis_projections(entry, outcome);
		let texts = projections.iter().map(|(_, text)| text.clone()).collect::<Vec<_>>();
		let vectors = self.embed_all(&self.cfg.embedding.semantic, &texts).await?;

		for ((axis, _), vector) in projections.iter().zip(vectors) {
			let kind = CollectionKind::Experiences(*axis);

			self.ensure_ready(kind).await?;

			let record =
				PointRecord::new(entry.id.clone(), vector, axis_payload(entry, outcome, *axis));

			self.store.upsert(kind.collection_name(), vec![record]).await?;

			tracing::info!(id = %entry.id, axis = axis.as_str(), "Persisted observation axis.");
		}

		Ok(Ack { id: entry.id.clone(), status: AckStatus::Persisted })
	}

	/// Checks every entry is resolved before writing any of them.
	pub async fn persist_batch(&self, entries: &[GhapEntry]) -> ServiceResult<Vec<Ack>> {
		for entry in entries {
			if !entry.is_resolved() {
				return Err(DomainError::Unresolved { id: entry.id.clone() }.into());
			}
		}

		let mut acks = Vec::with_capacity(entries.len());

		for entry in entries {
			acks.push(self.persist_entry(entry).await?);
		}

		tracing::info!(count = entries.len(), "Persisted observation batch.");

		Ok(acks)
	}
}

/// Which axes apply and the text each one embeds. Full and strategy always
/// apply; surprise and root-cause only for falsified outcomes, each gated
/// on its own field being recorded.
fn axis_projections(entry: &GhapEntry, outcome: &Outcome) -> Vec<(Axis, String)> {
	let mut projections = vec![
		(Axis::Full, full_projection(entry, outcome)),
		(Axis::Strategy, strategy_projection(entry, outcome)),
	];

	if outcome.status == OutcomeStatus::Falsified {
		if let Some(surprise) = surprise_text(entry) {
			projections.push((Axis::Surprise, surprise_projection(entry, outcome, surprise)));
		}
		if let Some(root_cause) = &entry.root_cause {
			projections.push((Axis::RootCause, root_cause_projection(entry, root_cause)));
		}
	}

	projections
}

fn surprise_text(entry: &GhapEntry) -> Option<&str> {
	entry.surprise.as_deref().filter(|surprise| !surprise.is_empty())
}

fn full_projection(entry: &GhapEntry, outcome: &Outcome) -> String {
	let mut text = format!(
		"Goal: {}\nHypothesis: {}\nAction: {}\nPrediction: {}\nOutcome: {} - {}",
		entry.goal,
		entry.hypothesis,
		entry.action,
		entry.prediction,
		outcome.status.as_str(),
		outcome.result
	);

	if let Some(surprise) = surprise_text(entry) {
		text.push_str(&format!("\nSurprise: {surprise}"));
	}
	if let Some(lesson) = entry.lesson.as_ref().filter(|lesson| !lesson.what_worked.is_empty()) {
		text.push_str(&format!("\nLesson: {}", lesson.what_worked));
	}

	text
}

fn strategy_projection(entry: &GhapEntry, outcome: &Outcome) -> String {
	let mut text = format!(
		"Strategy: {}\nApplied to: {}\nOutcome: {} after {} iteration(s)",
		entry.strategy.as_str(),
		entry.goal,
		outcome.status.as_str(),
		entry.iteration_count
	);

	if let Some(lesson) = entry.lesson.as_ref().filter(|lesson| !lesson.what_worked.is_empty()) {
		text.push_str(&format!("\nWhat worked: {}", lesson.what_worked));
	}

	text
}

fn surprise_projection(entry: &GhapEntry, outcome: &Outcome, surprise: &str) -> String {
	let mut text = format!(
		"Expected: {}\nActual: {}\nSurprise: {surprise}",
		entry.prediction, outcome.result
	);

	if let Some(root_cause) = &entry.root_cause {
		text.push_str(&format!(
			"\nRoot cause: {} - {}",
			root_cause.category, root_cause.description
		));
	}

	text
}

fn root_cause_projection(entry: &GhapEntry, root_cause: &RootCause) -> String {
	format!(
		"Category: {}\nDescription: {}\nContext: {} - {}\nOriginal hypothesis: {}",
		root_cause.category,
		root_cause.description,
		entry.domain.as_str(),
		entry.strategy.as_str(),
		entry.hypothesis
	)
}

fn axis_payload(entry: &GhapEntry, outcome: &Outcome, axis: Axis) -> Map<String, Value> {
	let mut payload = Map::new();

	payload.insert("ghap_id".into(), entry.id.clone().into());
	payload.insert("session_id".into(), entry.session_id.clone().into());
	payload.insert("created_at".into(), timestamp::to_rfc3339(entry.created_at).into());
	payload.insert("captured_at".into(), timestamp::epoch_seconds(outcome.captured_at).into());
	payload.insert("domain".into(), entry.domain.as_str().into());
	payload.insert("strategy".into(), entry.strategy.as_str().into());
	payload.insert("outcome_status".into(), outcome.status.as_str().into());
	payload.insert(
		"confidence_tier".into(),
		match &entry.confidence_tier {
			Some(tier) => tier.as_str().into(),
			None => Value::Null,
		},
	);
	payload.insert("iteration_count".into(), entry.iteration_count.into());
	payload.insert("axis".into(), axis.as_str().into());
	payload.insert("goal".into(), entry.goal.clone().into());
	payload.insert("hypothesis".into(), entry.hypothesis.clone().into());
	payload.insert("action".into(), entry.action.clone().into());
	payload.insert("prediction".into(), entry.prediction.clone().into());
	payload.insert("outcome_result".into(), outcome.result.clone().into());

	if let Some(surprise) = surprise_text(entry) {
		payload.insert("surprise".into(), surprise.into());
	}
	if let Some(root_cause) = &entry.root_cause {
		let mut object = Map::new();

		object.insert("category".into(), root_cause.category.clone().into());
		object.insert("description".into(), root_cause.description.clone().into());
		payload.insert("root_cause".into(), object.into());
	}
	if let Some(lesson) = &entry.lesson {
		let mut object = Map::new();

		object.insert("what_worked".into(), lesson.what_worked.clone().into());
		object.insert("takeaway".into(), lesson.takeaway.clone().into());
		payload.insert("lesson".into(), object.into());
	}

	payload
}
