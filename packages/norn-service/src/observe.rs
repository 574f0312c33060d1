mod persist;

use time::OffsetDateTime;

use norn_domain::{
	Domain, Error as DomainError, GhapEntry, Lesson, OutcomeStatus, Resolution, Revision,
	RootCause, Strategy, ghap,
};

use crate::{NornService, ServiceResult};

/// One observation session: at most one active entry at a time, all entries
/// started through it sharing a session id.
#[derive(Default)]
pub(crate) struct ObservationState {
	session_id: Option<String>,
	active: Option<GhapEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
	Started,
	Updated,
	Resolved,
	Persisted,
	Stored,
}

/// Mutation responses carry the id and what happened, never the record.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Ack {
	pub id: String,
	pub status: AckStatus,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StartObservationRequest {
	pub domain: String,
	pub strategy: String,
	pub goal: String,
	pub hypothesis: String,
	pub action: String,
	pub prediction: String,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct UpdateObservationRequest {
	pub hypothesis: Option<String>,
	pub action: Option<String>,
	pub prediction: Option<String>,
	pub strategy: Option<String>,
	pub note: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ResolveObservationRequest {
	pub outcome: String,
	pub result: String,
	pub surprise: Option<String>,
	pub root_cause: Option<RootCause>,
	pub lesson: Option<Lesson>,
	pub auto_captured: Option<bool>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AbandonObservationRequest {
	pub reason: String,
}

impl NornService {
	pub async fn start_observation(&self, req: StartObservationRequest) -> ServiceResult<Ack> {
		let domain = Domain::parse(&req.domain)?;
		let strategy = Strategy::parse(&req.strategy)?;
		let now = OffsetDateTime::now_utc();
		let mut state = self.observation.lock().await;

		if let Some(active) = &state.active {
			return Err(DomainError::ObservationActive { active_id: active.id.clone() }.into());
		}

		let session_id =
			state.session_id.get_or_insert_with(|| ghap::generate_session_id(now)).clone();
		let entry = GhapEntry::start(
			ghap::generate_entry_id(now),
			session_id,
			now,
			domain,
			strategy,
			&req.goal,
			&req.hypothesis,
			&req.action,
			&req.prediction,
		);
		let id = entry.id.clone();

		tracing::info!(
			id = %id,
			domain = domain.as_str(),
			strategy = strategy.as_str(),
			"Started observation."
		);

		state.active = Some(entry);

		Ok(Ack { id, status: AckStatus::Started })
	}

	pub async fn update_observation(&self, req: UpdateObservationRequest) -> ServiceResult<Ack> {
		let strategy = req.strategy.as_deref().map(Strategy::parse).transpose()?;
		let now = OffsetDateTime::now_utc();
		let mut state = self.observation.lock().await;
		let Some(active) = state.active.as_mut() else {
			return Err(DomainError::NoActiveObservation { action: "update" }.into());
		};
		let revision = Revision {
			hypothesis: req.hypothesis,
			action: req.action,
			prediction: req.prediction,
			strategy,
			note: req.note,
		};
		let iterated = active.revise(revision, now);
		let id = active.id.clone();

		tracing::info!(
			id = %id,
			iterated,
			iteration = active.iteration_count,
			"Updated observation."
		);

		Ok(Ack { id, status: AckStatus::Updated })
	}

	/// Resolves the active entry and persists it across its axis
	/// collections in one step.
	pub async fn resolve_observation(&self, req: ResolveObservationRequest) -> ServiceResult<Ack> {
		let status = OutcomeStatus::parse(&req.outcome)?;
		let resolution = Resolution {
			status,
			result: req.result,
			surprise: req.surprise,
			root_cause: req.root_cause,
			lesson: req.lesson,
			auto_captured: req.auto_captured.unwrap_or(false),
		};
		let now = OffsetDateTime::now_utc();
		let mut state = self.observation.lock().await;
		let Some(active) = state.active.as_mut() else {
			return Err(DomainError::NoActiveObservation { action: "resolve" }.into());
		};

		active.resolve(resolution, now);

		let entry = active.clone();

		// The entry stays active until it lands in storage, so a failed
		// persist can be retried with another resolve call.
		self.persist_entry(&entry).await?;

		state.active = None;

		tracing::info!(id = %entry.id, outcome = status.as_str(), "Resolved observation.");

		Ok(Ack { id: entry.id, status: AckStatus::Resolved })
	}

	pub async fn abandon_observation(&self, req: AbandonObservationRequest) -> ServiceResult<Ack> {
		self.resolve_observation(ResolveObservationRequest {
			outcome: OutcomeStatus::Abandoned.as_str().to_owned(),
			result: req.reason,
			surprise: None,
			root_cause: None,
			lesson: None,
			auto_captured: Some(false),
		})
		.await
	}

	/// Snapshot of the in-flight entry, if any.
	pub async fn active_observation(&self) -> Option<GhapEntry> {
		self.observation.lock().await.active.clone()
	}
}
