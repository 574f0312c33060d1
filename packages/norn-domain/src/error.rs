//! Domain error types.

pub use thiserror::Error as ThisError;

/// A stored payload broke the schema this crate expects.
///
/// Every variant names the offending field so callers can log or surface
/// something actionable instead of a bare lookup panic.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ContractViolation {
	#[error("payload field `{field}` is missing; expected {expected}.")]
	MissingField { field: &'static str, expected: &'static str },
	#[error("payload field `{field}` is malformed; expected {expected}, found {found}.")]
	MalformedField { field: &'static str, expected: &'static str, found: String },
}

#[derive(Debug, ThisError)]
pub enum Error {
	#[error(transparent)]
	Contract(#[from] ContractViolation),
	#[error("invalid context type '{requested}'. Valid types: {valid}.")]
	InvalidContextType { requested: String, valid: String },
	#[error("invalid search mode '{requested}'. Valid modes: {valid}.")]
	InvalidSearchMode { requested: String, valid: String },
	#[error("max_tokens must be between 1 and {ceiling}, got {requested}.")]
	BudgetOutOfRange { requested: usize, ceiling: usize },
	#[error("an observation is already active: {active_id}. Resolve or abandon it first.")]
	ObservationActive { active_id: String },
	#[error("no active observation to {action}.")]
	NoActiveObservation { action: &'static str },
	#[error("entry {id} is unresolved; resolve it before persisting.")]
	Unresolved { id: String },
	#[error("not enough experiences to cluster axis '{axis}': found {found}, need at least {needed}.")]
	ClusterUnavailable { axis: String, found: u64, needed: u64 },
	#[error("unknown {what} '{value}'. Valid values: {valid}.")]
	UnknownVariant { what: &'static str, value: String, valid: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
