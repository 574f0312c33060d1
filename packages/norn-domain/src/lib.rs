pub mod context;
pub mod dedup;
pub mod ghap;
pub mod result;
pub mod timestamp;
pub mod tokens;

mod error;

pub use context::{
	ContextItem, FormattedContext, SourceKind, assemble_markdown, assemble_premortem_markdown,
	parse_context_types, valid_context_types,
};
pub use dedup::deduplicate_items;
pub use error::{ContractViolation, Error, Result};
pub use ghap::{
	ConfidenceTier, Domain, GhapEntry, HistoryEntry, Lesson, Outcome, OutcomeStatus, Resolution,
	Revision, RootCause, Strategy,
};
pub use result::{
	CodeResult, CommitResult, ExperienceResult, MemoryResult, SearchResult, ValueResult,
};
pub use tokens::{cap_item_tokens, distribute_budget, estimate_tokens, truncate_to_tokens};
