//! Collection registry: every named collection, its embedding space, and
//! the text fields keyword search scans.

use norn_domain::{Error as DomainError, Result as DomainResult};

pub const MEMORIES: &str = "memories";
pub const CODE_UNITS: &str = "code_units";
pub const COMMITS: &str = "commits";
pub const VALUES: &str = "values";
pub const GHAP_FULL: &str = "ghap_full";
pub const GHAP_STRATEGY: &str = "ghap_strategy";
pub const GHAP_SURPRISE: &str = "ghap_surprise";
pub const GHAP_ROOT_CAUSE: &str = "ghap_root_cause";

/// One of the four text projections an observation is embedded under.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Axis {
	Full,
	Strategy,
	Surprise,
	RootCause,
}
impl Axis {
	pub const ALL: [Self; 4] = [Self::Full, Self::Strategy, Self::Surprise, Self::RootCause];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Full => "full",
			Self::Strategy => "strategy",
			Self::Surprise => "surprise",
			Self::RootCause => "root_cause",
		}
	}

	pub fn collection_name(&self) -> &'static str {
		match self {
			Self::Full => GHAP_FULL,
			Self::Strategy => GHAP_STRATEGY,
			Self::Surprise => GHAP_SURPRISE,
			Self::RootCause => GHAP_ROOT_CAUSE,
		}
	}

	pub fn parse(value: &str) -> DomainResult<Self> {
		Self::ALL.into_iter().find(|axis| axis.as_str() == value).ok_or_else(|| {
			DomainError::UnknownVariant {
				what: "axis",
				value: value.to_owned(),
				valid: Self::ALL.map(|axis| axis.as_str()).join(", "),
			}
		})
	}
}

/// A searchable collection kind. The searcher itself is kind-agnostic;
/// everything kind-specific lives here.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CollectionKind {
	Memories,
	Code,
	Commits,
	Values,
	Experiences(Axis),
}
impl CollectionKind {
	pub fn collection_name(&self) -> &'static str {
		match self {
			Self::Memories => MEMORIES,
			Self::Code => CODE_UNITS,
			Self::Commits => COMMITS,
			Self::Values => VALUES,
			Self::Experiences(axis) => axis.collection_name(),
		}
	}

	/// Code units live in the code-embedding space; every other collection
	/// uses the semantic model.
	pub fn dimensions(&self, embedding: &norn_config::Embedding) -> u32 {
		match self {
			Self::Code => embedding.code.dimensions,
			_ => embedding.semantic.dimensions,
		}
	}

	/// Payload fields keyword search scores against.
	pub fn keyword_fields(&self) -> &'static [&'static str] {
		match self {
			Self::Memories => &["content"],
			Self::Code => &["code", "qualified_name", "docstring"],
			Self::Commits => &["message"],
			Self::Values => &["text"],
			Self::Experiences(Axis::Surprise) =>
				&["goal", "hypothesis", "action", "prediction", "outcome_result", "surprise"],
			Self::Experiences(_) =>
				&["goal", "hypothesis", "action", "prediction", "outcome_result"],
		}
	}

	pub fn spec(&self, embedding: &norn_config::Embedding) -> CollectionSpec {
		CollectionSpec {
			name: self.collection_name().to_owned(),
			dimensions: self.dimensions(embedding),
		}
	}
}

/// What a collection must look like when it is first created.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CollectionSpec {
	pub name: String,
	pub dimensions: u32,
}
