mod assemble;
mod cluster;
mod collections;
mod observe;
mod search;
mod values;

pub use assemble::{ContextRequest, PremortemRequest};
pub use cluster::{ClusterInfo, ClusterMember};
pub use observe::{
	AbandonObservationRequest, Ack, AckStatus, ResolveObservationRequest, StartObservationRequest,
	UpdateObservationRequest,
};
pub use search::{
	CodeSearchRequest, CommitSearchRequest, ExperienceSearchRequest, MemorySearchRequest,
	SearchMode, ValueSearchRequest,
};
pub use values::{StoreValueRequest, ValidationOutcome};

use std::{collections::HashSet, fmt, future::Future, pin::Pin, sync::Arc};

use tokio::sync::Mutex;

use norn_config::{Config, EmbeddingProviderConfig};
use norn_domain::Error as DomainError;
use norn_providers::embedding;
use norn_storage::{CollectionKind, VectorStore};

pub type ServiceResult<T> = Result<T, ServiceError>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self::new(Arc::new(DefaultProviders))
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

#[derive(Debug)]
pub enum ServiceError {
	Domain(DomainError),
	InvalidRequest { message: String },
	Embedding { message: String },
	Storage { message: String },
}
impl fmt::Display for ServiceError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Domain(err) => write!(f, "{err}"),
			Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
			Self::Embedding { message } => write!(f, "Embedding provider error: {message}"),
			Self::Storage { message } => write!(f, "Storage error: {message}"),
		}
	}
}
impl std::error::Error for ServiceError {}
impl From<DomainError> for ServiceError {
	fn from(err: DomainError) -> Self {
		Self::Domain(err)
	}
}
impl From<norn_domain::ContractViolation> for ServiceError {
	fn from(err: norn_domain::ContractViolation) -> Self {
		Self::Domain(DomainError::Contract(err))
	}
}
impl From<norn_storage::Error> for ServiceError {
	fn from(err: norn_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Embedding { message: err.to_string() }
	}
}

#[derive(Clone)]
pub struct NornService {
	pub cfg: Config,
	pub store: Arc<dyn VectorStore>,
	pub providers: Providers,
	ready_collections: Arc<Mutex<HashSet<String>>>,
	observation: Arc<Mutex<observe::ObservationState>>,
}
impl NornService {
	pub fn new(cfg: Config, store: Arc<dyn VectorStore>) -> Self {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn VectorStore>, providers: Providers) -> Self {
		Self {
			cfg,
			store,
			providers,
			ready_collections: Arc::new(Mutex::new(HashSet::new())),
			observation: Arc::new(Mutex::new(observe::ObservationState::default())),
		}
	}

	fn embedding_for(&self, kind: CollectionKind) -> &EmbeddingProviderConfig {
		match kind {
			CollectionKind::Code => &self.cfg.embedding.code,
			_ => &self.cfg.embedding.semantic,
		}
	}

	async fn embed_one(
		&self,
		cfg: &EmbeddingProviderConfig,
		text: &str,
	) -> ServiceResult<Vec<f32>> {
		let texts = [text.to_owned()];
		let mut vectors = self.providers.embedding.embed(cfg, &texts).await?;

		if vectors.is_empty() {
			return Err(ServiceError::Embedding {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		}

		let vector = vectors.swap_remove(0);

		if vector.len() != cfg.dimensions as usize {
			return Err(ServiceError::Embedding {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}

	async fn embed_all(
		&self,
		cfg: &EmbeddingProviderConfig,
		texts: &[String],
	) -> ServiceResult<Vec<Vec<f32>>> {
		let vectors = self.providers.embedding.embed(cfg, texts).await?;

		if vectors.len() != texts.len() {
			return Err(ServiceError::Embedding {
				message: format!(
					"Embedding provider returned {} vectors for {} inputs.",
					vectors.len(),
					texts.len()
				),
			});
		}
		if vectors.iter().any(|vector| vector.len() != cfg.dimensions as usize) {
			return Err(ServiceError::Embedding {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vectors)
	}
}
