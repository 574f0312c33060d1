pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("collection {name} does not exist.")]
	CollectionNotFound { name: String },
	#[error("vector store request failed: {message}")]
	Backend { message: String },
	#[error("point {id} has no vector but the caller requires one.")]
	MissingVector { id: String },
}
