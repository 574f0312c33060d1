mod error;

pub use error::{Error, Result};

use std::{
	collections::HashSet,
	env,
	future::Future,
	hash::{DefaultHasher, Hash, Hasher},
	sync::Mutex,
	thread,
	time::Duration,
};

use qdrant_client::Qdrant;
use tokio::{runtime::Builder, time};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Deterministic unit-length embedding for tests. Texts that share tokens
/// get correlated vectors, identical texts get identical vectors, and
/// disjoint texts land near orthogonal.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0_f32; dimensions];

	for token in text.to_lowercase().split_whitespace() {
		let mut hasher = DefaultHasher::new();

		token.hash(&mut hasher);

		let seed = hasher.finish();

		for (index, slot) in vector.iter_mut().enumerate() {
			let mut hasher = DefaultHasher::new();

			(seed, index).hash(&mut hasher);

			if hasher.finish() & 1 == 0 {
				*slot += 1.;
			} else {
				*slot -= 1.;
			}
		}
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0. {
		for slot in &mut vector {
			*slot /= norm;
		}
	} else if dimensions > 0 {
		// Tokenless input still embeds somewhere fixed.
		vector[0] = 1.;
	}

	vector
}

/// Installs an env-filtered fmt subscriber for test output. Safe to call
/// from every test; only the first call in a process wins.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Tracks the Qdrant collections a test creates and deletes them when the
/// test finishes, panicking runs included.
pub struct TestCollections {
	run_id: String,
	cleaned: bool,
	collections: Mutex<HashSet<String>>,
}
impl TestCollections {
	pub fn new() -> Self {
		Self {
			run_id: format!("norn_test_{}", Uuid::new_v4().simple()),
			cleaned: false,
			collections: Mutex::new(HashSet::new()),
		}
	}

	pub fn run_id(&self) -> &str {
		&self.run_id
	}

	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.run_id);
		let mut tracked = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		tracked.insert(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		let collections = {
			let tracked = self.collections.lock().unwrap_or_else(|err| err.into_inner());

			tracked.iter().cloned().collect::<Vec<_>>()
		};

		cleanup_qdrant_collections(&collections).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Default for TestCollections {
	fn default() -> Self {
		Self::new()
	}
}
impl Drop for TestCollections {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let collections = self
			.collections
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.iter()
			.cloned()
			.collect::<Vec<_>>();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test Qdrant cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(cleanup_qdrant_collections(&collections)) {
				eprintln!("Test Qdrant cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("NORN_QDRANT_URL").ok()
}

pub async fn with_test_collections<F, Fut, T>(f: F) -> Result<T>
where
	F: FnOnce(&TestCollections) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let tracker = TestCollections::new();
	let result = f(&tracker).await;
	let mut tracker = tracker;

	if let Err(err) = tracker.cleanup_inner().await {
		eprintln!("Test Qdrant cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

async fn cleanup_qdrant_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(qdrant_url) = env_qdrant_url() else {
		eprintln!("Skipping Qdrant cleanup; set NORN_QDRANT_URL to delete test collections.");

		return Ok(());
	};
	let client = Qdrant::from_url(&qdrant_url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;
	let max_attempts = 6;
	let mut remaining = collections.iter().cloned().collect::<HashSet<_>>();
	let mut backoff = Duration::from_millis(100);

	for attempt in 1..=max_attempts {
		let existing = time::timeout(Duration::from_secs(10), client.list_collections())
			.await
			.map_err(|_| Error::Message("Qdrant list_collections timed out.".to_string()))?
			.map_err(|err| Error::Message(format!("Failed to list Qdrant collections: {err}.")))?;
		let existing = existing.collections.into_iter().map(|c| c.name).collect::<HashSet<_>>();

		remaining.retain(|collection| existing.contains(collection));

		if remaining.is_empty() {
			return Ok(());
		}

		for collection in remaining.iter().cloned().collect::<Vec<_>>() {
			let result = time::timeout(
				Duration::from_secs(10),
				client.delete_collection(collection.clone()),
			)
			.await;

			match result {
				Ok(Ok(_)) => {},
				Ok(Err(err)) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Failed to delete Qdrant collection {collection:?} after {attempt} attempts: {err}."
						)));
					},
				Err(_) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Timed out deleting Qdrant collection {collection:?} after {attempt} attempts."
						)));
					},
			}
		}

		time::sleep(backoff).await;

		backoff = backoff.saturating_mul(2).min(Duration::from_secs(2));
	}

	Ok(())
}
