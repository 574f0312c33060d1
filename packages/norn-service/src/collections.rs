use norn_storage::{Axis, CollectionKind};

use crate::{NornService, ServiceResult};

impl NornService {
	/// Creates the collection on first use and remembers it, so repeat calls
	/// skip the storage round trip. Safe to race: creation is idempotent.
	pub(crate) async fn ensure_ready(&self, kind: CollectionKind) -> ServiceResult<()> {
		let spec = kind.spec(&self.cfg.embedding);

		{
			let ready = self.ready_collections.lock().await;

			if ready.contains(&spec.name) {
				return Ok(());
			}
		}

		self.store.ensure_collection(&spec).await?;

		let mut ready = self.ready_collections.lock().await;

		ready.insert(spec.name);

		Ok(())
	}

	pub async fn ensure_all_collections(&self) -> ServiceResult<()> {
		for kind in [
			CollectionKind::Memories,
			CollectionKind::Code,
			CollectionKind::Commits,
			CollectionKind::Values,
		] {
			self.ensure_ready(kind).await?;
		}
		for axis in Axis::ALL {
			self.ensure_ready(CollectionKind::Experiences(axis)).await?;
		}

		Ok(())
	}
}
