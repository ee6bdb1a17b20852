//! Thread-safe in-memory [`SessionStore`] for tests and demos.

// self
use crate::{
	_prelude::*,
	store::{PersistedSession, SessionStore, StoreFuture},
};

/// Keeps the persisted session in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<PersistedSession>>>);
impl MemoryStore {
	/// Creates a store pre-populated with `session`.
	pub fn with_session(session: PersistedSession) -> Self {
		Self(Arc::new(RwLock::new(Some(session))))
	}

	/// Returns a clone of the stored session without going through the async contract.
	pub fn snapshot(&self) -> Option<PersistedSession> {
		self.0.read().clone()
	}
}
impl SessionStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<PersistedSession>> {
		let session = self.snapshot();

		Box::pin(async move { Ok(session) })
	}

	fn save(&self, session: PersistedSession) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.0.write() = Some(session);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.0.write().take();

			Ok(())
		})
	}
}
