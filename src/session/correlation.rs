//! `MS-CV` correlation vector.

// std
use std::sync::atomic::{AtomicU32, Ordering};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

/// Correlation vector attached to every dispatched request as `MS-CV: <base>.<n>`.
///
/// The base is 16 random bytes in unpadded base64 (22 characters); `n` starts at 1 and grows by
/// one per request.
#[derive(Debug)]
pub struct CorrelationVector {
	base: String,
	counter: AtomicU32,
}
impl CorrelationVector {
	/// Creates a vector with a random base.
	pub fn new() -> Self {
		Self::with_base(STANDARD_NO_PAD.encode(rand::random::<[u8; 16]>()))
	}

	/// Creates a vector with a caller-chosen base (for example one received from upstream).
	pub fn with_base(base: impl Into<String>) -> Self {
		Self { base: base.into(), counter: AtomicU32::new(0) }
	}

	/// Base shared by every value this vector produces.
	pub fn base(&self) -> &str {
		&self.base
	}

	/// Current value without advancing.
	pub fn value(&self) -> String {
		format!("{}.{}", self.base, self.counter.load(Ordering::Acquire))
	}

	/// Advances the vector and returns the new value.
	pub fn increment(&self) -> String {
		let n = self.counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

		format!("{}.{n}", self.base)
	}
}
impl Default for CorrelationVector {
	fn default() -> Self {
		Self::new()
	}
}
