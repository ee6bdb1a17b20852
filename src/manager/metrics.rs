// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::auth::TokenKind;

/// Thread-safe counters for refresh sequences and identity-endpoint calls.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	identity_calls: [AtomicU64; TokenKind::ALL.len()],
}
impl RefreshMetrics {
	/// Returns the number of refresh sequences started (login included).
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of sequences that produced a complete chain.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of sequences that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how many requests were sent for `step` (the OAuth2 token endpoint included).
	pub fn identity_calls(&self, step: TokenKind) -> u64 {
		self.identity_calls[slot(step)].load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_identity_call(&self, step: TokenKind) {
		self.identity_calls[slot(step)].fetch_add(1, Ordering::Relaxed);
	}
}

const fn slot(step: TokenKind) -> usize {
	match step {
		TokenKind::OAuth => 0,
		TokenKind::Device => 1,
		TokenKind::Title => 2,
		TokenKind::User => 3,
		TokenKind::Xsts => 4,
	}
}
