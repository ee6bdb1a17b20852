//! Client-side dual-window rate limiting.
//!
//! Each [`RateLimiter`] tracks a burst window and a sustain window per [`Direction`]. A call is
//! admitted only when both windows of its direction have headroom, and admission reserves a slot
//! in both windows under the same lock so concurrent callers cannot oversubscribe the budget.
//! Reservations are handed out as [`RateLimitPermit`]s that give the slot back when dropped
//! uncommitted (a cancelled or failed call does not consume budget).

mod config;
mod window;

pub use config::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use time::PrimitiveDateTime;
// self
use crate::{_prelude::*, obs, ratelimit::window::SlidingWindow};

/// Result of a non-reserving admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The call may proceed immediately.
	Allow,
	/// The call should be delayed.
	Delay(RetryDirective),
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Window occupancy for one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitUsage {
	/// Reserved calls inside the burst window.
	pub burst: usize,
	/// Reserved calls inside the sustain window.
	pub sustain: usize,
}

/// Burst + sustain limiter for one API surface.
#[derive(Debug)]
pub struct RateLimiter {
	config: RateLimitConfig,
	windows: Mutex<Windows>,
	next_id: AtomicU64,
}
impl RateLimiter {
	/// Creates a limiter after validating the configuration.
	pub fn new(config: RateLimitConfig) -> Result<Self> {
		config.validate()?;

		let windows = Windows {
			read: DirectionWindows::new(&config, Direction::Read),
			write: DirectionWindows::new(&config, Direction::Write),
		};

		Ok(Self { config, windows: Mutex::new(windows), next_id: AtomicU64::new(0) })
	}

	/// Configuration the limiter was built with.
	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}

	/// Reserves a slot now or fails with [`Error::RateLimitExceeded`].
	pub fn try_acquire(&self, direction: Direction) -> Result<RateLimitPermit<'_>> {
		self.try_acquire_at(direction, OffsetDateTime::now_utc())
	}

	/// Reserves a slot at `now`; the clock must not run backwards between calls.
	pub fn try_acquire_at(
		&self,
		direction: Direction,
		now: OffsetDateTime,
	) -> Result<RateLimitPermit<'_>> {
		let mut windows = self.windows.lock();
		let state = windows.get_mut(direction);

		state.prune(now);

		if !state.has_headroom() {
			let retry_after = state.reset_after(now);

			drop(windows);
			obs::record_rate_limited(direction);

			return Err(Error::RateLimitExceeded { direction, retry_after });
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		state.burst.push(now, id);
		state.sustain.push(now, id);

		Ok(RateLimitPermit { limiter: self, direction, id, committed: false })
	}

	/// Reserves and immediately commits a slot, returning whether the call was admitted.
	pub fn admit(&self, direction: Direction) -> bool {
		self.try_acquire(direction).map(RateLimitPermit::commit).is_ok()
	}

	/// Non-reserving admission check.
	pub fn evaluate(&self, direction: Direction) -> RateLimitDecision {
		self.evaluate_at(direction, OffsetDateTime::now_utc())
	}

	/// Non-reserving admission check at `now`.
	pub fn evaluate_at(&self, direction: Direction, now: OffsetDateTime) -> RateLimitDecision {
		let mut windows = self.windows.lock();
		let state = windows.get_mut(direction);

		state.prune(now);

		if state.has_headroom() {
			return RateLimitDecision::Allow;
		}

		let backoff = state.reset_after(now);
		let exhausted = state.exhausted_period();

		RateLimitDecision::Delay(
			RetryDirective::new(
				now.checked_add(backoff).unwrap_or(PrimitiveDateTime::MAX.assume_utc()),
				backoff,
			)
				.with_reason(format!("{} {direction} window exhausted", exhausted.as_str())),
		)
	}

	/// Time until the most constraining exhausted window frees a slot; zero when admissible.
	pub fn reset_after(&self, direction: Direction) -> Duration {
		self.reset_after_at(direction, OffsetDateTime::now_utc())
	}

	/// [`reset_after`](Self::reset_after) evaluated at `now`.
	pub fn reset_after_at(&self, direction: Direction, now: OffsetDateTime) -> Duration {
		let mut windows = self.windows.lock();
		let state = windows.get_mut(direction);

		state.prune(now);
		state.reset_after(now)
	}

	/// Current window occupancy for `direction`.
	pub fn usage(&self, direction: Direction) -> RateLimitUsage {
		self.usage_at(direction, OffsetDateTime::now_utc())
	}

	/// Window occupancy for `direction` at `now`.
	pub fn usage_at(&self, direction: Direction, now: OffsetDateTime) -> RateLimitUsage {
		let mut windows = self.windows.lock();
		let state = windows.get_mut(direction);

		state.prune(now);

		RateLimitUsage { burst: state.burst.len(), sustain: state.sustain.len() }
	}

	fn release(&self, direction: Direction, id: u64) {
		let mut windows = self.windows.lock();
		let state = windows.get_mut(direction);

		state.burst.remove(id);
		state.sustain.remove(id);
	}
}

/// Reservation of one slot in both windows of a direction.
///
/// Dropping an uncommitted permit returns the slot; [`commit`](Self::commit) keeps it.
#[must_use = "dropping the permit releases the reservation"]
#[derive(Debug)]
pub struct RateLimitPermit<'a> {
	limiter: &'a RateLimiter,
	direction: Direction,
	id: u64,
	committed: bool,
}
impl RateLimitPermit<'_> {
	/// Direction the slot was reserved for.
	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// Keeps the reservation: the call reached the service.
	pub fn commit(mut self) {
		self.committed = true;
	}
}
impl Drop for RateLimitPermit<'_> {
	fn drop(&mut self) {
		if !self.committed {
			self.limiter.release(self.direction, self.id);
		}
	}
}

#[derive(Debug)]
struct Windows {
	read: DirectionWindows,
	write: DirectionWindows,
}
impl Windows {
	fn get_mut(&mut self, direction: Direction) -> &mut DirectionWindows {
		match direction {
			Direction::Read => &mut self.read,
			Direction::Write => &mut self.write,
		}
	}
}

#[derive(Debug)]
struct DirectionWindows {
	burst: SlidingWindow,
	sustain: SlidingWindow,
}
impl DirectionWindows {
	fn new(config: &RateLimitConfig, direction: Direction) -> Self {
		Self {
			burst: SlidingWindow::new(
				config.limit(TimePeriod::Burst, direction),
				config.period(TimePeriod::Burst),
			),
			sustain: SlidingWindow::new(
				config.limit(TimePeriod::Sustain, direction),
				config.period(TimePeriod::Sustain),
			),
		}
	}

	fn prune(&mut self, now: OffsetDateTime) {
		self.burst.prune(now);
		self.sustain.prune(now);
	}

	fn has_headroom(&self) -> bool {
		self.burst.has_headroom() && self.sustain.has_headroom()
	}

	fn reset_after(&self, now: OffsetDateTime) -> Duration {
		self.burst.reset_after(now).max(self.sustain.reset_after(now))
	}

	fn exhausted_period(&self) -> TimePeriod {
		if self.sustain.has_headroom() { TimePeriod::Burst } else { TimePeriod::Sustain }
	}
}
