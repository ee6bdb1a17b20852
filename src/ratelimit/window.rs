//! Sliding-log window holding the admission instants of reserved calls.

// std
use std::collections::VecDeque;
// self
use crate::_prelude::*;

#[derive(Debug)]
pub(crate) struct SlidingWindow {
	limit: usize,
	period: Duration,
	log: VecDeque<(OffsetDateTime, u64)>,
}
impl SlidingWindow {
	pub(crate) fn new(limit: u32, period: Duration) -> Self {
		let limit = usize::try_from(limit).unwrap_or(usize::MAX);

		Self { limit, period, log: VecDeque::with_capacity(limit.min(64)) }
	}

	/// Drops entries that left the window. Entries exactly `period` old are gone.
	pub(crate) fn prune(&mut self, now: OffsetDateTime) {
		while self
			.log
			.front()
			.is_some_and(|(at, _)| at.checked_add(self.period).is_some_and(|end| end <= now))
		{
			self.log.pop_front();
		}
	}

	pub(crate) fn has_headroom(&self) -> bool {
		self.log.len() < self.limit
	}

	/// Time until the oldest entry expires, or zero when a slot is free.
	pub(crate) fn reset_after(&self, now: OffsetDateTime) -> Duration {
		if self.has_headroom() {
			return Duration::ZERO;
		}

		match self.log.front() {
			Some((at, _)) => match at.checked_add(self.period) {
				Some(end) => (end - now).max(Duration::ZERO),
				None => Duration::MAX,
			},
			None => Duration::ZERO,
		}
	}

	/// Log stays sorted as long as callers pass non-decreasing instants.
	pub(crate) fn push(&mut self, now: OffsetDateTime, id: u64) {
		let at = self.log.back().map_or(now, |(last, _)| now.max(*last));

		self.log.push_back((at, id));
	}

	pub(crate) fn remove(&mut self, id: u64) {
		if let Some(pos) = self.log.iter().position(|(_, entry)| *entry == id) {
			self.log.remove(pos);
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.log.len()
	}
}
