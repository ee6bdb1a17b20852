// std
use std::{sync::Arc, thread};
// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use xbl_core::{
	error::Error,
	ratelimit::{Direction, LimitSpec, RateLimitConfig, RateLimitDecision, RateLimiter},
};

const START: OffsetDateTime = macros::datetime!(2025-05-01 08:00 UTC);

fn limiter(burst: u32, sustain: u32) -> RateLimiter {
	RateLimiter::new(RateLimitConfig::new(burst, sustain)).expect("Limiter config should validate.")
}

#[test]
fn burst_then_sustain_ceiling() {
	let limiter = limiter(10, 30);
	let mut now = START;

	for _ in 0..10 {
		limiter.try_acquire_at(Direction::Read, now).expect("Burst has headroom.").commit();
	}

	let err = limiter
		.try_acquire_at(Direction::Read, now)
		.map(|permit| permit.commit())
		.expect_err("The eleventh call exceeds the burst.");

	assert!(err.retry_after().is_some_and(|retry| retry.is_positive()));

	let mut admitted = 10;

	while admitted < 30 {
		now += Duration::seconds(16);

		for _ in 0..10 {
			limiter.try_acquire_at(Direction::Read, now).expect("New burst window.").commit();
		}

		admitted += 10;
	}

	now += Duration::seconds(16);

	assert!(matches!(
		limiter.try_acquire_at(Direction::Read, now).map(|permit| permit.commit()),
		Err(Error::RateLimitExceeded { direction: Direction::Read, .. })
	));
	assert!(matches!(
		limiter.evaluate_at(Direction::Read, now),
		RateLimitDecision::Delay(ref directive) if directive.recommended_backoff.is_positive()
	));
	assert!(limiter.try_acquire_at(Direction::Write, now).is_ok());
}

#[test]
fn concurrent_callers_never_oversubscribe() {
	let limiter = Arc::new(limiter(25, 100));
	let handles = (0..8)
		.map(|_| {
			let limiter = limiter.clone();

			thread::spawn(move || {
				(0..10)
					.filter(|_| {
						limiter.try_acquire_at(Direction::Write, START).map(|permit| permit.commit()).is_ok()
					})
					.count()
			})
		})
		.collect::<Vec<_>>();
	let admitted = handles
		.into_iter()
		.map(|handle| handle.join().expect("Worker thread should not panic."))
		.sum::<usize>();

	assert_eq!(admitted, 25);
	assert_eq!(limiter.usage_at(Direction::Write, START).burst, 25);
}

#[tokio::test]
async fn cancelled_call_returns_its_reservation() {
	let limiter = Arc::new(limiter(1, 5));
	let holder = limiter.clone();
	let task = tokio::spawn(async move {
		let _permit = holder.try_acquire(Direction::Read).expect("First reservation fits.");

		std::future::pending::<()>().await;
	});

	tokio::task::yield_now().await;

	while limiter.usage(Direction::Read).burst == 0 && !task.is_finished() {
		tokio::task::yield_now().await;
	}

	task.abort();

	let _ = task.await;

	assert_eq!(limiter.usage(Direction::Read).burst, 0);
	assert!(limiter.admit(Direction::Read));
}

#[test]
fn config_deserializes_uniform_and_split_limits() {
	let config: RateLimitConfig = serde_json::from_str(
		r#"{ "burst": { "read": 10, "write": 3 }, "sustain": 30, "burst_period": 15 }"#,
	)
	.expect("Config should deserialize.");

	assert_eq!(config.burst, LimitSpec::split(10, 3));
	assert_eq!(config.sustain, LimitSpec::from(30));
	assert_eq!(config.burst_period, Duration::seconds(15));
	assert_eq!(config.sustain_period, Duration::seconds(300));

	let limiter = RateLimiter::new(config).expect("Deserialized config should validate.");

	for _ in 0..3 {
		assert!(limiter.admit(Direction::Write));
	}

	assert!(!limiter.admit(Direction::Write));
	assert!(limiter.admit(Direction::Read));
}

#[test]
fn config_with_unbounded_sustain_period_is_refused() {
	let config: RateLimitConfig =
		serde_json::from_str(r#"{ "burst": 10, "sustain": 30, "sustain_period": 9000000000000 }"#)
			.expect("Config should deserialize.");

	assert!(matches!(RateLimiter::new(config), Err(Error::Config(_))));
}
