//! Burst/sustain budget declarations per API surface.

// crates.io
use oauth2::http::Method;
// self
use crate::{_prelude::*, error::ConfigError};

/// Traffic direction; read and write budgets are tracked independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
	/// Calls that only fetch state.
	Read,
	/// Calls that mutate state.
	Write,
}
impl Direction {
	/// Returns a stable label suitable for span, metric, or error fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Direction::Read => "read",
			Direction::Write => "write",
		}
	}

	/// Default direction for an HTTP method: `GET`, `HEAD`, and `OPTIONS` read; the rest write.
	pub fn from_method(method: &Method) -> Self {
		if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
			Direction::Read
		} else {
			Direction::Write
		}
	}
}
impl Display for Direction {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Window a limit applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimePeriod {
	/// Short window absorbing bursts.
	Burst,
	/// Long window bounding sustained traffic.
	Sustain,
}
impl TimePeriod {
	/// Default burst window length.
	pub const DEFAULT_BURST: Duration = Duration::seconds(15);
	/// Default sustain window length.
	pub const DEFAULT_SUSTAIN: Duration = Duration::seconds(300);
	/// Longest accepted window length.
	pub const MAX: Duration = Duration::days(1);

	/// Returns a stable label suitable for span, metric, or error fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TimePeriod::Burst => "burst",
			TimePeriod::Sustain => "sustain",
		}
	}
}

/// Call count for one window: either shared by both directions or split.
///
/// Deserializes from `10` or `{ "read": 10, "write": 3 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitSpec {
	/// Same count for read and write.
	Uniform(u32),
	/// Separate counts.
	Split {
		/// Read budget.
		read: u32,
		/// Write budget.
		write: u32,
	},
}
impl LimitSpec {
	/// Separate read and write counts.
	pub const fn split(read: u32, write: u32) -> Self {
		Self::Split { read, write }
	}

	/// Count applying to `direction`.
	pub const fn for_direction(self, direction: Direction) -> u32 {
		match (self, direction) {
			(Self::Uniform(count), _) => count,
			(Self::Split { read, .. }, Direction::Read) => read,
			(Self::Split { write, .. }, Direction::Write) => write,
		}
	}
}
impl From<u32> for LimitSpec {
	fn from(count: u32) -> Self {
		Self::Uniform(count)
	}
}

/// Budget for one API surface, fixed for the lifetime of its limiter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Calls admitted per burst window.
	pub burst: LimitSpec,
	/// Calls admitted per sustain window.
	pub sustain: LimitSpec,
	/// Burst window length, in whole seconds on the wire.
	#[serde(default = "default_burst_period", with = "seconds")]
	pub burst_period: Duration,
	/// Sustain window length, in whole seconds on the wire.
	#[serde(default = "default_sustain_period", with = "seconds")]
	pub sustain_period: Duration,
}
impl RateLimitConfig {
	/// Creates a config with the default 15 s burst and 300 s sustain windows.
	pub fn new(burst: impl Into<LimitSpec>, sustain: impl Into<LimitSpec>) -> Self {
		Self {
			burst: burst.into(),
			sustain: sustain.into(),
			burst_period: TimePeriod::DEFAULT_BURST,
			sustain_period: TimePeriod::DEFAULT_SUSTAIN,
		}
	}

	/// Overrides both window lengths.
	pub fn with_periods(mut self, burst: Duration, sustain: Duration) -> Self {
		self.burst_period = burst;
		self.sustain_period = sustain;

		self
	}

	/// Limit for a window and direction.
	pub const fn limit(&self, period: TimePeriod, direction: Direction) -> u32 {
		match period {
			TimePeriod::Burst => self.burst.for_direction(direction),
			TimePeriod::Sustain => self.sustain.for_direction(direction),
		}
	}

	/// Length of a window.
	pub const fn period(&self, period: TimePeriod) -> Duration {
		match period {
			TimePeriod::Burst => self.burst_period,
			TimePeriod::Sustain => self.sustain_period,
		}
	}

	/// Rejects zero limits and window lengths outside `(0, TimePeriod::MAX]`.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for period in [TimePeriod::Burst, TimePeriod::Sustain] {
			let length = self.period(period);

			if !length.is_positive() {
				return Err(ConfigError::InvalidRateLimit {
					reason: format!("{} period must be positive", period.as_str()),
				});
			}
			if length > TimePeriod::MAX {
				return Err(ConfigError::InvalidRateLimit {
					reason: format!(
						"{} period must not exceed {} seconds",
						period.as_str(),
						TimePeriod::MAX.whole_seconds()
					),
				});
			}

			for direction in [Direction::Read, Direction::Write] {
				if self.limit(period, direction) == 0 {
					return Err(ConfigError::InvalidRateLimit {
						reason: format!("{} {direction} limit must be non-zero", period.as_str()),
					});
				}
			}
		}

		Ok(())
	}
}

fn default_burst_period() -> Duration {
	TimePeriod::DEFAULT_BURST
}

fn default_sustain_period() -> Duration {
	TimePeriod::DEFAULT_SUSTAIN
}

mod seconds {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
