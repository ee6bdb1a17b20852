//! Windows FILETIME: 100-nanosecond ticks since 1601-01-01T00:00:00Z.

// self
use crate::{_prelude::*, error::SignatureError};

/// Ticks between the FILETIME epoch (1601) and the Unix epoch (1970).
pub const UNIX_EPOCH_TICKS: i128 = 116_444_736_000_000_000;

const NANOS_PER_TICK: i128 = 100;

/// FILETIME value carried in the `Signature` header, big-endian on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(u64);
impl FileTime {
	/// Wraps a raw tick count.
	pub const fn from_ticks(ticks: u64) -> Self {
		Self(ticks)
	}

	/// Converts a UTC instant, truncating toward the earlier 100 ns tick.
	pub fn from_datetime(instant: OffsetDateTime) -> Result<Self, SignatureError> {
		let ticks = instant.unix_timestamp_nanos().div_euclid(NANOS_PER_TICK) + UNIX_EPOCH_TICKS;

		u64::try_from(ticks).map(Self).map_err(|_| SignatureError::TimestampOutOfRange)
	}

	/// Raw tick count.
	pub const fn ticks(self) -> u64 {
		self.0
	}

	/// Converts back to a UTC instant.
	pub fn to_datetime(self) -> Result<OffsetDateTime, SignatureError> {
		let nanos = (i128::from(self.0) - UNIX_EPOCH_TICKS) * NANOS_PER_TICK;

		OffsetDateTime::from_unix_timestamp_nanos(nanos)
			.map_err(|_| SignatureError::TimestampOutOfRange)
	}

	/// Network-order bytes.
	pub const fn to_be_bytes(self) -> [u8; 8] {
		self.0.to_be_bytes()
	}

	/// Decodes network-order bytes.
	pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
		Self(u64::from_be_bytes(bytes))
	}
}
impl TryFrom<OffsetDateTime> for FileTime {
	type Error = SignatureError;

	fn try_from(instant: OffsetDateTime) -> Result<Self, Self::Error> {
		Self::from_datetime(instant)
	}
}
