use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize};

/// The number of milliseconds since the [`UNIX_EPOCH`].
///
/// - Internally represented by a non-negative [`i64`] to ease
///   interoperability with the mobile platforms we embed in, which don't
///   support unsigned ints.
/// - Can represent any time from January 1st, 1970 00:00:00.000 UTC to
///   roughly 292 million years in the future.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
)]
pub struct TimestampMs(i64);

impl TimestampMs {
    pub const MIN: Self = TimestampMs(0);

    /// Creates a new [`TimestampMs`] from the current [`SystemTime`].
    ///
    /// Panics if the current time is not within bounds.
    pub fn now() -> Self {
        Self::try_from(SystemTime::now()).unwrap()
    }

    /// Returns the contained [`i64`].
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<TimestampMs> for SystemTime {
    fn from(timestamp: TimestampMs) -> Self {
        let millis = u64::try_from(timestamp.0)
            .expect("Non-negative invariant was violated");
        UNIX_EPOCH + Duration::from_millis(millis)
    }
}

impl TryFrom<SystemTime> for TimestampMs {
    type Error = anyhow::Error;
    fn try_from(system_time: SystemTime) -> anyhow::Result<Self> {
        let millis = system_time
            .duration_since(UNIX_EPOCH)
            .context("Time is before January 1st, 1970")?
            .as_millis();
        let millis = i64::try_from(millis)
            .context("Time is more than 292 million years past epoch")?;
        Ok(Self(millis))
    }
}

impl TryFrom<i64> for TimestampMs {
    type Error = anyhow::Error;
    fn try_from(inner: i64) -> anyhow::Result<Self> {
        if inner >= 0 {
            Ok(Self(inner))
        } else {
            Err(anyhow::anyhow!("Timestamp must be non-negative"))
        }
    }
}

impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let inner = i64::deserialize(deserializer)?;
        Self::try_from(inner).map_err(de::Error::custom)
    }
}

#[cfg(any(test, feature = "test-utils"))]
mod arbitrary_impl {
    use proptest::{
        arbitrary::Arbitrary,
        strategy::{BoxedStrategy, Strategy},
    };

    use super::*;

    impl Arbitrary for TimestampMs {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (0i64..=i64::MAX).prop_map(TimestampMs).boxed()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_negative() {
        serde_json::from_str::<TimestampMs>("-1").unwrap_err();
        assert_eq!(
            serde_json::from_str::<TimestampMs>("0").unwrap(),
            TimestampMs::MIN,
        );
    }

    #[test]
    fn system_time_roundtrip() {
        let now = TimestampMs::now();
        let via_system_time =
            TimestampMs::try_from(SystemTime::from(now)).unwrap();
        assert_eq!(now, via_system_time);
    }
}
