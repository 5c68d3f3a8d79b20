use std::{fmt, iter::Sum, ops::Add};

use serde::{de, Deserialize, Deserializer, Serialize};

/// A non-negative wallet amount in minor units (e.g. paise or cents).
///
/// Serialized as a plain integer. Arithmetic is checked; amounts never go
/// negative and never silently overflow.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize,
)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Amount(0);

    /// The number of minor units in one whole currency unit.
    pub const UNITS_PER_WHOLE: i64 = 100;

    /// Creates an [`Amount`] from minor units. Returns `None` if negative.
    pub fn from_minor_units(units: i64) -> Option<Self> {
        (units >= 0).then_some(Self(units))
    }

    /// Creates an [`Amount`] from whole currency units.
    pub fn from_whole(whole: u32) -> Self {
        Self(i64::from(whole) * Self::UNITS_PER_WHOLE)
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).and_then(Self::from_minor_units)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("Amount overflow")
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

/// Formats as a decimal with two fractional digits, e.g. `"1234.50"`.
/// Currency symbols are the UI layer's concern.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::UNITS_PER_WHOLE;
        let frac = self.0 % Self::UNITS_PER_WHOLE;
        write!(f, "{whole}.{frac:02}")
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let units = i64::deserialize(deserializer)?;
        Self::from_minor_units(units)
            .ok_or_else(|| de::Error::custom("Amount must be non-negative"))
    }
}

#[cfg(any(test, feature = "test-utils"))]
mod arbitrary_impl {
    use proptest::{
        arbitrary::Arbitrary,
        strategy::{BoxedStrategy, Strategy},
    };

    use super::*;

    impl Arbitrary for Amount {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (0i64..=i64::MAX).prop_map(Amount).boxed()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formatting() {
        assert_eq!(Amount::from_whole(0).to_string(), "0.00");
        assert_eq!(Amount::from_minor_units(5).unwrap().to_string(), "0.05");
        assert_eq!(
            Amount::from_minor_units(123_450).unwrap().to_string(),
            "1234.50",
        );
    }

    #[test]
    fn rejects_negative() {
        assert!(Amount::from_minor_units(-1).is_none());
        serde_json::from_str::<Amount>("-1").unwrap_err();
    }

    #[test]
    fn checked_sub_never_goes_negative() {
        let one = Amount::from_whole(1);
        let two = Amount::from_whole(2);
        assert_eq!(one.checked_sub(two), None);
        assert_eq!(two.checked_sub(one), Some(one));
    }
}
