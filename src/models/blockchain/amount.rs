use std::fmt::Display;
use std::iter::Sum;
use std::ops::Add;
use std::ops::AddAssign;

use num_traits::Zero;
use serde::Deserialize;
use serde::Serialize;

/// An amount of native currency, in indivisible base units.
///
/// All wallet arithmetic is checked; an overflowing sum of wallet outputs
/// indicates corrupted input data, not a representable balance.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn to_base_units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.checked_add(rhs)
            .expect("amount addition must not overflow")
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}

impl Zero for Amount {
    fn zero() -> Self {
        Self(0)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_and_checked_arithmetic() {
        let amounts = [Amount::from(10), Amount::from(32), Amount::from(0)];
        assert_eq!(Amount::from(42), amounts.into_iter().sum());

        assert_eq!(None, Amount::from(u64::MAX).checked_add(Amount::from(1)));
        assert_eq!(None, Amount::from(1).checked_sub(Amount::from(2)));
        assert_eq!(
            Amount::zero(),
            Amount::from(1).saturating_sub(Amount::from(2))
        );
    }
}
