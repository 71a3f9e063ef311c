//! Asset amounts and prices.
//!
//! Two assets exist: the core asset and the stable asset settled against it.
//! Amounts are raw integer units with three decimal places of precision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw units per whole token.
pub const AMOUNT_UNIT: u64 = 1_000;

/// The two chain assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    Core,
    Stable,
}

impl Asset {
    pub const ALL: [Asset; 2] = [Asset::Core, Asset::Stable];

    /// The asset an amount of `self` converts into.
    pub fn counterpart(self) -> Asset {
        match self {
            Asset::Core => Asset::Stable,
            Asset::Stable => Asset::Core,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Core => f.write_str("CORE"),
            Asset::Stable => f.write_str("STBL"),
        }
    }
}

/// An amount of a single asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub amount: u64,
    pub asset: Asset,
}

impl Amount {
    pub fn new(amount: u64, asset: Asset) -> Self {
        Self { amount, asset }
    }

    pub fn core(amount: u64) -> Self {
        Self::new(amount, Asset::Core)
    }

    pub fn stable(amount: u64) -> Self {
        Self::new(amount, Asset::Stable)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Checked addition; `None` on overflow or asset mismatch.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        if self.asset != other.asset {
            return None;
        }
        Some(Amount::new(self.amount.checked_add(other.amount)?, self.asset))
    }

    /// Checked subtraction; `None` on underflow or asset mismatch.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        if self.asset != other.asset {
            return None;
        }
        Some(Amount::new(self.amount.checked_sub(other.amount)?, self.asset))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:03} {}",
            self.amount / AMOUNT_UNIT,
            self.amount % AMOUNT_UNIT,
            self.asset
        )
    }
}

/// An exchange rate between the two assets, as a base/quote pair.
///
/// A price is well-formed when both sides are non-zero and the assets
/// differ. Comparison is by cross-multiplied ratio, so feeds can be sorted
/// to find a median without losing precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub base: Amount,
    pub quote: Amount,
}

impl Price {
    pub fn new(base: Amount, quote: Amount) -> Self {
        Self { base, quote }
    }

    pub fn is_valid(&self) -> bool {
        self.base.amount > 0 && self.quote.amount > 0 && self.base.asset != self.quote.asset
    }

    /// Convert an amount of the base asset into the quote asset (or the
    /// reverse), rounding down. Returns `None` for an asset not on either
    /// side of the price or on overflow.
    pub fn convert(&self, input: Amount) -> Option<Amount> {
        if input.asset == self.base.asset {
            let out = (input.amount as u128)
                .checked_mul(self.quote.amount as u128)?
                .checked_div(self.base.amount as u128)?;
            Some(Amount::new(u64::try_from(out).ok()?, self.quote.asset))
        } else if input.asset == self.quote.asset {
            let out = (input.amount as u128)
                .checked_mul(self.base.amount as u128)?
                .checked_div(self.quote.amount as u128)?;
            Some(Amount::new(u64::try_from(out).ok()?, self.base.asset))
        } else {
            None
        }
    }

    /// Ratio comparison key: quote per unit base, cross-multiplied.
    fn cmp_key(&self, other: &Price) -> std::cmp::Ordering {
        let lhs = (self.quote.amount as u128) * (other.base.amount as u128);
        let rhs = (other.quote.amount as u128) * (self.base.amount as u128);
        lhs.cmp(&rhs)
    }

    /// The median of a set of feeds, all quoted the same way round.
    /// Returns `None` for an empty set.
    pub fn median(mut feeds: Vec<Price>) -> Option<Price> {
        if feeds.is_empty() {
            return None;
        }
        feeds.sort_by(|a, b| a.cmp_key(b));
        Some(feeds[feeds.len() / 2])
    }
}
