//! American-odds conversions.
//!
//! American prices quote a favourite as the (negative) stake needed to win
//! 100 and an underdog as the (positive) profit on a 100 stake. A price of
//! zero has no meaning and is rejected.
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::market::BetSide;
use crate::error::{EngineError, EngineResult};

/// Price assumed for a spread or total when the market price is unknown and
/// the caller's policy allows a default.
pub const DEFAULT_PRICE: i32 = -110;

/// Implied probability of an American price (vig included).
///
/// `+150` → 0.40, `-150` → 0.60, `+100`/`-100` → 0.50.
pub fn american_to_implied_prob(price: i32) -> EngineResult<f64> {
    if price == 0 {
        return Err(EngineError::InvalidOdds(price));
    }
    let p = price as f64;
    if price > 0 {
        Ok(100.0 / (p + 100.0))
    } else {
        Ok(p.abs() / (p.abs() + 100.0))
    }
}

/// Profit (not total return) of a winning `wager` at `price`. Unrounded.
pub fn american_payout(price: i32, wager: Decimal) -> EngineResult<Decimal> {
    if price == 0 {
        return Err(EngineError::InvalidOdds(price));
    }
    if price > 0 {
        Ok(wager * Decimal::from(price) / dec!(100))
    } else {
        Ok(wager * dec!(100) / Decimal::from(price.unsigned_abs()))
    }
}

/// Where the price used for a payout came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    #[default]
    Market,
    Assumed,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Market => "market",
            PriceSource::Assumed => "assumed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market" => Some(PriceSource::Market),
            "assumed" => Some(PriceSource::Assumed),
            _ => None,
        }
    }
}

/// Caller decision on what to do when a market price is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePolicy {
    /// Missing price is an error.
    Strict,
    /// Missing price is replaced by this price and flagged as assumed.
    DefaultTo(i32),
}

impl Default for PricePolicy {
    fn default() -> Self {
        PricePolicy::DefaultTo(DEFAULT_PRICE)
    }
}

impl PricePolicy {
    /// Resolve the price for `side`, validating whichever price is used.
    pub fn resolve(&self, quoted: Option<i32>, side: BetSide) -> EngineResult<(i32, PriceSource)> {
        let (price, source) = match (quoted, self) {
            (Some(p), _) => (p, PriceSource::Market),
            (None, PricePolicy::DefaultTo(p)) => (*p, PriceSource::Assumed),
            (None, PricePolicy::Strict) => return Err(EngineError::MissingOddsPrice { side }),
        };
        if price == 0 {
            return Err(EngineError::InvalidOdds(price));
        }
        Ok((price, source))
    }
}
