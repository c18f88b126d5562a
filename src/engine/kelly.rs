//! Fractional Kelly wager sizing.
//!
//! The edge fed in here is the evaluator's edge (points for spreads/totals,
//! probability for moneylines), weighted by the model confidence:
//!   f = (edge · confidence) / (1 − confidence)      for confidence < 1
//!   f = edge                                         for confidence = 1
//!
//! We apply a *fractional* Kelly multiplier to reduce variance, cap the
//! fraction of bankroll, then map the fraction onto the unit size where a
//! fraction of 0.01 corresponds to one unit.
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fraction of bankroll that corresponds to one unit.
const FRACTION_PER_UNIT: f64 = 0.01;

/// Raw (full) Kelly fraction, clamped to be non-negative.
pub fn kelly_fraction(edge: f64, confidence: f64) -> f64 {
    if !edge.is_finite() || !confidence.is_finite() {
        return 0.0;
    }
    let f = if confidence < 1.0 {
        (edge * confidence) / (1.0 - confidence)
    } else {
        edge
    };
    f.max(0.0)
}

/// Deterministic wager sizer. Holds only the two policy constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellySizer {
    /// Fractional Kelly multiplier (0.25 = quarter Kelly).
    pub multiplier: f64,
    /// Maximum fraction of bankroll on a single bet.
    pub max_fraction: f64,
}

impl Default for KellySizer {
    fn default() -> Self {
        Self {
            multiplier: 0.25,
            max_fraction: 0.10,
        }
    }
}

impl KellySizer {
    /// Capped fractional Kelly fraction for the given edge and confidence.
    pub fn fraction(&self, edge: f64, confidence: f64) -> f64 {
        if edge <= 0.0 || confidence <= 0.0 {
            return 0.0;
        }
        (kelly_fraction(edge, confidence) * self.multiplier).clamp(0.0, self.max_fraction)
    }

    /// Wager in currency, clamped to `[0, min(unit_size, max_risk)]` and
    /// rounded to cents. Returns zero when there is no edge or no confidence.
    pub fn wager(&self, edge: f64, confidence: f64, unit_size: Decimal, max_risk: Decimal) -> Decimal {
        let fraction = self.fraction(edge, confidence);
        if fraction <= 0.0 {
            return Decimal::ZERO;
        }
        let units = Decimal::from_f64(fraction / FRACTION_PER_UNIT).unwrap_or(Decimal::ZERO);
        let ceiling = unit_size.min(max_risk).max(Decimal::ZERO);
        (unit_size * units).clamp(Decimal::ZERO, ceiling).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kelly_fraction_formula() {
        // 2.0 * 0.6 / 0.4 = 3.0
        assert_relative_eq!(kelly_fraction(2.0, 0.6), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kelly_fraction_full_confidence_uses_edge() {
        assert_relative_eq!(kelly_fraction(0.04, 1.0), 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_kelly_fraction_never_negative() {
        assert_eq!(kelly_fraction(-1.0, 0.5), 0.0);
        assert_eq!(kelly_fraction(f64::NAN, 0.5), 0.0);
    }

    #[test]
    fn test_fraction_is_capped() {
        let sizer = KellySizer::default();
        // 3.0 * 0.25 = 0.75 → capped at 0.10
        assert_relative_eq!(sizer.fraction(2.0, 0.6), 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_small_edge_scales_unit() {
        let sizer = KellySizer::default();
        // kelly = 0.02 * 0.5 / 0.5 = 0.02 → quarter = 0.005 → half a unit
        let wager = sizer.wager(0.02, 0.5, dec!(100), dec!(100));
        assert_eq!(wager, dec!(50.00));
    }

    #[test]
    fn test_wager_capped_at_unit_and_max_risk() {
        let sizer = KellySizer::default();
        assert_eq!(sizer.wager(2.0, 0.6, dec!(100), dec!(500)), dec!(100));
        assert_eq!(sizer.wager(2.0, 0.6, dec!(100), dec!(40)), dec!(40));
    }

    #[test]
    fn test_zero_edge_or_confidence_means_no_bet() {
        let sizer = KellySizer::default();
        assert_eq!(sizer.wager(0.0, 0.7, dec!(100), dec!(100)), Decimal::ZERO);
        assert_eq!(sizer.wager(1.5, 0.0, dec!(100), dec!(100)), Decimal::ZERO);
        assert_eq!(sizer.wager(1.5, -0.2, dec!(100), dec!(100)), Decimal::ZERO);
    }

    #[test]
    fn test_wager_is_deterministic() {
        let sizer = KellySizer::default();
        let a = sizer.wager(0.013, 0.41, dec!(100), dec!(100));
        let b = sizer.wager(0.013, 0.41, dec!(100), dec!(100));
        assert_eq!(a, b);
    }
}
