use serde::{Deserialize, Serialize};

use super::market::{BetSide, BetType};
use super::odds::american_to_implied_prob;

/// Closing line value of one bet. Positive means the bet got a better
/// number than the close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clv {
    pub value: f64,
    pub beat_closing: bool,
}

impl Clv {
    fn new(value: f64) -> Self {
        Self {
            value,
            beat_closing: value > 0.0,
        }
    }
}

/// CLV of a spread or total bet.
///
/// `bet_line` is pick-perspective and `closing_line` is home-relative. Spread
/// bet lines are converted back to home-relative before differencing, then the
/// difference is inverted for AWAY and UNDER picks. Absent when either line is.
pub fn closing_line_value(
    bet_type: BetType,
    side: BetSide,
    bet_line: Option<f64>,
    closing_line: Option<f64>,
) -> Option<Clv> {
    let bet_line = bet_line?;
    let closing_line = closing_line?;
    let value = match (bet_type, side) {
        (BetType::Spread, BetSide::Home) => closing_line - bet_line,
        (BetType::Spread, BetSide::Away) => -(closing_line - (-bet_line)),
        (BetType::Total, BetSide::Over) => closing_line - bet_line,
        (BetType::Total, BetSide::Under) => -(closing_line - bet_line),
        _ => return None,
    };
    Some(Clv::new(value))
}

/// Moneyline CLV in implied-probability points: positive when the close
/// implies a higher win probability than the price bet.
pub fn moneyline_clv(bet_price: Option<i32>, closing_price: Option<i32>) -> Option<Clv> {
    let bet = american_to_implied_prob(bet_price?).ok()?;
    let close = american_to_implied_prob(closing_price?).ok()?;
    Some(Clv::new((close - bet) * 100.0))
}

/// CLV aggregate over the bets where it is defined, with the coverage gap
/// reported next to it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClvMetrics {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub positive_rate: Option<f64>,
    pub beat_rate: Option<f64>,
    pub covered: usize,
    pub missing: usize,
    /// covered / (covered + missing); zero when there are no bets.
    pub coverage: f64,
}

impl ClvMetrics {
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<Clv>>,
    {
        let mut defined = Vec::new();
        let mut missing = 0usize;
        for v in values {
            match v {
                Some(clv) => defined.push(clv),
                None => missing += 1,
            }
        }
        let covered = defined.len();
        let total = covered + missing;
        let coverage = if total == 0 {
            0.0
        } else {
            covered as f64 / total as f64
        };
        if covered == 0 {
            return Self {
                covered,
                missing,
                coverage,
                ..Default::default()
            };
        }

        let n = covered as f64;
        let mean = defined.iter().map(|c| c.value).sum::<f64>() / n;
        let variance = defined.iter().map(|c| (c.value - mean).powi(2)).sum::<f64>() / n;
        let positive = defined.iter().filter(|c| c.value > 0.0).count() as f64;
        let beat = defined.iter().filter(|c| c.beat_closing).count() as f64;

        Self {
            mean: Some(mean),
            std: Some(variance.sqrt()),
            positive_rate: Some(positive / n),
            beat_rate: Some(beat / n),
            covered,
            missing,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_home_spread_worse_than_close() {
        // Bet at -7.0, closed at -9.0: -9 - (-7) = -2.
        let clv = closing_line_value(BetType::Spread, BetSide::Home, Some(-7.0), Some(-9.0)).unwrap();
        assert_relative_eq!(clv.value, -2.0);
        assert!(!clv.beat_closing);
    }

    #[test]
    fn test_away_spread_is_opposite_sign_of_home() {
        // Same market from the away side: pick line 7.0 is home-relative -7.0,
        // so the raw home-relative difference is -2 and the inversion gives +2.
        let home = closing_line_value(BetType::Spread, BetSide::Home, Some(-7.0), Some(-9.0)).unwrap();
        let away = closing_line_value(BetType::Spread, BetSide::Away, Some(7.0), Some(-9.0)).unwrap();
        assert_relative_eq!(away.value, 2.0);
        assert!(away.beat_closing);
        assert!(home.value * away.value < 0.0);
    }

    #[test]
    fn test_total_sides() {
        let over = closing_line_value(BetType::Total, BetSide::Over, Some(141.5), Some(144.0)).unwrap();
        assert_relative_eq!(over.value, 2.5);
        let under = closing_line_value(BetType::Total, BetSide::Under, Some(141.5), Some(144.0)).unwrap();
        assert_relative_eq!(under.value, -2.5);
    }

    #[test]
    fn test_zero_clv_is_defined_but_not_beating() {
        let clv = closing_line_value(BetType::Total, BetSide::Over, Some(140.0), Some(140.0)).unwrap();
        assert_eq!(clv.value, 0.0);
        assert!(!clv.beat_closing);
    }

    #[test]
    fn test_missing_line_means_no_clv() {
        assert!(closing_line_value(BetType::Spread, BetSide::Home, None, Some(3.0)).is_none());
        assert!(closing_line_value(BetType::Spread, BetSide::Home, Some(3.0), None).is_none());
        assert!(closing_line_value(BetType::Moneyline, BetSide::Home, Some(1.0), Some(1.0)).is_none());
    }

    #[test]
    fn test_moneyline_clv_in_probability_points() {
        // Bet at +150 (0.40), closed at +120 (0.4545...).
        let clv = moneyline_clv(Some(150), Some(120)).unwrap();
        assert_relative_eq!(clv.value, (100.0 / 220.0 - 0.4) * 100.0, epsilon = 1e-9);
        assert!(clv.beat_closing);
        assert!(moneyline_clv(Some(150), None).is_none());
        assert!(moneyline_clv(Some(0), Some(-110)).is_none());
    }

    #[test]
    fn test_metrics_report_coverage() {
        let values = vec![
            Some(Clv::new(2.0)),
            None,
            Some(Clv::new(-1.0)),
            Some(Clv::new(0.0)),
            None,
        ];
        let m = ClvMetrics::from_values(values);
        assert_eq!(m.covered, 3);
        assert_eq!(m.missing, 2);
        assert_relative_eq!(m.coverage, 0.6);
        assert_relative_eq!(m.mean.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.positive_rate.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.beat_rate.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_metrics_without_any_clv() {
        let m = ClvMetrics::from_values(vec![None, None]);
        assert_eq!(m.mean, None);
        assert_eq!(m.covered, 0);
        assert_eq!(m.coverage, 0.0);
    }
}
