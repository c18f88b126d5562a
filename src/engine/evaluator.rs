use serde::{Deserialize, Serialize};

use super::market::{BetSide, BetType, GamePeriod, MarketLine, Prediction};
use super::odds::american_to_implied_prob;
use crate::error::{EngineError, EngineResult};

/// Thresholds a bet must clear to be placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gates {
    pub min_confidence: f64,
    pub min_edge: f64,
}

impl Default for Gates {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            min_edge: 0.0,
        }
    }
}

/// Why a bet was legitimately not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Prediction sits exactly on the line, or no side has positive edge.
    NoEdge,
    BelowMinEdge,
    LowConfidence,
    /// Sizing produced a zero wager.
    ZeroStake,
    MissingPrediction,
    MissingMarketField,
    MissingResult,
    MissingOddsPrice,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoEdge => "no_edge",
            SkipReason::BelowMinEdge => "below_min_edge",
            SkipReason::LowConfidence => "low_confidence",
            SkipReason::ZeroStake => "zero_stake",
            SkipReason::MissingPrediction => "missing_prediction",
            SkipReason::MissingMarketField => "missing_market_field",
            SkipReason::MissingResult => "missing_result",
            SkipReason::MissingOddsPrice => "missing_odds_price",
        }
    }

    /// Skip reason for a per-bet error, or `None` when the error must abort.
    pub fn for_error(err: &EngineError) -> Option<Self> {
        match err {
            EngineError::MissingMarketField { .. } => Some(SkipReason::MissingMarketField),
            EngineError::MissingResult { .. } => Some(SkipReason::MissingResult),
            EngineError::MissingOddsPrice { .. } | EngineError::InvalidOdds(_) => {
                Some(SkipReason::MissingOddsPrice)
            }
            _ => None,
        }
    }
}

/// A bet the evaluator decided to place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetDecision {
    pub side: BetSide,
    /// Line from the picked side's perspective. `None` for moneylines.
    pub bet_line: Option<f64>,
    /// Side-specific market price, if the market quoted one.
    pub price: Option<i32>,
    pub edge: f64,
}

/// Evaluator verdict. Errors travel separately through `EngineResult`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Placed(BetDecision),
    Skipped(SkipReason),
}

/// Decide whether and how to bet one (bet type, period) market.
///
/// `market` is whichever line the caller's leakage policy selected (opening
/// or consensus). Missing required fields are an error, never a fabricated line.
/// A moneyline where both sides carry the same positive edge is skipped as
/// `NoEdge`.
pub fn evaluate(
    bet_type: BetType,
    period: GamePeriod,
    prediction: &Prediction,
    market: &MarketLine,
    gates: &Gates,
) -> EngineResult<Evaluation> {
    let missing = |field: &'static str| EngineError::MissingMarketField {
        bet_type,
        period,
        field,
    };

    let decision = match bet_type {
        BetType::Spread => {
            let line = market.line.ok_or_else(|| missing("line"))?;
            let predicted_margin = prediction.value;
            if predicted_margin > line {
                BetDecision {
                    side: BetSide::Home,
                    bet_line: Some(line),
                    price: market.price_for(BetSide::Home),
                    edge: predicted_margin - line,
                }
            } else if predicted_margin < line {
                BetDecision {
                    side: BetSide::Away,
                    bet_line: Some(-line),
                    price: market.price_for(BetSide::Away),
                    edge: (predicted_margin - line).abs(),
                }
            } else {
                return Ok(Evaluation::Skipped(SkipReason::NoEdge));
            }
        }
        BetType::Total => {
            let line = market.line.ok_or_else(|| missing("line"))?;
            let predicted_total = prediction.value;
            let side = if predicted_total > line {
                BetSide::Over
            } else if predicted_total < line {
                BetSide::Under
            } else {
                return Ok(Evaluation::Skipped(SkipReason::NoEdge));
            };
            BetDecision {
                side,
                bet_line: Some(line),
                price: market.price_for(side),
                edge: (predicted_total - line).abs(),
            }
        }
        BetType::Moneyline => {
            let home_price = market.home_price.ok_or_else(|| missing("home_price"))?;
            let away_price = market.away_price.ok_or_else(|| missing("away_price"))?;
            let home_win_prob = prediction.value;
            let home_edge = home_win_prob - american_to_implied_prob(home_price)?;
            let away_edge = (1.0 - home_win_prob) - american_to_implied_prob(away_price)?;

            // An exact tie between the two sides has no preferred pick.
            if home_edge > 0.0 && home_edge > away_edge {
                BetDecision {
                    side: BetSide::Home,
                    bet_line: None,
                    price: Some(home_price),
                    edge: home_edge,
                }
            } else if away_edge > 0.0 && away_edge > home_edge {
                BetDecision {
                    side: BetSide::Away,
                    bet_line: None,
                    price: Some(away_price),
                    edge: away_edge,
                }
            } else {
                return Ok(Evaluation::Skipped(SkipReason::NoEdge));
            }
        }
    };

    if decision.edge < 0.0 {
        return Ok(Evaluation::Skipped(SkipReason::NoEdge));
    }
    if decision.edge < gates.min_edge {
        return Ok(Evaluation::Skipped(SkipReason::BelowMinEdge));
    }
    if prediction.confidence < gates.min_confidence {
        return Ok(Evaluation::Skipped(SkipReason::LowConfidence));
    }
    Ok(Evaluation::Placed(decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spread(line: f64) -> MarketLine {
        MarketLine {
            line: Some(line),
            home_price: Some(-110),
            away_price: Some(-105),
            ..Default::default()
        }
    }

    fn pred(value: f64, confidence: f64) -> Prediction {
        Prediction { value, confidence }
    }

    fn placed(e: Evaluation) -> BetDecision {
        match e {
            Evaluation::Placed(d) => d,
            other => panic!("expected a placed bet, got {:?}", other),
        }
    }

    #[test]
    fn test_spread_home_when_prediction_above_line() {
        let d = placed(
            evaluate(BetType::Spread, GamePeriod::FullGame, &pred(9.0, 0.7), &spread(6.5), &Gates::default())
                .unwrap(),
        );
        assert_eq!(d.side, BetSide::Home);
        assert_eq!(d.bet_line, Some(6.5));
        assert_eq!(d.price, Some(-110));
        assert_relative_eq!(d.edge, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_spread_away_flips_line_to_pick_perspective() {
        let d = placed(
            evaluate(BetType::Spread, GamePeriod::FullGame, &pred(3.0, 0.7), &spread(6.5), &Gates::default())
                .unwrap(),
        );
        assert_eq!(d.side, BetSide::Away);
        assert_eq!(d.bet_line, Some(-6.5));
        assert_eq!(d.price, Some(-105));
        assert_relative_eq!(d.edge, 3.5, epsilon = 1e-12);
    }

    #[test]
    fn test_spread_on_the_line_is_skipped() {
        let e = evaluate(BetType::Spread, GamePeriod::FullGame, &pred(6.5, 0.9), &spread(6.5), &Gates::default())
            .unwrap();
        assert_eq!(e, Evaluation::Skipped(SkipReason::NoEdge));
    }

    #[test]
    fn test_total_over_and_under() {
        let market = MarketLine {
            line: Some(145.5),
            over_price: Some(-108),
            under_price: Some(-112),
            ..Default::default()
        };
        let over = placed(
            evaluate(BetType::Total, GamePeriod::FullGame, &pred(150.0, 0.6), &market, &Gates::default()).unwrap(),
        );
        assert_eq!(over.side, BetSide::Over);
        assert_eq!(over.bet_line, Some(145.5));
        assert_eq!(over.price, Some(-108));

        let under = placed(
            evaluate(BetType::Total, GamePeriod::FullGame, &pred(140.0, 0.6), &market, &Gates::default()).unwrap(),
        );
        assert_eq!(under.side, BetSide::Under);
        assert_eq!(under.bet_line, Some(145.5));
        assert_eq!(under.price, Some(-112));
        assert_relative_eq!(under.edge, 5.5, epsilon = 1e-12);
    }

    #[test]
    fn test_total_without_line_is_an_error_not_a_skip() {
        let market = MarketLine {
            over_price: Some(-110),
            ..Default::default()
        };
        let err = evaluate(BetType::Total, GamePeriod::FirstHalf, &pred(70.0, 0.6), &market, &Gates::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingMarketField { field: "line", .. }));
    }

    #[test]
    fn test_moneyline_picks_side_with_larger_edge() {
        // -150 → 0.60, +130 → 0.4348
        let market = MarketLine {
            home_price: Some(-150),
            away_price: Some(130),
            ..Default::default()
        };
        let home = placed(
            evaluate(BetType::Moneyline, GamePeriod::FullGame, &pred(0.70, 0.8), &market, &Gates::default())
                .unwrap(),
        );
        assert_eq!(home.side, BetSide::Home);
        assert_eq!(home.bet_line, None);
        assert_eq!(home.price, Some(-150));
        assert_relative_eq!(home.edge, 0.10, epsilon = 1e-9);

        let away = placed(
            evaluate(BetType::Moneyline, GamePeriod::FullGame, &pred(0.45, 0.8), &market, &Gates::default())
                .unwrap(),
        );
        assert_eq!(away.side, BetSide::Away);
        assert_relative_eq!(away.edge, 0.55 - 100.0 / 230.0, epsilon = 1e-9);
    }

    #[test]
    fn test_moneyline_without_value_is_skipped() {
        let market = MarketLine {
            home_price: Some(-110),
            away_price: Some(-110),
            ..Default::default()
        };
        let e = evaluate(BetType::Moneyline, GamePeriod::FullGame, &pred(0.5, 0.8), &market, &Gates::default())
            .unwrap();
        assert_eq!(e, Evaluation::Skipped(SkipReason::NoEdge));
    }

    #[test]
    fn test_moneyline_equal_positive_edges_is_skipped() {
        let market = MarketLine {
            home_price: Some(110),
            away_price: Some(110),
            ..Default::default()
        };
        let e = evaluate(BetType::Moneyline, GamePeriod::FullGame, &pred(0.5, 0.8), &market, &Gates::default())
            .unwrap();
        assert_eq!(e, Evaluation::Skipped(SkipReason::NoEdge));
    }

    #[test]
    fn test_moneyline_missing_price_is_error() {
        let market = MarketLine {
            home_price: Some(-110),
            ..Default::default()
        };
        let err = evaluate(BetType::Moneyline, GamePeriod::FullGame, &pred(0.6, 0.8), &market, &Gates::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingMarketField { field: "away_price", .. }));
    }

    #[test]
    fn test_confidence_gate() {
        let gates = Gates {
            min_confidence: 0.55,
            min_edge: 0.0,
        };
        let e = evaluate(BetType::Spread, GamePeriod::FullGame, &pred(10.0, 0.5), &spread(6.5), &gates).unwrap();
        assert_eq!(e, Evaluation::Skipped(SkipReason::LowConfidence));
    }

    #[test]
    fn test_min_edge_gate() {
        let gates = Gates {
            min_confidence: 0.0,
            min_edge: 1.0,
        };
        let e = evaluate(BetType::Spread, GamePeriod::FullGame, &pred(7.0, 0.9), &spread(6.5), &gates).unwrap();
        assert_eq!(e, Evaluation::Skipped(SkipReason::BelowMinEdge));
    }

    #[test]
    fn test_skip_reason_for_errors() {
        let err = EngineError::MissingResult {
            game_id: "g1".into(),
            period: GamePeriod::FirstQuarter,
        };
        assert_eq!(SkipReason::for_error(&err), Some(SkipReason::MissingResult));
        let fatal = EngineError::LockUnavailable { key: 7 };
        assert_eq!(SkipReason::for_error(&fatal), None);
    }
}
