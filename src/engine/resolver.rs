//! Outcome and payout resolution for a placed bet.
//!
//! A bet moves from pending to exactly one of WIN/LOSS/PUSH. Comparisons are
//! exact: a push needs the actual value to equal the line with no tolerance.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::{BetOutcome, BetSide, BetType, GamePeriod, PeriodScore};
use super::odds::american_payout;
use crate::error::{EngineError, EngineResult};

/// Score of the requested period, never substituted by another period.
pub fn require_score(
    game_id: &str,
    period: GamePeriod,
    score: Option<PeriodScore>,
) -> EngineResult<PeriodScore> {
    score.ok_or_else(|| EngineError::MissingResult {
        game_id: game_id.to_string(),
        period,
    })
}

/// Numeric actual result: home margin (spread), total points (total) or
/// +1 / -1 / 0 for a home win, away win or tie (moneyline).
pub fn actual_result(bet_type: BetType, score: &PeriodScore) -> f64 {
    match bet_type {
        BetType::Spread => score.margin() as f64,
        BetType::Total => score.total() as f64,
        BetType::Moneyline => score.margin().signum() as f64,
    }
}

/// Human-readable result: `"H-A"`, or `"T total (H-A)"` for totals.
pub fn describe_result(bet_type: BetType, score: &PeriodScore) -> String {
    match bet_type {
        BetType::Total => format!("{} total ({}-{})", score.total(), score.home, score.away),
        BetType::Spread | BetType::Moneyline => format!("{}-{}", score.home, score.away),
    }
}

/// Outcome of a bet given the pick-perspective `bet_line` and the period score.
pub fn resolve_outcome(
    bet_type: BetType,
    period: GamePeriod,
    side: BetSide,
    bet_line: Option<f64>,
    score: &PeriodScore,
) -> EngineResult<BetOutcome> {
    if !side.applies_to(bet_type) {
        return Err(EngineError::SideMismatch { side, bet_type });
    }
    let line = || {
        bet_line.ok_or(EngineError::MissingMarketField {
            bet_type,
            period,
            field: "line",
        })
    };

    let outcome = match bet_type {
        BetType::Spread => {
            let pick_margin = match side {
                BetSide::Home => score.margin() as f64,
                _ => -(score.margin() as f64),
            };
            compare(pick_margin - line()?)
        }
        BetType::Total => {
            let diff = score.total() as f64 - line()?;
            match side {
                BetSide::Over => compare(diff),
                _ => compare(-diff),
            }
        }
        BetType::Moneyline => {
            let pick_margin = match side {
                BetSide::Home => score.margin(),
                _ => -score.margin(),
            };
            // Ties lose for both sides.
            if pick_margin > 0 {
                BetOutcome::Win
            } else {
                BetOutcome::Loss
            }
        }
    };
    Ok(outcome)
}

fn compare(diff: f64) -> BetOutcome {
    if diff > 0.0 {
        BetOutcome::Win
    } else if diff < 0.0 {
        BetOutcome::Loss
    } else {
        BetOutcome::Push
    }
}

/// Money side of a resolved bet. `payout` is the total returned to the bettor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub payout: Decimal,
    pub profit: Decimal,
}

/// Payout for `outcome`. The price must already be resolved by the caller's
/// price policy; nothing here substitutes a default.
pub fn settle_payout(outcome: BetOutcome, price: i32, wager: Decimal) -> EngineResult<Payout> {
    match outcome {
        BetOutcome::Push => Ok(Payout {
            payout: wager,
            profit: Decimal::ZERO,
        }),
        BetOutcome::Loss => Ok(Payout {
            payout: Decimal::ZERO,
            profit: -wager,
        }),
        BetOutcome::Win => {
            let profit = american_payout(price, wager)?.round_dp(2);
            Ok(Payout {
                payout: wager + profit,
                profit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_home_spread_cover_pays_at_minus_110() {
        // Home needed to win by more than 6.5 and won by 10.
        let score = PeriodScore::new(80, 70);
        let outcome =
            resolve_outcome(BetType::Spread, GamePeriod::FullGame, BetSide::Home, Some(6.5), &score).unwrap();
        assert_eq!(outcome, BetOutcome::Win);

        let paid = settle_payout(outcome, -110, dec!(100)).unwrap();
        assert_eq!(paid.profit, dec!(90.91));
        assert_eq!(paid.payout, dec!(190.91));
    }

    #[test]
    fn test_away_spread_uses_away_perspective_margin() {
        // Home line 3.5 → away bet line -3.5; away loses by 2 → covers.
        let score = PeriodScore::new(72, 70);
        let outcome =
            resolve_outcome(BetType::Spread, GamePeriod::FullGame, BetSide::Away, Some(-3.5), &score).unwrap();
        assert_eq!(outcome, BetOutcome::Win);

        let score = PeriodScore::new(75, 70);
        let outcome =
            resolve_outcome(BetType::Spread, GamePeriod::FullGame, BetSide::Away, Some(-3.5), &score).unwrap();
        assert_eq!(outcome, BetOutcome::Loss);
    }

    #[test]
    fn test_spread_push_only_on_exact_equality() {
        let score = PeriodScore::new(40, 33);
        for (line, expected) in [
            (7.0, BetOutcome::Push),
            (6.5, BetOutcome::Win),
            (7.5, BetOutcome::Loss),
        ] {
            let outcome =
                resolve_outcome(BetType::Spread, GamePeriod::FirstHalf, BetSide::Home, Some(line), &score).unwrap();
            assert_eq!(outcome, expected, "line {}", line);
            assert_eq!(outcome == BetOutcome::Push, actual_result(BetType::Spread, &score) == line);
        }
    }

    #[test]
    fn test_under_on_the_number_is_push() {
        let score = PeriodScore::new(75, 70);
        let outcome =
            resolve_outcome(BetType::Total, GamePeriod::FullGame, BetSide::Under, Some(145.0), &score).unwrap();
        assert_eq!(outcome, BetOutcome::Push);
        let paid = settle_payout(outcome, -110, dec!(100)).unwrap();
        assert_eq!(paid.payout, dec!(100));
        assert_eq!(paid.profit, Decimal::ZERO);
    }

    #[test]
    fn test_over_and_under_are_exclusive() {
        for (home, away) in [(70, 70), (80, 66), (60, 60)] {
            let score = PeriodScore::new(home, away);
            let over =
                resolve_outcome(BetType::Total, GamePeriod::FullGame, BetSide::Over, Some(145.5), &score).unwrap();
            let under =
                resolve_outcome(BetType::Total, GamePeriod::FullGame, BetSide::Under, Some(145.5), &score).unwrap();
            assert_ne!(over, under);
            assert_eq!(over == BetOutcome::Win, (score.total() as f64) > 145.5);
            assert_eq!(under == BetOutcome::Win, (score.total() as f64) < 145.5);
        }
    }

    #[test]
    fn test_moneyline_tie_loses_both_sides() {
        let score = PeriodScore::new(35, 35);
        for side in [BetSide::Home, BetSide::Away] {
            let outcome = resolve_outcome(BetType::Moneyline, GamePeriod::FirstHalf, side, None, &score).unwrap();
            assert_eq!(outcome, BetOutcome::Loss);
        }
        assert_eq!(actual_result(BetType::Moneyline, &score), 0.0);
    }

    #[test]
    fn test_moneyline_winner() {
        let score = PeriodScore::new(61, 68);
        assert_eq!(
            resolve_outcome(BetType::Moneyline, GamePeriod::FullGame, BetSide::Away, None, &score).unwrap(),
            BetOutcome::Win
        );
        assert_eq!(actual_result(BetType::Moneyline, &score), -1.0);
    }

    #[test]
    fn test_loss_forfeits_wager() {
        let paid = settle_payout(BetOutcome::Loss, 150, dec!(42.50)).unwrap();
        assert_eq!(paid.payout, Decimal::ZERO);
        assert_eq!(paid.profit, dec!(-42.50));
    }

    #[test]
    fn test_underdog_win() {
        let paid = settle_payout(BetOutcome::Win, 150, dec!(20)).unwrap();
        assert_eq!(paid.profit, dec!(30));
        assert_eq!(paid.payout, dec!(50));
    }

    #[test]
    fn test_missing_period_score_is_error() {
        let err = require_score("g-17", GamePeriod::FirstQuarter, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingResult { period: GamePeriod::FirstQuarter, .. }
        ));
    }

    #[test]
    fn test_side_must_match_market() {
        let score = PeriodScore::new(1, 0);
        let err = resolve_outcome(BetType::Total, GamePeriod::FullGame, BetSide::Home, Some(1.0), &score)
            .unwrap_err();
        assert!(matches!(err, EngineError::SideMismatch { .. }));
    }

    #[test]
    fn test_describe_result() {
        let score = PeriodScore::new(78, 71);
        assert_eq!(describe_result(BetType::Spread, &score), "78-71");
        assert_eq!(describe_result(BetType::Total, &score), "149 total (78-71)");
    }
}
