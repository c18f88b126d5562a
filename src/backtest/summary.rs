use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::BetResult;
use crate::engine::{BetOutcome, BetType, Clv, ClvMetrics, GamePeriod, PriceSource, SkipReason};

/// Counts and money for one slice of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub wagered: Decimal,
    pub profit: Decimal,
    pub roi: f64,
    pub win_rate: f64,
}

impl Breakdown {
    fn add(&mut self, r: &BetResult) {
        self.bets += 1;
        match r.outcome {
            BetOutcome::Win => self.wins += 1,
            BetOutcome::Loss => self.losses += 1,
            BetOutcome::Push => self.pushes += 1,
        }
        self.wagered += r.wager;
        self.profit += r.profit;
    }

    fn finish(&mut self) {
        self.roi = ratio(self.profit, self.wagered);
        self.win_rate = win_rate(self.wins, self.losses);
    }
}

/// Aggregate of a run, derived from its bet results and skip tally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub games_considered: usize,
    /// Games in range dropped for lacking a final score, predictions or markets.
    pub games_filtered: usize,
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub total_wagered: Decimal,
    pub total_returned: Decimal,
    pub net_profit: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub roi: f64,
    /// Wins over decided bets; pushes are excluded.
    pub win_rate: f64,
    pub profit_factor: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub avg_edge: f64,
    pub avg_confidence: f64,
    pub avg_clv: Option<f64>,
    pub clv: ClvMetrics,
    pub max_drawdown: Decimal,
    pub assumed_price_bets: usize,
    pub by_period: BTreeMap<GamePeriod, Breakdown>,
    pub by_bet_type: BTreeMap<BetType, Breakdown>,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl BacktestSummary {
    /// Build the summary. `results` must already be in canonical order
    /// (game date, game id, bet type, period); drawdown depends on it.
    pub fn from_results(
        results: &[BetResult],
        skipped: BTreeMap<SkipReason, usize>,
        games_considered: usize,
    ) -> Self {
        let mut s = BacktestSummary {
            games_considered,
            skipped,
            ..Default::default()
        };
        if results.is_empty() {
            return s;
        }

        for r in results {
            s.total_bets += 1;
            match r.outcome {
                BetOutcome::Win => s.wins += 1,
                BetOutcome::Loss => s.losses += 1,
                BetOutcome::Push => s.pushes += 1,
            }
            s.total_wagered += r.wager;
            s.total_returned += r.payout;
            s.net_profit += r.profit;
            if r.profit > Decimal::ZERO {
                s.gross_profit += r.profit;
            } else {
                s.gross_loss -= r.profit;
            }
            if r.price_source == PriceSource::Assumed {
                s.assumed_price_bets += 1;
            }
            s.by_period.entry(r.period).or_default().add(r);
            s.by_bet_type.entry(r.bet_type).or_default().add(r);
        }
        s.by_period.values_mut().for_each(Breakdown::finish);
        s.by_bet_type.values_mut().for_each(Breakdown::finish);

        let n = results.len() as f64;
        s.roi = ratio(s.net_profit, s.total_wagered);
        s.win_rate = win_rate(s.wins, s.losses);
        s.profit_factor = if s.gross_loss > Decimal::ZERO {
            (s.gross_profit / s.gross_loss).to_f64()
        } else {
            None
        };
        s.avg_edge = results.iter().map(|r| r.edge).sum::<f64>() / n;
        s.avg_confidence = results.iter().map(|r| r.confidence).sum::<f64>() / n;
        s.clv = ClvMetrics::from_values(results.iter().map(|r| {
            r.clv.map(|value| Clv {
                value,
                beat_closing: r.beat_closing.unwrap_or(value > 0.0),
            })
        }));
        s.avg_clv = s.clv.mean;
        s.sharpe_ratio = sharpe_ratio(results);
        s.max_drawdown = max_drawdown(results);
        s
    }
}

fn ratio(num: Decimal, den: Decimal) -> f64 {
    if den > Decimal::ZERO {
        (num / den).to_f64().unwrap_or(0.0)
    } else {
        0.0
    }
}

fn win_rate(wins: usize, losses: usize) -> f64 {
    let decided = wins + losses;
    if decided == 0 {
        0.0
    } else {
        wins as f64 / decided as f64
    }
}

/// Mean per-bet return over its sample standard deviation, scaled by √n.
/// Undefined for fewer than two bets or zero dispersion.
pub fn sharpe_ratio(results: &[BetResult]) -> Option<f64> {
    let returns: Vec<f64> = results
        .iter()
        .filter(|r| r.wager > Decimal::ZERO)
        .filter_map(|r| (r.profit / r.wager).to_f64())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std > 0.0 {
        Some(mean / std * n.sqrt())
    } else {
        None
    }
}

/// Largest peak-to-trough fall of cumulative profit, starting from zero.
pub fn max_drawdown(results: &[BetResult]) -> Decimal {
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for r in results {
        cumulative += r.profit;
        peak = peak.max(cumulative);
        worst = worst.max(peak - cumulative);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BetSide;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bet(day: u32, outcome: BetOutcome, wager: Decimal, profit: Decimal) -> BetResult {
        let payout = match outcome {
            BetOutcome::Loss => Decimal::ZERO,
            _ => wager + profit,
        };
        BetResult {
            game_id: format!("g{day}"),
            game_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            home_team_id: "h".into(),
            away_team_id: "a".into(),
            bet_type: BetType::Spread,
            period: GamePeriod::FullGame,
            side: BetSide::Home,
            bet_line: Some(3.5),
            price: -110,
            price_source: PriceSource::Market,
            predicted_value: 6.0,
            confidence: 0.6,
            edge: 2.5,
            wager,
            actual_result: 7.0,
            outcome,
            payout,
            profit,
            opening_line: Some(3.5),
            closing_line: None,
            clv: None,
            beat_closing: None,
        }
    }

    fn sample() -> Vec<BetResult> {
        vec![
            bet(1, BetOutcome::Win, dec!(100), dec!(90.91)),
            bet(2, BetOutcome::Loss, dec!(100), dec!(-100)),
            bet(3, BetOutcome::Loss, dec!(50), dec!(-50)),
            bet(4, BetOutcome::Push, dec!(100), dec!(0)),
            bet(5, BetOutcome::Win, dec!(100), dec!(90.91)),
        ]
    }

    #[test]
    fn test_profit_equals_returned_minus_wagered() {
        let s = BacktestSummary::from_results(&sample(), BTreeMap::new(), 5);
        assert_eq!(s.net_profit, s.total_returned - s.total_wagered);
        assert_eq!(s.net_profit, dec!(31.82));
        assert_eq!(s.total_wagered, dec!(450));
    }

    #[test]
    fn test_win_rate_excludes_pushes() {
        let s = BacktestSummary::from_results(&sample(), BTreeMap::new(), 5);
        assert_eq!((s.wins, s.losses, s.pushes), (2, 2, 1));
        assert_relative_eq!(s.win_rate, 0.5);
        assert_relative_eq!(s.roi, 31.82 / 450.0, epsilon = 1e-12);
    }

    #[test]
    fn test_drawdown_from_running_peak() {
        // cumulative: 90.91, -9.09, -59.09, -59.09, 31.82 → peak 90.91, trough -59.09
        assert_eq!(max_drawdown(&sample()), dec!(150));
    }

    #[test]
    fn test_first_loss_counts_as_drawdown() {
        let results = vec![bet(1, BetOutcome::Loss, dec!(25), dec!(-25))];
        assert_eq!(max_drawdown(&results), dec!(25));
    }

    #[test]
    fn test_sharpe_needs_two_bets_and_dispersion() {
        assert!(sharpe_ratio(&sample()[..1]).is_none());
        let flat = vec![
            bet(1, BetOutcome::Push, dec!(10), dec!(0)),
            bet(2, BetOutcome::Push, dec!(10), dec!(0)),
        ];
        assert!(sharpe_ratio(&flat).is_none());
        assert!(sharpe_ratio(&sample()).is_some());
    }

    #[test]
    fn test_gross_and_profit_factor() {
        let s = BacktestSummary::from_results(&sample(), BTreeMap::new(), 5);
        assert_eq!(s.gross_profit, dec!(181.82));
        assert_eq!(s.gross_loss, dec!(150));
        assert_relative_eq!(s.profit_factor.unwrap(), 181.82 / 150.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clv_coverage_reported_when_absent() {
        let mut results = sample();
        results[0].clv = Some(1.5);
        results[0].beat_closing = Some(true);
        let s = BacktestSummary::from_results(&results, BTreeMap::new(), 5);
        assert_eq!(s.clv.covered, 1);
        assert_eq!(s.clv.missing, 4);
        assert_eq!(s.avg_clv, Some(1.5));
    }

    #[test]
    fn test_breakdowns_by_period_and_type() {
        let mut results = sample();
        results[2].period = GamePeriod::FirstHalf;
        results[2].bet_type = BetType::Total;
        let s = BacktestSummary::from_results(&results, BTreeMap::new(), 5);
        assert_eq!(s.by_period[&GamePeriod::FullGame].bets, 4);
        assert_eq!(s.by_period[&GamePeriod::FirstHalf].profit, dec!(-50));
        assert_eq!(s.by_bet_type[&BetType::Total].losses, 1);
        assert_relative_eq!(s.by_bet_type[&BetType::Spread].win_rate, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_results_keep_skip_tally() {
        let mut skipped = BTreeMap::new();
        skipped.insert(SkipReason::NoEdge, 3);
        let s = BacktestSummary::from_results(&[], skipped, 3);
        assert_eq!(s.total_bets, 0);
        assert_eq!(s.skipped[&SkipReason::NoEdge], 3);
        assert_eq!(s.sharpe_ratio, None);
    }
}
