use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::{RecommendationStatus, SettledRecommendation};
use crate::db::SettlementStore;
use crate::engine::{BetType, GamePeriod};

/// Settled performance of one (bet type, period) market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPerformance {
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub wagered: Decimal,
    pub pnl: Decimal,
    pub roi: f64,
    /// Mean CLV over the bets that have one.
    pub avg_clv: Option<f64>,
    pub clv_coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub lookback_days: i64,
    pub since: DateTime<Utc>,
    pub bets: usize,
    pub pnl: Decimal,
    pub roi: f64,
    pub markets: Vec<MarketPerformance>,
}

/// Settled recommendations created within the last `lookback_days`, grouped
/// by (bet type, period).
pub fn performance_report<S: SettlementStore + ?Sized>(
    store: &S,
    lookback_days: i64,
    now: DateTime<Utc>,
) -> Result<PerformanceReport> {
    let since = now - Duration::days(lookback_days.max(0));
    let rows = store.load_settled_since(since)?;
    Ok(build_report(&rows, lookback_days, since))
}

fn build_report(rows: &[SettledRecommendation], lookback_days: i64, since: DateTime<Utc>) -> PerformanceReport {
    let mut groups: BTreeMap<(BetType, GamePeriod), Vec<&SettledRecommendation>> = BTreeMap::new();
    for row in rows {
        groups.entry((row.bet_type, row.period)).or_default().push(row);
    }

    let markets: Vec<MarketPerformance> = groups
        .into_iter()
        .map(|((bet_type, period), rows)| {
            let count = |status| rows.iter().filter(|r| r.status == status).count();
            let wagered: Decimal = rows.iter().map(|r| r.wager).sum();
            let pnl: Decimal = rows.iter().map(|r| r.pnl).sum();
            let clvs: Vec<f64> = rows.iter().filter_map(|r| r.clv).collect();
            MarketPerformance {
                bet_type,
                period,
                bets: rows.len(),
                wins: count(RecommendationStatus::Won),
                losses: count(RecommendationStatus::Lost),
                pushes: count(RecommendationStatus::Push),
                wagered,
                pnl,
                roi: roi(pnl, wagered),
                avg_clv: if clvs.is_empty() {
                    None
                } else {
                    Some(clvs.iter().sum::<f64>() / clvs.len() as f64)
                },
                clv_coverage: clvs.len() as f64 / rows.len() as f64,
            }
        })
        .collect();

    let wagered: Decimal = markets.iter().map(|m| m.wagered).sum();
    let pnl: Decimal = markets.iter().map(|m| m.pnl).sum();
    PerformanceReport {
        lookback_days,
        since,
        bets: rows.len(),
        pnl,
        roi: roi(pnl, wagered),
        markets,
    }
}

fn roi(pnl: Decimal, wagered: Decimal) -> f64 {
    if wagered > Decimal::ZERO {
        (pnl / wagered).to_f64().unwrap_or(0.0)
    } else {
        0.0
    }
}
