//! Historical replay of the betting core.
//!
//! Games are simulated in parallel; results are then put into canonical order
//! (game date, game id, bet type, period) before any order-sensitive statistic
//! is computed, so a run's numbers never depend on scheduling.
use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod summary;
pub use summary::BacktestSummary;

use crate::db::models::{BetResult, GameRecord};
use crate::db::{BacktestStore, GameStore, LockProvider};
use crate::engine::{
    actual_result, closing_line_value, evaluate, moneyline_clv, require_score, resolve_outcome,
    settle_payout, BetType, Evaluation, GamePeriod, Gates, KellySizer, LineSource, PricePolicy,
    SkipReason,
};
use crate::error::{EngineError, EngineResult};
use crate::lock::{acquire_run, Acquired};

/// Everything that determines a run, together with the data snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub name: String,
    pub model_version: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bet_types: Vec<BetType>,
    pub periods: Vec<GamePeriod>,
    pub min_confidence: f64,
    pub min_edge: f64,
    pub max_risk: Decimal,
    pub unit_size: Decimal,
    pub line_source: LineSource,
    pub price_policy: PricePolicy,
    pub sizer: KellySizer,
}

impl BacktestConfig {
    pub fn new(name: impl Into<String>, model_version: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            model_version: model_version.into(),
            start_date: start,
            end_date: end,
            bet_types: BetType::ALL.to_vec(),
            periods: GamePeriod::ALL.to_vec(),
            min_confidence: 0.0,
            min_edge: 0.0,
            max_risk: dec!(100),
            unit_size: dec!(100),
            line_source: LineSource::default(),
            price_policy: PricePolicy::default(),
            sizer: KellySizer::default(),
        }
    }

    fn gates(&self) -> Gates {
        Gates {
            min_confidence: self.min_confidence,
            min_edge: self.min_edge,
        }
    }
}

/// A finished run: its configuration, summary and every simulated bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub config: BacktestConfig,
    pub summary: BacktestSummary,
    pub results: Vec<BetResult>,
}

enum Simulated {
    Bet(Box<BetResult>),
    Skip(SkipReason),
}

/// Replay every configured (bet type, period) market of every game in range.
pub fn run_backtest<S: GameStore + ?Sized>(store: &S, config: &BacktestConfig) -> EngineResult<BacktestRun> {
    let games = store.load_historical_games(config.start_date, config.end_date, &config.model_version)?;
    let loaded = games.len();
    let valid: Vec<&GameRecord> = games.iter().filter(|g| g.has_required_fields()).collect();
    info!(
        name = %config.name,
        loaded,
        valid = valid.len(),
        "backtest {} → {}",
        config.start_date,
        config.end_date
    );
    if valid.is_empty() {
        return Err(EngineError::DatasetEmptyAfterFiltering {
            start: config.start_date,
            end: config.end_date,
        });
    }

    let per_game = valid
        .par_iter()
        .map(|game| simulate_game(game, config))
        .collect::<EngineResult<Vec<_>>>()?;

    let mut results = Vec::new();
    let mut skipped: BTreeMap<SkipReason, usize> = BTreeMap::new();
    for outcome in per_game.into_iter().flatten() {
        match outcome {
            Simulated::Bet(bet) => results.push(*bet),
            Simulated::Skip(reason) => *skipped.entry(reason).or_default() += 1,
        }
    }
    results.sort_by(|a, b| {
        (a.game_date, &a.game_id, a.bet_type, a.period).cmp(&(b.game_date, &b.game_id, b.bet_type, b.period))
    });

    let mut summary = BacktestSummary::from_results(&results, skipped, valid.len());
    summary.games_filtered = loaded - valid.len();
    info!(
        bets = summary.total_bets,
        filtered = summary.games_filtered,
        net_profit = %summary.net_profit,
        roi = summary.roi,
        "backtest complete"
    );
    for (reason, count) in &summary.skipped {
        debug!(reason = reason.as_str(), count, "skipped markets");
    }
    Ok(BacktestRun {
        config: config.clone(),
        summary,
        results,
    })
}

/// Store a finished run under the `("backtest", end_date, model_version)` lock.
pub fn persist_run<S>(store: &S, run: &BacktestRun, wait: Duration) -> EngineResult<i64>
where
    S: BacktestStore + LockProvider + ?Sized,
{
    let guard = match acquire_run(store, "backtest", run.config.end_date, &run.config.model_version, wait)? {
        Acquired::Held(guard) => guard,
        Acquired::Busy { key } => {
            warn!(key, "backtest persistence is busy");
            return Err(EngineError::LockUnavailable { key });
        }
    };
    let run_id = store.persist_backtest(run)?;
    info!(run_id, key = guard.key(), bets = run.results.len(), "backtest persisted");
    Ok(run_id)
}

fn simulate_game(game: &GameRecord, config: &BacktestConfig) -> EngineResult<Vec<Simulated>> {
    let mut out = Vec::with_capacity(config.bet_types.len() * config.periods.len());
    for &bet_type in &config.bet_types {
        for &period in &config.periods {
            let sim = match simulate_market(game, bet_type, period, config) {
                Ok(sim) => sim,
                Err(err) => match SkipReason::for_error(&err) {
                    Some(reason) => {
                        debug!(game = %game.game_id, %bet_type, %period, "skipped: {}", err);
                        Simulated::Skip(reason)
                    }
                    None => return Err(err),
                },
            };
            out.push(sim);
        }
    }
    Ok(out)
}

fn simulate_market(
    game: &GameRecord,
    bet_type: BetType,
    period: GamePeriod,
    config: &BacktestConfig,
) -> EngineResult<Simulated> {
    let Some(prediction) = game.prediction(bet_type, period) else {
        return Ok(Simulated::Skip(SkipReason::MissingPrediction));
    };
    let kind = config.line_source.kind();
    let board = game.market(bet_type, period);
    let market = board
        .and_then(|b| b.get(kind))
        .ok_or(EngineError::MissingMarketField {
            bet_type,
            period,
            field: kind.as_str(),
        })?;

    let decision = match evaluate(bet_type, period, prediction, market, &config.gates())? {
        Evaluation::Placed(decision) => decision,
        Evaluation::Skipped(reason) => return Ok(Simulated::Skip(reason)),
    };

    let wager = config
        .sizer
        .wager(decision.edge, prediction.confidence, config.unit_size, config.max_risk);
    if wager <= Decimal::ZERO {
        return Ok(Simulated::Skip(SkipReason::ZeroStake));
    }

    let score = require_score(&game.game_id, period, game.score(period))?;
    let (price, price_source) = config.price_policy.resolve(decision.price, decision.side)?;
    let outcome = resolve_outcome(bet_type, period, decision.side, decision.bet_line, &score)?;
    let paid = settle_payout(outcome, price, wager)?;

    let opening_line = board.and_then(|b| b.opening).and_then(|l| l.line);
    let closing = board.and_then(|b| b.closing);
    let closing_line = closing.and_then(|l| l.line);
    let clv = match bet_type {
        BetType::Moneyline => moneyline_clv(decision.price, closing.and_then(|l| l.price_for(decision.side))),
        _ => closing_line_value(bet_type, decision.side, decision.bet_line, closing_line),
    };

    Ok(Simulated::Bet(Box::new(BetResult {
        game_id: game.game_id.clone(),
        game_date: game.game_date,
        home_team_id: game.home_team_id.clone(),
        away_team_id: game.away_team_id.clone(),
        bet_type,
        period,
        side: decision.side,
        bet_line: decision.bet_line,
        price,
        price_source,
        predicted_value: prediction.value,
        confidence: prediction.confidence,
        edge: decision.edge,
        wager,
        actual_result: actual_result(bet_type, &score),
        outcome,
        payout: paid.payout,
        profit: paid.profit,
        opening_line,
        closing_line,
        clv: clv.map(|c| c.value),
        beat_closing: clv.map(|c| c.beat_closing),
    })))
}
