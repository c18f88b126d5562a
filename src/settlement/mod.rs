//! Settlement of live recommendations once their games are final.
//!
//! Each pending recommendation is resolved against the score of its own
//! period and the closing snapshot of its own market, then written in a single
//! conditional update so a recommendation transitions to a terminal status
//! exactly once, however many settlement runs overlap.
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod report;
pub use report::performance_report;

use crate::db::models::{BookSnapshot, GameRecord, RecommendationRecord, SettlementRecord};
use crate::db::{GameStore, LockProvider, SettlementStore};
use crate::engine::{
    actual_result, closing_line_value, describe_result, moneyline_clv, require_score, resolve_outcome,
    settle_payout, BetOutcome, BetType, PricePolicy,
};
use crate::error::{EngineError, EngineResult};
use crate::lock::{acquire_run, Acquired};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub model_version: String,
    /// Book whose closing snapshot is preferred.
    pub reference_book: String,
    /// Books tried in order when the reference book has no snapshot.
    pub alternate_books: Vec<String>,
    pub price_policy: PricePolicy,
    pub lock_wait: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            model_version: "default".into(),
            reference_book: "pinnacle".into(),
            alternate_books: vec!["bovada".into()],
            price_policy: PricePolicy::default(),
            lock_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub settled: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub skipped_missing_scores: usize,
    /// Settled by this run without any closing snapshot; CLV is absent.
    pub missing_closing_line: usize,
    /// Another run settled the recommendation first.
    pub already_settled: usize,
    pub skipped_missing_price: usize,
    pub skipped_missing_line: usize,
    pub skipped_invalid: usize,
    pub awaiting_final: usize,
    pub total_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementRun {
    Completed(SettlementSummary),
    Busy { key: i64 },
}

/// Pick the closing snapshot: reference book, then alternates in order, then
/// the newest snapshot from any book. `snapshots` must be newest first.
pub fn select_closing<'s>(
    snapshots: &'s [BookSnapshot],
    reference_book: &str,
    alternate_books: &[String],
) -> Option<&'s BookSnapshot> {
    std::iter::once(reference_book)
        .chain(alternate_books.iter().map(String::as_str))
        .find_map(|book| {
            snapshots
                .iter()
                .find(|s| s.bookmaker.eq_ignore_ascii_case(book))
        })
        .or_else(|| snapshots.first())
}

/// Settle every pending recommendation of `config.model_version` whose game
/// is final. Reports busy when another live run holds the lock for
/// `("settle", target_date, model_version)`.
pub fn settle_pending<S>(store: &S, config: &SettlementConfig, target_date: NaiveDate) -> EngineResult<SettlementRun>
where
    S: GameStore + SettlementStore + LockProvider + ?Sized,
{
    let guard = match acquire_run(store, "settle", target_date, &config.model_version, config.lock_wait)? {
        Acquired::Held(guard) => guard,
        Acquired::Busy { key } => {
            warn!(key, %target_date, "settlement already running");
            return Ok(SettlementRun::Busy { key });
        }
    };

    let pending = store.load_pending_recommendations(&config.model_version)?;
    info!(pending = pending.len(), key = guard.key(), "settling recommendations");

    let mut summary = SettlementSummary::default();
    let mut games: HashMap<String, Option<GameRecord>> = HashMap::new();
    for rec in &pending {
        if !games.contains_key(&rec.game_id) {
            let game = store.load_final_game(&rec.game_id)?;
            games.insert(rec.game_id.clone(), game);
        }
        let Some(Some(game)) = games.get(&rec.game_id) else {
            summary.awaiting_final += 1;
            continue;
        };

        if let Err(err) = settle_one(store, config, rec, game, &mut summary) {
            debug!(id = rec.id, "recommendation not settled: {}", err);
            match err {
                EngineError::MissingResult { .. } => summary.skipped_missing_scores += 1,
                EngineError::MissingMarketField { .. } => summary.skipped_missing_line += 1,
                EngineError::MissingOddsPrice { .. } | EngineError::InvalidOdds(_) => {
                    summary.skipped_missing_price += 1
                }
                EngineError::SideMismatch { .. } => summary.skipped_invalid += 1,
                other => return Err(other),
            }
        }
    }

    info!(
        settled = summary.settled,
        wins = summary.wins,
        losses = summary.losses,
        pushes = summary.pushes,
        awaiting_final = summary.awaiting_final,
        missing_closing = summary.missing_closing_line,
        pnl = %summary.total_pnl,
        "settlement complete"
    );
    Ok(SettlementRun::Completed(summary))
}

fn settle_one<S>(
    store: &S,
    config: &SettlementConfig,
    rec: &RecommendationRecord,
    game: &GameRecord,
    summary: &mut SettlementSummary,
) -> EngineResult<()>
where
    S: SettlementStore + ?Sized,
{
    let score = require_score(&rec.game_id, rec.period, game.score(rec.period))?;

    let snapshots = store.load_closing_snapshots(&rec.game_id, rec.bet_type, rec.period, game.commence_time)?;
    let closing = select_closing(&snapshots, &config.reference_book, &config.alternate_books);
    let closing_price = closing.and_then(|s| s.line.price_for(rec.side));

    let (price, price_source) = config
        .price_policy
        .resolve(rec.price.or(closing_price), rec.side)?;
    let outcome = resolve_outcome(rec.bet_type, rec.period, rec.side, rec.line, &score)?;
    let paid = settle_payout(outcome, price, rec.wager)?;

    let closing_line = closing.and_then(|s| s.line.line);
    let clv = match rec.bet_type {
        BetType::Moneyline => moneyline_clv(rec.price, closing_price),
        _ => closing_line_value(rec.bet_type, rec.side, rec.line, closing_line),
    };

    let record = SettlementRecord {
        status: outcome.into(),
        actual_result: describe_result(rec.bet_type, &score),
        actual_value: actual_result(rec.bet_type, &score),
        closing_line,
        closing_price,
        closing_book: closing.map(|s| s.bookmaker.clone()),
        clv: clv.map(|c| c.value),
        beat_closing: clv.map(|c| c.beat_closing),
        price,
        price_source,
        pnl: paid.profit,
        settled_at: Utc::now(),
    };

    if store.persist_settlement(rec.id, &record)? {
        if closing.is_none() {
            let gap = EngineError::MissingClosingSnapshot {
                game_id: rec.game_id.clone(),
                bet_type: rec.bet_type,
                period: rec.period,
            };
            warn!(id = rec.id, "{}; settled without CLV", gap);
            summary.missing_closing_line += 1;
        }
        summary.settled += 1;
        match outcome {
            BetOutcome::Win => summary.wins += 1,
            BetOutcome::Loss => summary.losses += 1,
            BetOutcome::Push => summary.pushes += 1,
        }
        summary.total_pnl += paid.profit;
        debug!(id = rec.id, status = record.status.as_str(), pnl = %paid.profit, "settled");
    } else {
        summary.already_settled += 1;
    }
    Ok(())
}
