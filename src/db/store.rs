//! Logical read/write contracts the orchestrators depend on. `Database`
//! implements all of them; tests may substitute their own.
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

use super::models::{
    BacktestRunInfo, BookSnapshot, GameRecord, RecommendationRecord, SettledRecommendation,
    SettlementRecord,
};
use crate::backtest::BacktestRun;
use crate::engine::{BetType, GamePeriod};

pub trait GameStore: Send + Sync {
    /// Games dated within `[start, end]` with predictions from `model_version`.
    fn load_historical_games(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        model_version: &str,
    ) -> Result<Vec<GameRecord>>;

    fn load_final_game(&self, game_id: &str) -> Result<Option<GameRecord>>;
}

pub trait SettlementStore: Send + Sync {
    /// Recommendations still in `pending` or `placed`.
    fn load_pending_recommendations(&self, model_version: &str) -> Result<Vec<RecommendationRecord>>;

    /// Snapshots for one market captured at or before `cutoff` (if given),
    /// newest first.
    fn load_closing_snapshots(
        &self,
        game_id: &str,
        bet_type: BetType,
        period: GamePeriod,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<BookSnapshot>>;

    /// Writes the terminal fields only if the recommendation is still
    /// non-terminal. Returns whether this call performed the transition.
    fn persist_settlement(&self, id: i64, record: &SettlementRecord) -> Result<bool>;

    fn load_settled_since(&self, since: DateTime<Utc>) -> Result<Vec<SettledRecommendation>>;
}

pub trait BacktestStore: Send + Sync {
    fn persist_backtest(&self, run: &BacktestRun) -> Result<i64>;

    fn list_backtests(&self, limit: i64) -> Result<Vec<BacktestRunInfo>>;
}

/// State of a lock row as seen by a caller that failed to take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderState {
    Free,
    Alive,
    /// The holding process is gone. `token` identifies the stale row.
    Dead { token: i64 },
}

/// Named advisory lock. Every acquisition gets its own token; releases and
/// evictions only ever delete the row carrying the token they name.
pub trait LockProvider: Send + Sync {
    /// Try to take `key`, waiting at most `wait`. Returns the holder token.
    fn acquire_lock(&self, key: i64, purpose: &str, wait: Duration) -> Result<Option<i64>>;

    /// Delete the row for `key` only if it still carries `token`.
    fn release_lock(&self, key: i64, token: i64) -> Result<bool>;

    fn holder_state(&self, key: i64) -> Result<HolderState>;
}
