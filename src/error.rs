use chrono::NaiveDate;
use thiserror::Error;

use crate::engine::{BetSide, BetType, GamePeriod};

/// Failures raised by the betting core.
///
/// Per-bet variants (`MissingMarketField`, `MissingResult`, `MissingOddsPrice`)
/// are caught by the orchestrators and tallied as skips. `DatasetEmptyAfterFiltering`
/// aborts a backtest run. `LockUnavailable` is surfaced as a busy result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid American odds price: {0}")]
    InvalidOdds(i32),

    #[error("missing market field '{field}' for {bet_type} {period}")]
    MissingMarketField {
        bet_type: BetType,
        period: GamePeriod,
        field: &'static str,
    },

    #[error("missing {period} result for game {game_id}")]
    MissingResult { game_id: String, period: GamePeriod },

    #[error("side {side} does not apply to {bet_type} markets")]
    SideMismatch { side: BetSide, bet_type: BetType },

    #[error("no odds price available for {side} and no default price policy")]
    MissingOddsPrice { side: BetSide },

    #[error("no closing snapshot for game {game_id} ({bet_type} {period})")]
    MissingClosingSnapshot {
        game_id: String,
        bet_type: BetType,
        period: GamePeriod,
    },

    #[error("no valid games between {start} and {end} after required-field filtering")]
    DatasetEmptyAfterFiltering { start: NaiveDate, end: NaiveDate },

    #[error("run lock {key} is held by another live run")]
    LockUnavailable { key: i64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_market() {
        let err = EngineError::MissingMarketField {
            bet_type: BetType::Spread,
            period: GamePeriod::FirstHalf,
            field: "line",
        };
        assert_eq!(err.to_string(), "missing market field 'line' for spread 1h");
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: EngineError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
    }
}
