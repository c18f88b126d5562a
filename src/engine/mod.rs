//! Pure betting core: market values, bet evaluation, outcome resolution,
//! wager sizing and closing line value. Nothing here does I/O.
pub mod clv;
pub mod evaluator;
pub mod kelly;
pub mod market;
pub mod odds;
pub mod resolver;

pub use clv::{closing_line_value, moneyline_clv, Clv, ClvMetrics};
pub use evaluator::{evaluate, Evaluation, Gates, SkipReason};
pub use kelly::KellySizer;
pub use market::{
    BetOutcome, BetSide, BetType, GamePeriod, LineKind, LineSource, MarketBoard, MarketLine,
    PeriodScore, Prediction,
};
pub use odds::{PricePolicy, PriceSource};
pub use resolver::{actual_result, describe_result, require_score, resolve_outcome, settle_payout};
