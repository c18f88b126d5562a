use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::{
    BetOutcome, BetSide, BetType, GamePeriod, MarketBoard, MarketLine, PeriodScore, Prediction,
    PriceSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" | "pre" => Some(GameStatus::Scheduled),
            "in_progress" | "live" => Some(GameStatus::InProgress),
            "final" | "completed" => Some(GameStatus::Final),
            _ => None,
        }
    }
}

/// Model output attached to a game for one market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub prediction: Prediction,
}

/// A game with whatever scores, predictions and market values were recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub home_team_id: String,
    pub away_team_id: String,
    pub status: GameStatus,
    pub commence_time: Option<DateTime<Utc>>,
    pub full_game: Option<PeriodScore>,
    pub first_half: Option<PeriodScore>,
    pub first_quarter: Option<PeriodScore>,
    pub predictions: Vec<ModelPrediction>,
    pub markets: Vec<MarketBoard>,
}

impl GameRecord {
    pub fn score(&self, period: GamePeriod) -> Option<PeriodScore> {
        match period {
            GamePeriod::FullGame => self.full_game,
            GamePeriod::FirstHalf => self.first_half,
            GamePeriod::FirstQuarter => self.first_quarter,
        }
    }

    pub fn prediction(&self, bet_type: BetType, period: GamePeriod) -> Option<&Prediction> {
        self.predictions
            .iter()
            .find(|p| p.bet_type == bet_type && p.period == period)
            .map(|p| &p.prediction)
    }

    pub fn market(&self, bet_type: BetType, period: GamePeriod) -> Option<&MarketBoard> {
        self.markets
            .iter()
            .find(|m| m.bet_type == bet_type && m.period == period)
    }

    /// A game is usable by a backtest when it has a final score, at least one
    /// prediction and at least one recorded market.
    pub fn has_required_fields(&self) -> bool {
        self.full_game.is_some() && !self.predictions.is_empty() && !self.markets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Placed,
    Won,
    Lost,
    Push,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Placed => "placed",
            RecommendationStatus::Won => "won",
            RecommendationStatus::Lost => "lost",
            RecommendationStatus::Push => "push",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(RecommendationStatus::Pending),
            "placed" => Some(RecommendationStatus::Placed),
            "won" => Some(RecommendationStatus::Won),
            "lost" => Some(RecommendationStatus::Lost),
            "push" => Some(RecommendationStatus::Push),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecommendationStatus::Won | RecommendationStatus::Lost | RecommendationStatus::Push
        )
    }
}

impl From<BetOutcome> for RecommendationStatus {
    fn from(outcome: BetOutcome) -> Self {
        match outcome {
            BetOutcome::Win => RecommendationStatus::Won,
            BetOutcome::Loss => RecommendationStatus::Lost,
            BetOutcome::Push => RecommendationStatus::Push,
        }
    }
}

/// A live betting recommendation awaiting (or past) settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: i64,
    pub game_id: String,
    pub model_version: String,
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub side: BetSide,
    /// Pick-perspective line. `None` for moneylines.
    pub line: Option<f64>,
    /// Price recorded when the recommendation was issued.
    pub price: Option<i32>,
    pub wager: Decimal,
    pub edge: f64,
    pub confidence: f64,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
}

/// One book's market value for a (game, bet type, period) at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bookmaker: String,
    pub captured_at: DateTime<Utc>,
    pub line: MarketLine,
}

/// Terminal fields written onto a recommendation in a single update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub status: RecommendationStatus,
    pub actual_result: String,
    pub actual_value: f64,
    pub closing_line: Option<f64>,
    pub closing_price: Option<i32>,
    pub closing_book: Option<String>,
    pub clv: Option<f64>,
    pub beat_closing: Option<bool>,
    pub price: i32,
    pub price_source: PriceSource,
    pub pnl: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Settled recommendation as read back for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledRecommendation {
    pub id: i64,
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub status: RecommendationStatus,
    pub wager: Decimal,
    pub pnl: Decimal,
    pub clv: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One simulated bet of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetResult {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub home_team_id: String,
    pub away_team_id: String,
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub side: BetSide,
    /// Pick-perspective line. `None` for moneylines.
    pub bet_line: Option<f64>,
    pub price: i32,
    pub price_source: PriceSource,
    pub predicted_value: f64,
    pub confidence: f64,
    pub edge: f64,
    pub wager: Decimal,
    /// Home margin, total points, or +1/-1/0 for moneylines.
    pub actual_result: f64,
    pub outcome: BetOutcome,
    pub payout: Decimal,
    pub profit: Decimal,
    pub opening_line: Option<f64>,
    pub closing_line: Option<f64>,
    pub clv: Option<f64>,
    pub beat_closing: Option<bool>,
}

/// Listing row for a persisted backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRunInfo {
    pub id: i64,
    pub name: String,
    pub model_version: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_bets: i64,
    pub net_profit: Decimal,
    pub roi: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LineKind;

    fn game() -> GameRecord {
        let mut board = MarketBoard::new(BetType::Spread, GamePeriod::FirstHalf);
        board.set(
            LineKind::Opening,
            MarketLine {
                line: Some(2.5),
                ..Default::default()
            },
        );
        GameRecord {
            game_id: "401".into(),
            game_date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            home_team_id: "duke".into(),
            away_team_id: "unc".into(),
            status: GameStatus::Final,
            commence_time: None,
            full_game: Some(PeriodScore::new(80, 77)),
            first_half: None,
            first_quarter: None,
            predictions: vec![ModelPrediction {
                bet_type: BetType::Spread,
                period: GamePeriod::FirstHalf,
                prediction: Prediction {
                    value: 4.0,
                    confidence: 0.6,
                },
            }],
            markets: vec![board],
        }
    }

    #[test]
    fn test_missing_period_score_is_not_full_game() {
        let g = game();
        assert!(g.score(GamePeriod::FullGame).is_some());
        assert!(g.score(GamePeriod::FirstHalf).is_none());
    }

    #[test]
    fn test_lookups_by_market() {
        let g = game();
        assert!(g.prediction(BetType::Spread, GamePeriod::FirstHalf).is_some());
        assert!(g.prediction(BetType::Spread, GamePeriod::FullGame).is_none());
        assert!(g.market(BetType::Total, GamePeriod::FirstHalf).is_none());
        assert!(g.has_required_fields());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!RecommendationStatus::Pending.is_terminal());
        assert!(!RecommendationStatus::Placed.is_terminal());
        assert!(RecommendationStatus::from(BetOutcome::Push).is_terminal());
        assert_eq!(RecommendationStatus::parse("WON"), Some(RecommendationStatus::Won));
    }
}
