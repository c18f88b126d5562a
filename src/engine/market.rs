use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market a bet is placed on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    Spread,
    Total,
    Moneyline,
}

impl BetType {
    pub const ALL: [BetType; 3] = [BetType::Spread, BetType::Total, BetType::Moneyline];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Spread => "spread",
            BetType::Total => "total",
            BetType::Moneyline => "moneyline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spread" | "spreads" => Some(BetType::Spread),
            "total" | "totals" => Some(BetType::Total),
            "moneyline" | "h2h" => Some(BetType::Moneyline),
            _ => None,
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slice of the game a market settles on. Orthogonal to [`BetType`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum GamePeriod {
    #[serde(rename = "full")]
    #[value(name = "full")]
    FullGame,
    #[serde(rename = "1h")]
    #[value(name = "1h")]
    FirstHalf,
    #[serde(rename = "1q")]
    #[value(name = "1q")]
    FirstQuarter,
}

impl GamePeriod {
    pub const ALL: [GamePeriod; 3] = [
        GamePeriod::FullGame,
        GamePeriod::FirstHalf,
        GamePeriod::FirstQuarter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GamePeriod::FullGame => "full",
            GamePeriod::FirstHalf => "1h",
            GamePeriod::FirstQuarter => "1q",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" | "fg" | "full_game" => Some(GamePeriod::FullGame),
            "1h" | "h1" | "first_half" => Some(GamePeriod::FirstHalf),
            "1q" | "q1" | "first_quarter" => Some(GamePeriod::FirstQuarter),
            _ => None,
        }
    }
}

impl fmt::Display for GamePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of a market. HOME/AWAY for spread and moneyline, OVER/UNDER for totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    Home,
    Away,
    Over,
    Under,
}

impl BetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetSide::Home => "home",
            BetSide::Away => "away",
            BetSide::Over => "over",
            BetSide::Under => "under",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "home" => Some(BetSide::Home),
            "away" => Some(BetSide::Away),
            "over" => Some(BetSide::Over),
            "under" => Some(BetSide::Under),
            _ => None,
        }
    }

    pub fn applies_to(&self, bet_type: BetType) -> bool {
        match bet_type {
            BetType::Spread | BetType::Moneyline => matches!(self, BetSide::Home | BetSide::Away),
            BetType::Total => matches!(self, BetSide::Over | BetSide::Under),
        }
    }
}

impl fmt::Display for BetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a bet. Assigned once, never revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Win,
    Loss,
    Push,
}

/// Which recorded value of a market a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Opening,
    Consensus,
    Closing,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Opening => "opening",
            LineKind::Consensus => "consensus",
            LineKind::Closing => "closing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "opening" => Some(LineKind::Opening),
            "consensus" => Some(LineKind::Consensus),
            "closing" => Some(LineKind::Closing),
            _ => None,
        }
    }
}

/// Line a backtest evaluates predictions against. Opening lines avoid
/// leaking post-open market information into the simulated decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineSource {
    #[default]
    Opening,
    Consensus,
}

impl LineSource {
    pub fn kind(&self) -> LineKind {
        match self {
            LineSource::Opening => LineKind::Opening,
            LineSource::Consensus => LineKind::Consensus,
        }
    }
}

/// One recorded market value: a home-relative line plus American prices.
///
/// Spread lines are home margin thresholds (HOME covers when
/// `home_margin > line`). Moneyline markets carry no line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketLine {
    pub line: Option<f64>,
    pub home_price: Option<i32>,
    pub away_price: Option<i32>,
    pub over_price: Option<i32>,
    pub under_price: Option<i32>,
    /// Single price some books quote for both sides of a spread or total.
    pub shared_price: Option<i32>,
}

impl MarketLine {
    pub fn price_for(&self, side: BetSide) -> Option<i32> {
        let quoted = match side {
            BetSide::Home => self.home_price,
            BetSide::Away => self.away_price,
            BetSide::Over => self.over_price,
            BetSide::Under => self.under_price,
        };
        quoted.or(self.shared_price)
    }
}

/// Opening, consensus and closing values of one (bet type, period) market.
/// The three are never conflated; any of them may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBoard {
    pub bet_type: BetType,
    pub period: GamePeriod,
    pub opening: Option<MarketLine>,
    pub consensus: Option<MarketLine>,
    pub closing: Option<MarketLine>,
}

impl MarketBoard {
    pub fn new(bet_type: BetType, period: GamePeriod) -> Self {
        Self {
            bet_type,
            period,
            opening: None,
            consensus: None,
            closing: None,
        }
    }

    pub fn get(&self, kind: LineKind) -> Option<&MarketLine> {
        match kind {
            LineKind::Opening => self.opening.as_ref(),
            LineKind::Consensus => self.consensus.as_ref(),
            LineKind::Closing => self.closing.as_ref(),
        }
    }

    pub fn set(&mut self, kind: LineKind, line: MarketLine) {
        match kind {
            LineKind::Opening => self.opening = Some(line),
            LineKind::Consensus => self.consensus = Some(line),
            LineKind::Closing => self.closing = Some(line),
        }
    }
}

/// Model output for one market: margin (spread), total points (total) or
/// home win probability (moneyline), plus a confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    pub confidence: f64,
}

/// Final score of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodScore {
    pub home: i32,
    pub away: i32,
}

impl PeriodScore {
    pub fn new(home: i32, away: i32) -> Self {
        Self { home, away }
    }

    /// Home-relative margin.
    pub fn margin(&self) -> i32 {
        self.home - self.away
    }

    pub fn total(&self) -> i32 {
        self.home + self.away
    }
}
