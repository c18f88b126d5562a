use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

use crate::backtest::BacktestConfig;
use crate::engine::{BetType, GamePeriod, KellySizer, LineSource, PricePolicy};
use crate::settlement::SettlementConfig;

/// College sports backtesting and settlement engine
#[derive(Parser, Debug, Clone)]
#[command(name = "edgebook", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "edgebook.db", global = true)]
    pub database_path: String,

    /// Model version whose predictions and recommendations are used
    #[arg(long, env = "MODEL_VERSION", default_value = "default", global = true)]
    pub model_version: String,

    /// Bookmaker whose closing snapshot is preferred for settlement
    #[arg(long, env = "REFERENCE_BOOK", default_value = "pinnacle", global = true)]
    pub reference_book: String,

    /// Fallback bookmakers, in order, when the reference book has no snapshot
    #[arg(
        long,
        env = "ALTERNATE_BOOKS",
        value_delimiter = ',',
        default_value = "bovada",
        global = true
    )]
    pub alternate_books: Vec<String>,

    /// American price assumed when a market price is missing
    #[arg(long, env = "DEFAULT_PRICE", default_value = "-110", allow_hyphen_values = true, global = true)]
    pub default_price: i32,

    /// Treat missing market prices as errors instead of assuming the default
    #[arg(long, env = "STRICT_PRICES", default_value = "false", global = true)]
    pub strict_prices: bool,

    /// Seconds to wait for a run lock before reporting busy
    #[arg(long, env = "LOCK_WAIT_SECS", default_value = "2", global = true)]
    pub lock_wait_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Replay historical games and report simulated performance
    Backtest(BacktestArgs),
    /// Settle pending recommendations whose games are final
    Settle,
    /// Settled performance over a lookback window
    Report {
        #[arg(long, default_value = "30")]
        days: i64,
    },
    /// Load games, snapshots and recommendations from a JSON bundle
    Import { path: PathBuf },
    /// Serve the JSON API and settle on a schedule
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Run name
    #[arg(long, default_value = "backtest")]
    pub name: String,

    #[arg(long)]
    pub start: NaiveDate,

    #[arg(long)]
    pub end: NaiveDate,

    /// Markets to test
    #[arg(long, value_enum, value_delimiter = ',', default_value = "spread,total,moneyline")]
    pub bet_types: Vec<BetType>,

    /// Periods to test
    #[arg(long, value_enum, value_delimiter = ',', default_value = "full,1h,1q")]
    pub periods: Vec<GamePeriod>,

    #[arg(long, default_value = "0.0")]
    pub min_confidence: f64,

    /// Minimum edge (points for spread/total, probability for moneyline)
    #[arg(long, default_value = "0.0")]
    pub min_edge: f64,

    /// Maximum wager per bet
    #[arg(long, default_value = "100")]
    pub max_risk: Decimal,

    /// Wager of one unit
    #[arg(long, default_value = "100")]
    pub unit_size: Decimal,

    /// Line the evaluator bets against
    #[arg(long, value_enum, default_value = "opening")]
    pub line_source: LineSource,

    /// Fractional Kelly multiplier
    #[arg(long, default_value = "0.25")]
    pub kelly_multiplier: f64,

    /// Maximum bankroll fraction per bet
    #[arg(long, default_value = "0.10")]
    pub max_fraction: f64,

    /// Store the run in the database
    #[arg(long, default_value = "false")]
    pub persist: bool,

    /// Write the run as JSON to this path
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Seconds between scheduled settlement runs (0 disables)
    #[arg(long, env = "SETTLE_INTERVAL_SECS", default_value = "900")]
    pub settle_interval_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_price == 0 || (-100 < self.default_price && self.default_price < 100) {
            anyhow::bail!("default_price must be an American price (<= -100 or >= 100)");
        }
        if self.model_version.trim().is_empty() {
            anyhow::bail!("model_version must not be empty");
        }
        if self.reference_book.trim().is_empty() {
            anyhow::bail!("reference_book must not be empty");
        }
        match &self.command {
            Command::Backtest(args) => args.validate()?,
            Command::Report { days } if *days < 0 => anyhow::bail!("days must not be negative"),
            _ => {}
        }
        Ok(())
    }

    pub fn price_policy(&self) -> PricePolicy {
        if self.strict_prices {
            PricePolicy::Strict
        } else {
            PricePolicy::DefaultTo(self.default_price)
        }
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            model_version: self.model_version.clone(),
            reference_book: self.reference_book.clone(),
            alternate_books: self.alternate_books.clone(),
            price_policy: self.price_policy(),
            lock_wait: self.lock_wait(),
        }
    }

    pub fn backtest(&self, args: &BacktestArgs) -> BacktestConfig {
        let mut bt = BacktestConfig::new(&args.name, &self.model_version, args.start, args.end);
        bt.bet_types = args.bet_types.clone();
        bt.periods = args.periods.clone();
        bt.min_confidence = args.min_confidence;
        bt.min_edge = args.min_edge;
        bt.max_risk = args.max_risk;
        bt.unit_size = args.unit_size;
        bt.line_source = args.line_source;
        bt.price_policy = self.price_policy();
        bt.sizer = KellySizer {
            multiplier: args.kelly_multiplier,
            max_fraction: args.max_fraction,
        };
        bt
    }
}

impl BacktestArgs {
    fn validate(&self) -> anyhow::Result<()> {
        if self.start > self.end {
            anyhow::bail!("start date {} is after end date {}", self.start, self.end);
        }
        if self.bet_types.is_empty() || self.periods.is_empty() {
            anyhow::bail!("at least one bet type and one period are required");
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            anyhow::bail!("min_confidence must be between 0.0 and 1.0");
        }
        if self.min_edge < 0.0 {
            anyhow::bail!("min_edge must not be negative");
        }
        if self.unit_size <= Decimal::ZERO || self.max_risk <= Decimal::ZERO {
            anyhow::bail!("unit_size and max_risk must be positive");
        }
        if !(0.0..=1.0).contains(&self.kelly_multiplier) {
            anyhow::bail!("kelly_multiplier must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.max_fraction) {
            anyhow::bail!("max_fraction must be between 0.0 and 1.0");
        }
        Ok(())
    }
}
