//! JSON interchange: backtest run export and fixture import.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::backtest::BacktestRun;
use crate::db::models::{BookSnapshot, GameRecord, RecommendationRecord};
use crate::db::Database;
use crate::engine::{BetType, GamePeriod};

pub fn write_run(run: &BacktestRun, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    fs::write(path, json).with_context(|| format!("writing backtest export to {}", path.display()))?;
    info!("Backtest exported to {}", path.display());
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub game_id: String,
    pub bet_type: BetType,
    pub period: GamePeriod,
    #[serde(flatten)]
    pub snapshot: BookSnapshot,
}

/// Games, book snapshots and recommendations in one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub games: Vec<GameRecord>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotEntry>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportCounts {
    pub games: usize,
    pub snapshots: usize,
    pub recommendations: usize,
}

/// Load a bundle into the store, tagging predictions with `model_version`.
pub fn import_bundle(db: &Database, path: &Path, model_version: &str) -> Result<ImportCounts> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let bundle: ImportBundle =
        serde_json::from_str(&raw).with_context(|| format!("parsing import bundle {}", path.display()))?;

    for game in &bundle.games {
        db.upsert_game(game, model_version)?;
    }
    for entry in &bundle.snapshots {
        db.insert_snapshot(&entry.game_id, entry.bet_type, entry.period, &entry.snapshot)?;
    }
    for rec in &bundle.recommendations {
        db.insert_recommendation(rec)?;
    }
    let counts = ImportCounts {
        games: bundle.games.len(),
        snapshots: bundle.snapshots.len(),
        recommendations: bundle.recommendations.len(),
    };
    info!(?counts, "import complete");
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{run_backtest, BacktestConfig};
    use crate::db::models::{GameStatus, ModelPrediction};
    use crate::db::GameStore;
    use crate::engine::{LineKind, MarketBoard, MarketLine, PeriodScore, Prediction};
    use chrono::NaiveDate;

    fn read_run(path: &Path) -> BacktestRun {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("edgebook-{}-{}", std::process::id(), name))
    }

    fn game() -> GameRecord {
        let mut board = MarketBoard::new(BetType::Total, GamePeriod::FullGame);
        board.set(
            LineKind::Opening,
            MarketLine {
                line: Some(141.5),
                over_price: Some(-108),
                under_price: Some(-112),
                ..Default::default()
            },
        );
        board.set(
            LineKind::Closing,
            MarketLine {
                line: Some(139.5),
                ..Default::default()
            },
        );
        GameRecord {
            game_id: "g9".into(),
            game_date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            home_team_id: "houston".into(),
            away_team_id: "tcu".into(),
            status: GameStatus::Final,
            commence_time: None,
            full_game: Some(PeriodScore::new(66, 61)),
            first_half: None,
            first_quarter: None,
            predictions: vec![ModelPrediction {
                bet_type: BetType::Total,
                period: GamePeriod::FullGame,
                prediction: Prediction {
                    value: 135.25,
                    confidence: 0.57,
                },
            }],
            markets: vec![board],
        }
    }

    #[test]
    fn test_export_round_trips_losslessly() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_game(&game(), "v1").unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let run = run_backtest(&db, &BacktestConfig::new("export", "v1", start, end)).unwrap();
        assert_eq!(run.results.len(), 1);

        let path = temp_path("run.json");
        write_run(&run, &path).unwrap();
        let back = read_run(&path);
        fs::remove_file(&path).ok();
        assert_eq!(back, run);
    }

    #[test]
    fn test_import_bundle_populates_store() {
        let bundle = ImportBundle {
            games: vec![game()],
            ..Default::default()
        };
        let path = temp_path("bundle.json");
        fs::write(&path, serde_json::to_string(&bundle).unwrap()).unwrap();

        let db = Database::open_in_memory().unwrap();
        let counts = import_bundle(&db, &path, "v1").unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(counts.games, 1);
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let games = db.load_historical_games(start, start.succ_opt().unwrap().succ_opt().unwrap(), "v1").unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].predictions.len(), 1);
    }
}
