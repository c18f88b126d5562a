use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod models;
pub mod store;
use models::*;
pub use store::{BacktestStore, GameStore, HolderState, LockProvider, SettlementStore};

use crate::backtest::BacktestRun;
use crate::engine::{BetType, GamePeriod, LineKind, MarketBoard, MarketLine, PeriodScore, Prediction};

/// Attempts for a statement that keeps hitting SQLITE_BUSY / SQLITE_LOCKED.
const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 25;
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Thread-safe SQLite store (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(SCHEMA_SQL))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run `op`, retrying transient busy/locked failures with exponential
    /// backoff plus jitter. The mutex is released between attempts.
    fn with_conn<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let mut conn = self.lock()?;
                op(&mut conn)
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff(attempt);
                    warn!(attempt, ?delay, "SQLite busy, retrying: {}", e);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    /// Insert or replace a game with its predictions and market lines.
    pub fn upsert_game(&self, game: &GameRecord, model_version: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let (h, a) = split_score(game.full_game);
            let (h1, a1) = split_score(game.first_half);
            let (hq, aq) = split_score(game.first_quarter);
            tx.execute(
                "INSERT INTO games (
                    game_id, game_date, home_team_id, away_team_id, status, commence_time,
                    home_score, away_score, home_score_1h, away_score_1h,
                    home_score_1q, away_score_1q
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
                 ON CONFLICT(game_id) DO UPDATE SET
                    game_date = excluded.game_date,
                    home_team_id = excluded.home_team_id,
                    away_team_id = excluded.away_team_id,
                    status = excluded.status,
                    commence_time = excluded.commence_time,
                    home_score = excluded.home_score,
                    away_score = excluded.away_score,
                    home_score_1h = excluded.home_score_1h,
                    away_score_1h = excluded.away_score_1h,
                    home_score_1q = excluded.home_score_1q,
                    away_score_1q = excluded.away_score_1q",
                params![
                    game.game_id,
                    game.game_date,
                    game.home_team_id,
                    game.away_team_id,
                    game.status.as_str(),
                    game.commence_time,
                    h,
                    a,
                    h1,
                    a1,
                    hq,
                    aq,
                ],
            )?;
            for p in &game.predictions {
                tx.execute(
                    "INSERT OR REPLACE INTO predictions
                        (game_id, model_version, bet_type, period, value, confidence)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    params![
                        game.game_id,
                        model_version,
                        p.bet_type.as_str(),
                        p.period.as_str(),
                        p.prediction.value,
                        p.prediction.confidence,
                    ],
                )?;
            }
            for board in &game.markets {
                for kind in [LineKind::Opening, LineKind::Consensus, LineKind::Closing] {
                    if let Some(line) = board.get(kind) {
                        tx.execute(
                            "INSERT OR REPLACE INTO market_lines (
                                game_id, bet_type, period, kind, line, home_price,
                                away_price, over_price, under_price, shared_price
                             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                            params![
                                game.game_id,
                                board.bet_type.as_str(),
                                board.period.as_str(),
                                kind.as_str(),
                                line.line,
                                line.home_price,
                                line.away_price,
                                line.over_price,
                                line.under_price,
                                line.shared_price,
                            ],
                        )?;
                    }
                }
            }
            tx.commit()
        })
    }

    /// Record one book's quote for a market.
    pub fn insert_snapshot(
        &self,
        game_id: &str,
        bet_type: BetType,
        period: GamePeriod,
        snapshot: &BookSnapshot,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO odds_snapshots (
                    game_id, bookmaker, bet_type, period, line, home_price, away_price,
                    over_price, under_price, shared_price, captured_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    game_id,
                    snapshot.bookmaker,
                    bet_type.as_str(),
                    period.as_str(),
                    snapshot.line.line,
                    snapshot.line.home_price,
                    snapshot.line.away_price,
                    snapshot.line.over_price,
                    snapshot.line.under_price,
                    snapshot.line.shared_price,
                    snapshot.captured_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Insert a recommendation. The record's `id` is ignored.
    pub fn insert_recommendation(&self, rec: &RecommendationRecord) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO betting_recommendations (
                    game_id, model_version, bet_type, period, side, line, price,
                    wager, edge, confidence, status, created_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![
                    rec.game_id,
                    rec.model_version,
                    rec.bet_type.as_str(),
                    rec.period.as_str(),
                    rec.side.as_str(),
                    rec.line,
                    rec.price,
                    rec.wager.to_string(),
                    rec.edge,
                    rec.confidence,
                    rec.status.as_str(),
                    rec.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_recommendation(&self, id: i64) -> Result<Option<(RecommendationRecord, Option<SettlementRecord>)>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {REC_COLUMNS}, {SETTLEMENT_COLUMNS} FROM betting_recommendations WHERE id = ?1"),
                params![id],
                |row| {
                    let rec = map_recommendation(row)?;
                    let settlement = if rec.status.is_terminal() {
                        Some(map_settlement(row, REC_COLUMN_COUNT, rec.status)?)
                    } else {
                        None
                    };
                    Ok((rec, settlement))
                },
            )
            .optional()
        })
    }

    fn load_markets(
        conn: &Connection,
        filter_sql: &str,
        filter: &[&dyn rusqlite::ToSql],
    ) -> rusqlite::Result<Vec<(String, BetType, GamePeriod, LineKind, MarketLine)>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT m.game_id, m.bet_type, m.period, m.kind, m.line, m.home_price,
                    m.away_price, m.over_price, m.under_price, m.shared_price
             FROM market_lines m JOIN games g ON g.game_id = m.game_id
             WHERE {filter_sql}"
        ))?;
        let rows = stmt
            .query_map(filter, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    enum_col(row, 1, BetType::parse)?,
                    enum_col(row, 2, GamePeriod::parse)?,
                    enum_col(row, 3, LineKind::parse)?,
                    map_market_line(row, 4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn attach_market(game: &mut GameRecord, bet_type: BetType, period: GamePeriod, kind: LineKind, line: MarketLine) {
    let idx = match game
        .markets
        .iter()
        .position(|b| b.bet_type == bet_type && b.period == period)
    {
        Some(idx) => idx,
        None => {
            game.markets.push(MarketBoard::new(bet_type, period));
            game.markets.len() - 1
        }
    };
    game.markets[idx].set(kind, line);
}

impl GameStore for Database {
    fn load_historical_games(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        model_version: &str,
    ) -> Result<Vec<GameRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GAME_COLUMNS} FROM games
                 WHERE game_date BETWEEN ?1 AND ?2
                 ORDER BY game_date, game_id"
            ))?;
            let mut games = stmt
                .query_map(params![start, end], map_game)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let index: HashMap<String, usize> = games
                .iter()
                .enumerate()
                .map(|(i, g)| (g.game_id.clone(), i))
                .collect();

            let mut stmt = conn.prepare(
                "SELECT p.game_id, p.bet_type, p.period, p.value, p.confidence
                 FROM predictions p JOIN games g ON g.game_id = p.game_id
                 WHERE g.game_date BETWEEN ?1 AND ?2 AND p.model_version = ?3",
            )?;
            let predictions = stmt
                .query_map(params![start, end, model_version], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        ModelPrediction {
                            bet_type: enum_col(row, 1, BetType::parse)?,
                            period: enum_col(row, 2, GamePeriod::parse)?,
                            prediction: Prediction {
                                value: row.get(3)?,
                                confidence: row.get(4)?,
                            },
                        },
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (game_id, p) in predictions {
                if let Some(&i) = index.get(&game_id) {
                    games[i].predictions.push(p);
                }
            }

            let markets = Self::load_markets(conn, "g.game_date BETWEEN ?1 AND ?2", params![start, end])?;
            for (game_id, bet_type, period, kind, line) in markets {
                if let Some(&i) = index.get(&game_id) {
                    attach_market(&mut games[i], bet_type, period, kind, line);
                }
            }
            Ok(games)
        })
    }

    fn load_final_game(&self, game_id: &str) -> Result<Option<GameRecord>> {
        self.with_conn(|conn| {
            let game = conn
                .query_row(
                    &format!("SELECT {GAME_COLUMNS} FROM games WHERE game_id = ?1"),
                    params![game_id],
                    map_game,
                )
                .optional()?;
            let Some(mut game) = game.filter(|g| g.status == GameStatus::Final) else {
                return Ok(None);
            };
            for (_, bet_type, period, kind, line) in Self::load_markets(conn, "m.game_id = ?1", params![game_id])? {
                attach_market(&mut game, bet_type, period, kind, line);
            }
            Ok(Some(game))
        })
    }
}

impl SettlementStore for Database {
    fn load_pending_recommendations(&self, model_version: &str) -> Result<Vec<RecommendationRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REC_COLUMNS} FROM betting_recommendations
                 WHERE status IN ('pending','placed') AND model_version = ?1
                 ORDER BY id"
            ))?;
            let recs = stmt
                .query_map(params![model_version], map_recommendation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(recs)
        })
    }

    fn load_closing_snapshots(
        &self,
        game_id: &str,
        bet_type: BetType,
        period: GamePeriod,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<BookSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT bookmaker, captured_at, line, home_price, away_price,
                        over_price, under_price, shared_price
                 FROM odds_snapshots
                 WHERE game_id = ?1 AND bet_type = ?2 AND period = ?3
                   AND (?4 IS NULL OR captured_at <= ?4)
                 ORDER BY captured_at DESC, id DESC",
            )?;
            let snaps = stmt
                .query_map(
                    params![game_id, bet_type.as_str(), period.as_str(), cutoff],
                    |row| {
                        Ok(BookSnapshot {
                            bookmaker: row.get(0)?,
                            captured_at: row.get(1)?,
                            line: map_market_line(row, 2)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(snaps)
        })
    }

    fn persist_settlement(&self, id: i64, record: &SettlementRecord) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE betting_recommendations SET
                    status = ?1, actual_result = ?2, actual_value = ?3,
                    closing_line = ?4, closing_price = ?5, closing_book = ?6,
                    clv = ?7, beat_closing = ?8, settled_price = ?9, price_source = ?10,
                    pnl = ?11, settled_at = ?12
                 WHERE id = ?13 AND status IN ('pending','placed')",
                params![
                    record.status.as_str(),
                    record.actual_result,
                    record.actual_value,
                    record.closing_line,
                    record.closing_price,
                    record.closing_book,
                    record.clv,
                    record.beat_closing,
                    record.price,
                    record.price_source.as_str(),
                    record.pnl.to_string(),
                    record.settled_at,
                    id,
                ],
            )
        })?;
        debug!(id, changed, "settlement update");
        Ok(changed == 1)
    }

    fn load_settled_since(&self, since: DateTime<Utc>) -> Result<Vec<SettledRecommendation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bet_type, period, status, wager, pnl, clv, created_at
                 FROM betting_recommendations
                 WHERE status IN ('won','lost','push') AND created_at >= ?1
                 ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map(params![since], |row| {
                    Ok(SettledRecommendation {
                        id: row.get(0)?,
                        bet_type: enum_col(row, 1, BetType::parse)?,
                        period: enum_col(row, 2, GamePeriod::parse)?,
                        status: enum_col(row, 3, RecommendationStatus::parse)?,
                        wager: decimal_col(row, 4)?,
                        pnl: decimal_col(row, 5)?,
                        clv: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

impl BacktestStore for Database {
    fn persist_backtest(&self, run: &BacktestRun) -> Result<i64> {
        let config_json = serde_json::to_string(&run.config)?;
        let summary_json = serde_json::to_string(&run.summary)?;
        let results = run
            .results
            .iter()
            .map(|r| Ok((r, serde_json::to_string(r)?)))
            .collect::<Result<Vec<_>>>()?;
        let created_at = Utc::now();

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO backtest_runs (
                    name, model_version, start_date, end_date, total_bets,
                    net_profit, roi, config_json, summary_json, created_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    run.config.name,
                    run.config.model_version,
                    run.config.start_date,
                    run.config.end_date,
                    run.summary.total_bets as i64,
                    run.summary.net_profit.to_string(),
                    run.summary.roi,
                    config_json,
                    summary_json,
                    created_at,
                ],
            )?;
            let run_id = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO backtest_results (
                        run_id, game_id, bet_type, period, side, outcome, profit, result_json
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                )?;
                for (r, json) in &results {
                    stmt.execute(params![
                        run_id,
                        r.game_id,
                        r.bet_type.as_str(),
                        r.period.as_str(),
                        r.side.as_str(),
                        RecommendationStatus::from(r.outcome).as_str(),
                        r.profit.to_string(),
                        json,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(run_id)
        })
    }

    fn list_backtests(&self, limit: i64) -> Result<Vec<BacktestRunInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, model_version, start_date, end_date, total_bets,
                        net_profit, roi, created_at
                 FROM backtest_runs ORDER BY id DESC LIMIT ?1",
            )?;
            let runs = stmt
                .query_map(params![limit], |row| {
                    Ok(BacktestRunInfo {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        model_version: row.get(2)?,
                        start_date: row.get(3)?,
                        end_date: row.get(4)?,
                        total_bets: row.get(5)?,
                        net_profit: decimal_col(row, 6)?,
                        roi: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(runs)
        })
    }
}

impl LockProvider for Database {
    fn acquire_lock(&self, key: i64, purpose: &str, wait: Duration) -> Result<Option<i64>> {
        let deadline = Instant::now() + wait;
        let me = this_process();
        let token: i64 = rand::thread_rng().gen();
        loop {
            let inserted = self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO run_locks (
                        lock_key, purpose, holder_pid, holder_instance, holder_started,
                        holder_token, acquired_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![key, purpose, me.pid, me.instance, me.started, token, Utc::now()],
                )
            })?;
            if inserted == 1 {
                debug!(key, purpose, "run lock acquired");
                return Ok(Some(token));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    fn release_lock(&self, key: i64, token: i64) -> Result<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM run_locks WHERE lock_key = ?1 AND holder_token = ?2",
                params![key, token],
            )
        })?;
        debug!(key, released = deleted == 1, "run lock release");
        Ok(deleted == 1)
    }

    fn holder_state(&self, key: i64) -> Result<HolderState> {
        let row: Option<(i64, i64, Option<i64>, i64)> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT holder_pid, holder_instance, holder_started, holder_token
                 FROM run_locks WHERE lock_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
        })?;
        Ok(match row {
            None => HolderState::Free,
            Some((pid, instance, started, _)) if holder_alive(pid, instance, started) => HolderState::Alive,
            Some((_, _, _, token)) => HolderState::Dead { token },
        })
    }
}

#[cfg(test)]
impl Database {
    /// Plant a lock row as if another process held it.
    pub(crate) fn plant_lock(&self, key: i64, pid: i64, instance: i64, token: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO run_locks (
                    lock_key, purpose, holder_pid, holder_instance, holder_started,
                    holder_token, acquired_at
                 ) VALUES (?1, 'test', ?2, ?3, NULL, ?4, ?5)",
                params![key, pid, instance, token, Utc::now()],
            )
        })?;
        Ok(())
    }
}

/// Who holds a lock row. A pid alone is not enough: a restarted container
/// process usually gets the same pid back.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessIdentity {
    pub pid: i64,
    /// Random per process start.
    pub instance: i64,
    /// Start time in clock ticks since boot, where the platform exposes it.
    pub started: Option<i64>,
}

pub(crate) fn this_process() -> ProcessIdentity {
    static IDENTITY: OnceLock<ProcessIdentity> = OnceLock::new();
    *IDENTITY.get_or_init(|| {
        let pid = i64::from(std::process::id());
        ProcessIdentity {
            pid,
            instance: rand::thread_rng().gen(),
            started: process_start_time(pid),
        }
    })
}

/// Field 22 of `/proc/<pid>/stat`. `None` when the process does not exist
/// or the platform has no procfs.
fn process_start_time(pid: i64) -> Option<i64> {
    if !cfg!(target_os = "linux") || pid <= 0 {
        return None;
    }
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm (field 2) may contain spaces; fields after it start at 3
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(19)?.parse().ok()
}

fn holder_alive(pid: i64, instance: i64, started: Option<i64>) -> bool {
    let me = this_process();
    if pid == me.pid {
        return instance == me.instance;
    }
    if pid <= 0 {
        return false;
    }
    if cfg!(target_os = "linux") {
        match process_start_time(pid) {
            None => false,
            Some(now) => started.map_or(true, |s| s == now),
        }
    } else {
        true
    }
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..BASE_BACKOFF_MS);
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt) + jitter)
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const GAME_COLUMNS: &str = "game_id, game_date, home_team_id, away_team_id, status, commence_time,
    home_score, away_score, home_score_1h, away_score_1h, home_score_1q, away_score_1q";

const REC_COLUMNS: &str = "id, game_id, model_version, bet_type, period, side, line, price,
    wager, edge, confidence, status, created_at";
const REC_COLUMN_COUNT: usize = 13;

const SETTLEMENT_COLUMNS: &str = "actual_result, actual_value, closing_line, closing_price,
    closing_book, clv, beat_closing, settled_price, price_source, pnl, settled_at";

fn split_score(score: Option<PeriodScore>) -> (Option<i32>, Option<i32>) {
    match score {
        Some(s) => (Some(s.home), Some(s.away)),
        None => (None, None),
    }
}

fn score_pair(row: &rusqlite::Row, home: usize, away: usize) -> rusqlite::Result<Option<PeriodScore>> {
    let h: Option<i32> = row.get(home)?;
    let a: Option<i32> = row.get(away)?;
    Ok(match (h, a) {
        (Some(h), Some(a)) => Some(PeriodScore::new(h, a)),
        _ => None,
    })
}

fn enum_col<T>(row: &rusqlite::Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, anyhow!("unrecognised value '{raw}'").into())
    })
}

fn decimal_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_market_line(row: &rusqlite::Row, first: usize) -> rusqlite::Result<MarketLine> {
    Ok(MarketLine {
        line: row.get(first)?,
        home_price: row.get(first + 1)?,
        away_price: row.get(first + 2)?,
        over_price: row.get(first + 3)?,
        under_price: row.get(first + 4)?,
        shared_price: row.get(first + 5)?,
    })
}

fn map_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
    Ok(GameRecord {
        game_id: row.get(0)?,
        game_date: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        status: enum_col(row, 4, GameStatus::parse)?,
        commence_time: row.get(5)?,
        full_game: score_pair(row, 6, 7)?,
        first_half: score_pair(row, 8, 9)?,
        first_quarter: score_pair(row, 10, 11)?,
        predictions: Vec::new(),
        markets: Vec::new(),
    })
}

fn map_recommendation(row: &rusqlite::Row) -> rusqlite::Result<RecommendationRecord> {
    Ok(RecommendationRecord {
        id: row.get(0)?,
        game_id: row.get(1)?,
        model_version: row.get(2)?,
        bet_type: enum_col(row, 3, BetType::parse)?,
        period: enum_col(row, 4, GamePeriod::parse)?,
        side: enum_col(row, 5, crate::engine::BetSide::parse)?,
        line: row.get(6)?,
        price: row.get(7)?,
        wager: decimal_col(row, 8)?,
        edge: row.get(9)?,
        confidence: row.get(10)?,
        status: enum_col(row, 11, RecommendationStatus::parse)?,
        created_at: row.get(12)?,
    })
}

fn map_settlement(
    row: &rusqlite::Row,
    first: usize,
    status: RecommendationStatus,
) -> rusqlite::Result<SettlementRecord> {
    Ok(SettlementRecord {
        status,
        actual_result: row.get(first)?,
        actual_value: row.get(first + 1)?,
        closing_line: row.get(first + 2)?,
        closing_price: row.get(first + 3)?,
        closing_book: row.get(first + 4)?,
        clv: row.get(first + 5)?,
        beat_closing: row.get(first + 6)?,
        price: row.get(first + 7)?,
        price_source: enum_col(row, first + 8, crate::engine::PriceSource::parse)?,
        pnl: decimal_col(row, first + 9)?,
        settled_at: row.get(first + 10)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    game_id        TEXT    PRIMARY KEY,
    game_date      TEXT    NOT NULL,
    home_team_id   TEXT    NOT NULL,
    away_team_id   TEXT    NOT NULL,
    status         TEXT    NOT NULL DEFAULT 'scheduled',
    commence_time  TEXT,
    home_score     INTEGER,
    away_score     INTEGER,
    home_score_1h  INTEGER,
    away_score_1h  INTEGER,
    home_score_1q  INTEGER,
    away_score_1q  INTEGER
);

CREATE TABLE IF NOT EXISTS predictions (
    game_id        TEXT    NOT NULL,
    model_version  TEXT    NOT NULL,
    bet_type       TEXT    NOT NULL,
    period         TEXT    NOT NULL,
    value          REAL    NOT NULL,
    confidence     REAL    NOT NULL,
    PRIMARY KEY (game_id, model_version, bet_type, period),
    FOREIGN KEY (game_id) REFERENCES games(game_id)
);

CREATE TABLE IF NOT EXISTS market_lines (
    game_id        TEXT    NOT NULL,
    bet_type       TEXT    NOT NULL,
    period         TEXT    NOT NULL,
    kind           TEXT    NOT NULL,
    line           REAL,
    home_price     INTEGER,
    away_price     INTEGER,
    over_price     INTEGER,
    under_price    INTEGER,
    shared_price   INTEGER,
    PRIMARY KEY (game_id, bet_type, period, kind),
    FOREIGN KEY (game_id) REFERENCES games(game_id)
);

CREATE TABLE IF NOT EXISTS odds_snapshots (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id        TEXT    NOT NULL,
    bookmaker      TEXT    NOT NULL,
    bet_type       TEXT    NOT NULL,
    period         TEXT    NOT NULL,
    line           REAL,
    home_price     INTEGER,
    away_price     INTEGER,
    over_price     INTEGER,
    under_price    INTEGER,
    shared_price   INTEGER,
    captured_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS betting_recommendations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id        TEXT    NOT NULL,
    model_version  TEXT    NOT NULL,
    bet_type       TEXT    NOT NULL,
    period         TEXT    NOT NULL,
    side           TEXT    NOT NULL,
    line           REAL,
    price          INTEGER,
    wager          TEXT    NOT NULL,
    edge           REAL    NOT NULL,
    confidence     REAL    NOT NULL,
    status         TEXT    NOT NULL DEFAULT 'pending',
    created_at     TEXT    NOT NULL,
    actual_result  TEXT,
    actual_value   REAL,
    closing_line   REAL,
    closing_price  INTEGER,
    closing_book   TEXT,
    clv            REAL,
    beat_closing   INTEGER,
    settled_price  INTEGER,
    price_source   TEXT,
    pnl            TEXT,
    settled_at     TEXT
);

CREATE TABLE IF NOT EXISTS backtest_runs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT    NOT NULL,
    model_version  TEXT    NOT NULL,
    start_date     TEXT    NOT NULL,
    end_date       TEXT    NOT NULL,
    total_bets     INTEGER NOT NULL,
    net_profit     TEXT    NOT NULL,
    roi            REAL    NOT NULL,
    config_json    TEXT    NOT NULL,
    summary_json   TEXT    NOT NULL,
    created_at     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS backtest_results (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id         INTEGER NOT NULL,
    game_id        TEXT    NOT NULL,
    bet_type       TEXT    NOT NULL,
    period         TEXT    NOT NULL,
    side           TEXT    NOT NULL,
    outcome        TEXT    NOT NULL,
    profit         TEXT    NOT NULL,
    result_json    TEXT    NOT NULL,
    FOREIGN KEY (run_id) REFERENCES backtest_runs(id)
);

CREATE TABLE IF NOT EXISTS run_locks (
    lock_key       INTEGER PRIMARY KEY,
    purpose        TEXT    NOT NULL,
    holder_pid     INTEGER NOT NULL,
    holder_instance INTEGER NOT NULL,
    holder_started INTEGER,
    holder_token   INTEGER NOT NULL,
    acquired_at    TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
CREATE INDEX IF NOT EXISTS idx_recs_status ON betting_recommendations(status);
CREATE INDEX IF NOT EXISTS idx_snapshots_market ON odds_snapshots(game_id, bet_type, period);
CREATE INDEX IF NOT EXISTS idx_results_run ON backtest_results(run_id);
"#;
