use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};

mod backtest;
mod config;
mod dashboard;
mod db;
mod engine;
mod error;
mod export;
mod lock;
mod settlement;

use config::{Command, Config, ServeArgs};
use dashboard::AppState;
use db::Database;
use settlement::SettlementRun;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match &config.command {
        Command::Backtest(args) => {
            let bt = config.backtest(args);
            let persist = args.persist;
            let export_path = args.export.clone();
            let lock_wait = config.lock_wait();
            let store = db.clone();
            let run = tokio::task::spawn_blocking(move || -> Result<_> {
                let run = backtest::run_backtest(&store, &bt)?;
                if persist {
                    let run_id = backtest::persist_run(&store, &run, lock_wait)?;
                    info!(run_id, "Backtest stored");
                }
                Ok(run)
            })
            .await??;
            if let Some(path) = export_path {
                export::write_run(&run, &path)?;
            }
            println!("{}", serde_json::to_string_pretty(&run.summary)?);
        }
        Command::Settle => {
            match dashboard::run_settlement(db.clone(), config.settlement()).await? {
                SettlementRun::Completed(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?)
                }
                SettlementRun::Busy { key } => {
                    warn!(key, "Another settlement run holds the lock; try again later");
                    std::process::exit(2);
                }
            }
        }
        Command::Report { days } => {
            let report = settlement::performance_report(&db, *days, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Import { path } => {
            let counts = export::import_bundle(&db, path, &config.model_version)?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Serve(args) => serve(&config, args, db).await?,
    }

    Ok(())
}

async fn serve(config: &Config, args: &ServeArgs, db: Database) -> Result<()> {
    let state = AppState {
        db: db.clone(),
        settlement: config.settlement(),
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = args.addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    if args.settle_interval_secs > 0 {
        let settle_config = config.settlement();
        let period = Duration::from_secs(args.settle_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match dashboard::run_settlement(db.clone(), settle_config.clone()).await {
                    Ok(SettlementRun::Completed(summary)) => {
                        info!(settled = summary.settled, pnl = %summary.total_pnl, "Scheduled settlement finished")
                    }
                    Ok(SettlementRun::Busy { key }) => info!(key, "Scheduled settlement skipped, lock busy"),
                    Err(e) => error!("Scheduled settlement failed: {}", e),
                }
            }
        });
    } else {
        info!("Scheduled settlement disabled");
    }

    // Run API server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}
