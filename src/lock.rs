//! Run-level mutual exclusion on top of a [`LockProvider`].
//!
//! A run (settlement or backtest persistence) is scoped by purpose, target
//! date and model version. The key is the first eight bytes of the SHA-256 of
//! `purpose|date|model_version`, read as a big-endian `i64`.
use anyhow::Result;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{HolderState, LockProvider};

pub fn lock_key(purpose: &str, date: NaiveDate, model_version: &str) -> i64 {
    let digest = Sha256::digest(format!("{purpose}|{date}|{model_version}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Held run lock. Released on drop, and only if the row is still ours.
pub struct RunGuard<'a, L: LockProvider + ?Sized> {
    provider: &'a L,
    key: i64,
    token: i64,
}

impl<'a, L: LockProvider + ?Sized> RunGuard<'a, L> {
    pub fn key(&self) -> i64 {
        self.key
    }
}

impl<L: LockProvider + ?Sized> Drop for RunGuard<'_, L> {
    fn drop(&mut self) {
        match self.provider.release_lock(self.key, self.token) {
            Ok(true) => {}
            Ok(false) => warn!(key = self.key, "run lock was no longer held by this run"),
            Err(e) => warn!(key = self.key, "failed to release run lock: {}", e),
        }
    }
}

/// Outcome of trying to start a run.
pub enum Acquired<'a, L: LockProvider + ?Sized> {
    Held(RunGuard<'a, L>),
    Busy { key: i64 },
}

/// Wait up to `wait` for the lock. On timeout, a holder whose process is gone
/// is evicted by its token and acquisition is retried once; a live holder
/// means busy. Two callers evicting the same stale row cannot both win: the
/// eviction only matches the stale token, and the retry is an insert.
pub fn acquire_run<'a, L: LockProvider + ?Sized>(
    provider: &'a L,
    purpose: &str,
    date: NaiveDate,
    model_version: &str,
    wait: Duration,
) -> Result<Acquired<'a, L>> {
    let key = lock_key(purpose, date, model_version);
    if let Some(token) = provider.acquire_lock(key, purpose, wait)? {
        return Ok(Acquired::Held(RunGuard { provider, key, token }));
    }
    match provider.holder_state(key)? {
        HolderState::Alive => return Ok(Acquired::Busy { key }),
        HolderState::Dead { token } => {
            info!(key, purpose, "run lock holder is gone, evicting stale lock");
            provider.release_lock(key, token)?;
        }
        HolderState::Free => {}
    }
    Ok(match provider.acquire_lock(key, purpose, wait)? {
        Some(token) => Acquired::Held(RunGuard { provider, key, token }),
        None => Acquired::Busy { key },
    })
}
