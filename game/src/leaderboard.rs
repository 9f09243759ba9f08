use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub nickname: String,
    pub score: u32,
}

/// Everything the store keeps for one finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub score: u32,
    pub nickname: String,
    pub submitted_at: DateTime<Utc>,
}

impl ScoreSubmission {
    pub fn entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            nickname: self.nickname.clone(),
            score: self.score,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("leaderboard request failed: {0}")]
    Transport(String),
    #[error("leaderboard returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed leaderboard payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("leaderboard request timed out")]
    Timeout,
    #[error("leaderboard store unavailable")]
    Unavailable,
}

/// The remote score store. Implementations are cheap to clone so each request
/// can run on its own task.
pub trait LeaderboardGateway: Clone + Send + Sync + 'static {
    /// Top `n` entries, score descending, ties in the store's arrival order.
    fn fetch_top(
        &self,
        n: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, GatewayError>> + Send;

    fn insert(
        &self,
        submission: ScoreSubmission,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryStore {
    rows: Vec<ScoreSubmission>,
    insert_calls: usize,
    fail_inserts: bool,
    fail_fetches: bool,
}

/// In-process store. Backs the reference leaderboard service and stands in
/// for the remote one when no URL is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaderboard {
    inner: Arc<Mutex<MemoryStore>>,
}

impl MemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut MemoryStore) -> T) -> Result<T, GatewayError> {
        let mut store = self.inner.lock().map_err(|_| GatewayError::Unavailable)?;
        Ok(f(&mut store))
    }

    pub fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, GatewayError> {
        self.with_store(|store| {
            if store.fail_fetches {
                return Err(GatewayError::Unavailable);
            }
            let mut ranked: Vec<&ScoreSubmission> = store.rows.iter().collect();
            // Stable: equal scores keep arrival order.
            ranked.sort_by(|a, b| b.score.cmp(&a.score));
            Ok(ranked.into_iter().take(n).map(ScoreSubmission::entry).collect())
        })?
    }

    pub fn push(&self, submission: ScoreSubmission) -> Result<(), GatewayError> {
        self.with_store(|store| {
            store.insert_calls += 1;
            if store.fail_inserts {
                return Err(GatewayError::Unavailable);
            }
            store.rows.push(submission);
            Ok(())
        })?
    }

    pub fn rows(&self) -> Vec<ScoreSubmission> {
        self.with_store(|store| store.rows.clone()).unwrap_or_default()
    }

    /// Insert attempts, including failed ones.
    pub fn insert_calls(&self) -> usize {
        self.with_store(|store| store.insert_calls).unwrap_or_default()
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        let _ = self.with_store(|store| store.fail_inserts = fail);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        let _ = self.with_store(|store| store.fail_fetches = fail);
    }
}

impl LeaderboardGateway for MemoryLeaderboard {
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, GatewayError> {
        self.top(n)
    }

    async fn insert(&self, submission: ScoreSubmission) -> Result<(), GatewayError> {
        self.push(submission)
    }
}

/// Last known top-N list. Only successful fetches replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardCache {
    entries: Vec<LeaderboardEntry>,
    refreshes: usize,
}

impl LeaderboardCache {
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Successful refreshes applied so far.
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    /// Returns `true` if the cache was replaced.
    pub fn apply(&mut self, fetched: Result<Vec<LeaderboardEntry>, GatewayError>) -> bool {
        match fetched {
            Ok(entries) => {
                self.entries = entries;
                self.refreshes += 1;
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "leaderboard refresh failed; keeping cached list");
                false
            }
        }
    }
}
