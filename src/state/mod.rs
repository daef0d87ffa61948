use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::config::CacheConfig;
use crate::models::polls::ChoiceTally;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<PollCache>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(database: DatabaseConnection, cache: Arc<PollCache>) -> Self {
        assert!(
            cache.results_capacity >= 10,
            "Results cache capacity must be configured"
        );
        Self {
            database,
            cache,
            start_time: Instant::now(),
        }
    }
}

/// Per-question vote tallies keyed by question id. Entries are dropped
/// whenever a ballot for that question is saved.
///
/// `ballots` counts saved ballots across all questions. A reader captures it
/// before computing a tally and only keeps the entry if no ballot landed in
/// between, so a tally computed before a vote never outlives that vote.
pub struct PollCache {
    results: Cache<i32, Arc<Vec<ChoiceTally>>>,
    ballots: AtomicU64,
    pub results_capacity: u64,
}

impl PollCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.results_max_capacity >= 10,
            "Results cache capacity threshold"
        );

        let results = Cache::builder()
            .max_capacity(config.results_max_capacity)
            .time_to_live(config.results_ttl())
            .time_to_idle(Duration::from_secs(config.results_ttl_seconds / 2 + 1))
            .build();

        Self {
            results,
            ballots: AtomicU64::new(0),
            results_capacity: config.results_max_capacity,
        }
    }

    pub fn generation(&self) -> u64 {
        self.ballots.load(Ordering::SeqCst)
    }

    pub async fn results(&self, question_id: i32) -> Option<Arc<Vec<ChoiceTally>>> {
        self.results.get(&question_id).await
    }

    /// Caches a tally computed after observing `generation`. Returns whether
    /// the entry was kept.
    pub async fn store_results(
        &self,
        question_id: i32,
        generation: u64,
        tallies: Arc<Vec<ChoiceTally>>,
    ) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.results.insert(question_id, tallies).await;
        // A ballot saved between the check and the insert has already run its
        // invalidation, so drop the entry here instead.
        if self.generation() != generation {
            self.results.invalidate(&question_id).await;
            return false;
        }
        true
    }

    /// Called after a ballot for `question_id` is committed.
    pub async fn ballot_saved(&self, question_id: i32) {
        self.ballots.fetch_add(1, Ordering::SeqCst);
        self.results.invalidate(&question_id).await;
    }

    pub fn results_entries(&self) -> u64 {
        self.results.entry_count()
    }
}
