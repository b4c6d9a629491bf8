//! Shared application state for the HTTP handlers.
//!
//! Everything hangs off Arc-wrapped subsystems; handlers clone the state
//! cheaply and reach each subsystem without further locking.

use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
use serde::Serialize;

use crate::{
    config::Config,
    context_engine::ConversationOrchestrator,
    index::SimilarityIndex,
    memory_db::MemoryDatabase,
};

/// Lock-free counters feeding the /stats endpoint.
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub processed_turns: AtomicUsize,
    pub failed_completions: AtomicUsize,
}

/// Snapshot of the counters for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub total_requests: usize,
    pub processed_turns: usize,
    pub failed_completions: usize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
            processed_turns: AtomicUsize::new(0),
            failed_completions: AtomicUsize::new(0),
        }
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_processed_turns(&self) -> usize {
        self.processed_turns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_failed_completions(&self) -> usize {
        self.failed_completions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            processed_turns: self.processed_turns.load(Ordering::Relaxed),
            failed_completions: self.failed_completions.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state handed to the Axum router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<MemoryDatabase>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub index: Arc<dyn SimilarityIndex>,
    pub counters: Arc<AtomicCounters>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = AtomicCounters::new();
        counters.inc_total_requests();
        counters.inc_total_requests();
        counters.inc_processed_turns();
        counters.inc_failed_completions();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.processed_turns, 1);
        assert_eq!(snapshot.failed_completions, 1);
    }
}
