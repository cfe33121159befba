//! Run Registry - Single-Claim Storage for Submitted Runs
//!
//! Submitted requests wait here until a stream claims them. A claim removes
//! the entry in the same step that reads it, so a duplicated or retried
//! stream connection can never start a second upstream generation for the
//! same run.
//!
//! # Thread Safety
//!
//! The registry is a cheap clonable handle around an `Arc<DashMap>`. Insertion
//! and claim take per-shard locks internally; callers need no locking.
//!
//! # Expiry
//!
//! Runs nobody claims would otherwise stay forever. Entries older than the
//! configured TTL are treated as missing on claim and removed by
//! [`RunRegistry::sweep_expired`], which the daemon calls periodically.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::RelayError;
use crate::request::{GenerationRequest, RunId};

/// Default lifetime of an unclaimed run
pub const DEFAULT_RUN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct PendingRun {
    request: GenerationRequest,
    submitted_at: Instant,
}

/// Concurrent map of pending runs with atomic take-and-remove
#[derive(Clone, Debug)]
pub struct RunRegistry {
    runs: Arc<DashMap<RunId, PendingRun>>,
    ttl: Duration,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_TTL)
    }
}

impl RunRegistry {
    /// Create an empty registry whose unclaimed runs expire after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Store a request under a fresh id
    pub fn put(&self, request: GenerationRequest) -> RunId {
        let pending = PendingRun {
            request,
            submitted_at: Instant::now(),
        };

        // Never overwrite a pending run, even on a UUID collision
        let id = loop {
            let id = RunId::generate();
            match self.runs.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(pending);
                    break id;
                }
            }
        };

        // The entry guard is released here; len() locks every shard.
        tracing::debug!(run_id = %id, pending = self.runs.len(), "Run stored");
        id
    }

    /// Atomically take the request stored under `id`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if the id was never stored, was
    /// already claimed, or has expired.
    pub fn claim(&self, id: &RunId) -> Result<GenerationRequest, RelayError> {
        let Some((_, pending)) = self.runs.remove(id) else {
            return Err(RelayError::NotFound(id.clone()));
        };

        if pending.submitted_at.elapsed() > self.ttl {
            tracing::debug!(run_id = %id, "Claimed run had expired");
            return Err(RelayError::NotFound(id.clone()));
        }

        Ok(pending.request)
    }

    /// Remove all runs older than the TTL, returning how many were evicted
    pub fn sweep_expired(&self) -> usize {
        let before = self.runs.len();
        let ttl = self.ttl;
        self.runs
            .retain(|_, pending| pending.submitted_at.elapsed() <= ttl);
        let evicted = before.saturating_sub(self.runs.len());
        if evicted > 0 {
            tracing::info!(evicted, remaining = self.runs.len(), "Evicted expired runs");
        }
        evicted
    }

    /// Number of runs waiting to be claimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no runs are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
