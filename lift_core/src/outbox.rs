//! Retry queue for workout logs whose first save failed.
//!
//! Completing a session never waits on storage. If the save fails the log
//! is parked here, and a later [`Outbox::flush`] tries again. The queue
//! lives in memory only; it does not survive the process.

use crate::store::WorkoutLogStore;
use crate::{Result, WorkoutLog};

#[derive(Clone, Debug)]
pub struct PendingLog {
    pub user_id: String,
    pub date_key: String,
    pub log: WorkoutLog,
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<PendingLog>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a log after its first failed save
    pub fn push(&mut self, user_id: &str, date_key: &str, log: WorkoutLog) {
        self.pending.push(PendingLog {
            user_id: user_id.to_string(),
            date_key: date_key.to_string(),
            log,
            attempts: 1,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[PendingLog] {
        &self.pending
    }

    /// Put back entries from a batch that was taken out to flush.
    /// They go ahead of anything queued in the meantime.
    pub fn requeue(&mut self, batch: Outbox) {
        let newer = std::mem::replace(&mut self.pending, batch.pending);
        self.pending.extend(newer);
    }

    /// Try each queued log once, in order. Returns how many were delivered;
    /// failures stay queued with their attempt count bumped.
    ///
    /// An entry whose key already holds a log that ended later is dropped
    /// without saving, since the upsert would replace the newer workout.
    pub fn flush(&mut self, store: &dyn WorkoutLogStore) -> usize {
        let mut delivered = 0;

        self.pending.retain_mut(|entry| {
            let result = superseded(store, entry).and_then(|newer| {
                if newer {
                    tracing::info!(
                        log_id = %entry.log.id,
                        date = %entry.date_key,
                        "Dropping queued workout log, a newer one is stored"
                    );
                    return Ok(());
                }
                store.save(&entry.user_id, &entry.date_key, &entry.log)?;
                delivered += 1;
                Ok(())
            });

            match result {
                Ok(()) => false,
                Err(e) => {
                    entry.attempts += 1;
                    tracing::warn!(
                        log_id = %entry.log.id,
                        attempts = entry.attempts,
                        "Retrying workout log save failed: {}",
                        e
                    );
                    true
                }
            }
        });

        if delivered > 0 {
            tracing::info!("Delivered {} queued workout logs", delivered);
        }
        delivered
    }
}

/// Whether the store already holds a later log under the entry's key
fn superseded(store: &dyn WorkoutLogStore, entry: &PendingLog) -> Result<bool> {
    let stored = store.fetch_history(&entry.user_id, usize::MAX)?;
    Ok(stored
        .iter()
        .any(|log| log.date_key == entry.date_key && log.ended_at > entry.log.ended_at))
}
