//! Periodic purge of expired jobs.
//!
//! A job whose OCR run outlives its TTL can be swept while still
//! `processing`. The runner keeps its own handle to the record and finishes
//! normally, but the job is no longer queryable and the files it writes
//! afterwards are only reclaimed by the next startup reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::{JobEvent, JobEvents};
use crate::store;
use crate::table::JobTable;

pub struct ExpirationSweeper {
    table: Arc<JobTable>,
    events: JobEvents,
    interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl ExpirationSweeper {
    pub fn new(table: Arc<JobTable>, events: JobEvents, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            table,
            events,
            interval,
            shutdown,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Purges every job whose `expires_at` is at or before `now`. Returns the
    /// number of jobs removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<_> = self
            .table
            .snapshot()
            .into_iter()
            .filter(|record| record.is_expired(now))
            .collect();

        let mut purged = 0;
        for record in expired {
            info!("Deleting expired job {} ({})", record.id, record.status);
            store::delete_files(&record);
            if self.table.remove(&record.id).is_some() {
                self.events.send(JobEvent::purged(record.id));
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Sweep purged {} expired jobs", purged);
        } else {
            debug!("Sweep found nothing to purge");
        }
        purged
    }

    pub fn sweep_now(&self) -> usize {
        self.sweep(Utc::now())
    }

    /// [`ExpirationSweeper::sweep`] on the blocking thread pool, so file
    /// deletion never runs on a runtime worker.
    pub async fn sweep_on_blocking_pool(self: &Arc<Self>, now: DateTime<Utc>) -> usize {
        let sweeper = Arc::clone(self);
        match tokio::task::spawn_blocking(move || sweeper.sweep(now)).await {
            Ok(purged) => purged,
            Err(e) => {
                error!("Expiration sweep failed: {}", e);
                0
            }
        }
    }

    /// Spawns the sweep loop on the current runtime. The first sweep happens
    /// one interval after start.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(sweeper.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // skip immediate first tick

            info!("Expiration sweeper started (every {:?})", sweeper.interval);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = timer.tick() => {
                        sweeper.sweep_on_blocking_pool(Utc::now()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("Expiration sweeper stopped");
        })
    }

    /// Signals the sweep loop to exit.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
