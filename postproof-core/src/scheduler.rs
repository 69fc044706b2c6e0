//! Periodic maturation sweep.
//!
//! A sweep lists pending records and attempts each one with bounded
//! concurrency. Records are isolated from each other: an error, or even a
//! panic, while maturing one record is counted and the sweep moves on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::lifecycle::{LifecycleManager, MaturationResult};

pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Records attempted
    pub checked: usize,
    /// Records that reached `confirmed`
    pub upgraded: usize,
    /// Records that reached `failed`
    pub failed: usize,
    /// Attempts that errored; the records stay pending
    pub errors: usize,
    /// Records skipped because another attempt held them
    pub skipped: usize,
}

pub struct MaturationScheduler {
    manager: Arc<LifecycleManager>,
    concurrency: usize,
}

impl MaturationScheduler {
    pub fn new(manager: Arc<LifecycleManager>, concurrency: usize) -> Self {
        Self {
            manager,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one sweep over every pending record.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let ids = self.manager.pending_ids().await?;
        let mut report = SweepReport {
            checked: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for id in ids {
            let manager = self.manager.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (id, manager.mature(id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(MaturationResult::Confirmed(_)))) => report.upgraded += 1,
                Ok((_, Ok(MaturationResult::Failed(_)))) => report.failed += 1,
                Ok((_, Ok(MaturationResult::StillPending { .. }))) => {}
                Ok((_, Ok(MaturationResult::Skipped(_)))) => report.skipped += 1,
                Ok((id, Err(e))) => {
                    warn!(record_id = %id, error = %e, "Maturation attempt failed");
                    report.errors += 1;
                }
                Err(e) => {
                    error!(error = %e, "Maturation task panicked");
                    report.errors += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            upgraded = report.upgraded,
            failed = report.failed,
            errors = report.errors,
            skipped = report.skipped,
            "Maturation sweep complete"
        );
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` resolves.
    pub async fn run_every(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Maturation scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_sweep().await {
                        warn!(error = %e, "Maturation sweep could not list pending records");
                    }
                }
            }
        }
    }
}
