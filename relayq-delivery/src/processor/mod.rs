//! Delivery processor: the run loop that expires stale mail, claims a
//! batch and hands it to the [`DeliveryEngine`], then sleeps until the next
//! run. A back-off asked for by the engine is slept only after the batch
//! has been committed.
//!
//! Runs start `poll_delay` apart. When a run itself takes longer than that,
//! the next one starts immediately.

mod cleanup;
mod delivery;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use relayq_common::{Shutdown, internal};
use relayq_store::MessageStore;
use tokio::time::Instant;

pub use cleanup::run_cleanup;
pub use delivery::{BatchEnd, BatchReport, DeliveryEngine, MAX_AUTH_FAILURES};

use crate::{DeliveryConfig, DeliveryError, transport::Transport};

/// How long to sleep after a run that took `elapsed`, never negative.
#[must_use]
pub const fn remaining_delay(poll_delay: Duration, elapsed: Duration) -> Duration {
    poll_delay.saturating_sub(elapsed)
}

#[derive(Debug)]
pub struct DeliveryProcessor {
    store: Arc<dyn MessageStore>,
    engine: DeliveryEngine,
    config: DeliveryConfig,
}

impl DeliveryProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
    ) -> Self {
        let engine = DeliveryEngine::new(transport, config.poll_delay());
        Self {
            store,
            engine,
            config,
        }
    }

    /// Runs until shutdown is requested, or once when configured for a
    /// single pass.
    ///
    /// # Errors
    ///
    /// Returns the first error a run cannot absorb: repeated authentication
    /// failures or an unexpected store error.
    #[tracing::instrument(skip_all)]
    pub async fn serve(&mut self, mut shutdown: Shutdown) -> Result<(), DeliveryError> {
        internal!(level = INFO, "Delivery processor starting");

        loop {
            if shutdown.is_requested() {
                internal!("Delivery processor received shutdown signal");
                break;
            }

            let started = Instant::now();
            self.run_once(&mut shutdown).await?;

            if self.config.once {
                break;
            }

            let delay = remaining_delay(self.config.poll_delay(), started.elapsed());
            tracing::debug!(?delay, "Waiting for the next run");
            if shutdown.sleep(delay).await {
                internal!("Delivery processor received shutdown signal");
                break;
            }
        }

        internal!(level = INFO, "Delivery processor shutdown complete");
        Ok(())
    }

    /// One pass: cleanup, then claim and deliver a batch.
    ///
    /// A failed cleanup ends the pass early. Losing the claim race to
    /// another process is not an error.
    ///
    /// # Errors
    ///
    /// Returns fatal delivery errors and store errors other than conflicts.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&mut self, shutdown: &mut Shutdown) -> Result<(), DeliveryError> {
        let now = Utc::now();

        if let Err(e) = run_cleanup(self.store.as_ref(), self.config.max_age(), now).await {
            tracing::error!("Cleanup failed, skipping this run: {e}");
            return Ok(());
        }

        match self.deliver_batch(now, shutdown).await {
            Err(e) if e.is_conflict() => {
                tracing::debug!("Another relay holds the queue, skipping this run: {e}");
                Ok(())
            }
            result => result,
        }
    }

    async fn deliver_batch(
        &mut self,
        now: chrono::DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> Result<(), DeliveryError> {
        let mut tx = self.store.begin().await?;

        let batch = match tx.claim_batch(self.config.batch_size, now).await {
            Ok(batch) => batch,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback after failed claim also failed: {rollback}");
                }
                return Err(e.into());
            }
        };

        if batch.is_empty() {
            tracing::debug!("No messages to deliver");
            tx.commit().await?;
            return Ok(());
        }

        tracing::info!(claimed = batch.len(), "Delivering batch");

        match self.engine.deliver(tx.as_mut(), batch, shutdown).await {
            Ok(report) => {
                tx.commit().await?;
                tracing::info!(
                    attempted = report.attempted,
                    sent = report.sent,
                    failed = report.failed,
                    deferred = report.deferred,
                    ended = ?report.ended,
                    auth_failures = self.engine.failed_auth_count(),
                    "Batch finished"
                );

                if let Some(delay) = report.backoff {
                    tracing::debug!(?delay, "Backing off before the next run");
                    shutdown.sleep(delay).await;
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback after failed delivery also failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}
