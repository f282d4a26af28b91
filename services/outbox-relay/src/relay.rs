//! The outbox relay's tick loop (C3). Grounded on `transactional-outbox`'s
//! `OutboxProcessor::start`/`process_batch` shape — periodic tick, bounded
//! fan-out, per-row transaction — generalized to this pipeline's
//! lease-then-lock protocol and quadratic backoff instead of that processor's
//! exponential one.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use order_domain::outbox::compute_backoff;
use order_domain::{DomainResult, OutboxRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::dispatch::{DeliveryError, OutboxDispatcher};

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxRepository>,
    dispatcher: Arc<dyn OutboxDispatcher>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        dispatcher: Arc<dyn OutboxDispatcher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            dispatcher,
            config,
        }
    }

    /// Runs ticks until `shutdown` fires. A tick still in flight when shutdown
    /// fires is dropped rather than awaited to completion: every per-entry
    /// transaction is held across an `.await`, so dropping the in-flight
    /// future rolls it back cleanly instead of leaving a half-applied entry.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.run_tick_cancellable(&mut shutdown).await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
        info!("outbox relay shut down");
    }

    async fn run_tick_cancellable(&self, shutdown: &mut watch::Receiver<bool>) {
        let now = Utc::now();
        let due = match self.outbox.lease_due(self.config.batch_limit, now).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "lease_due failed, skipping tick");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        let fanout = self.config.fanout;
        let deliveries = stream::iter(due.into_iter().map(|entry| entry.id))
            .map(|id| self.process_one(id))
            .buffer_unordered(fanout);
        tokio::pin!(deliveries);

        loop {
            tokio::select! {
                next = deliveries.next() => {
                    match next {
                        Some(Ok(())) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "outbox entry processing failed");
                            continue;
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    warn!("shutdown signal received mid-tick, cancelling in-flight deliveries");
                    return;
                }
            }
        }
    }

    /// Process a single leased entry inside its own transaction, bounded by
    /// `QUERY_TIMEOUT`.
    async fn process_one(&self, id: uuid::Uuid) -> DomainResult<()> {
        let query_timeout = self.config.query_timeout;
        let fut = self.process_one_inner(id);
        match tokio::time::timeout(query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(entry_id = %id, timeout_secs = query_timeout.as_secs(), "entry processing timed out");
                Ok(())
            }
        }
    }

    async fn process_one_inner(&self, id: uuid::Uuid) -> DomainResult<()> {
        use order_domain::models::OutboxStatus;

        // Pool access goes through the repository, so acquire the
        // transaction via its pool handle rather than holding our own.
        let mut tx = self
            .outbox
            .pool()
            .begin()
            .await
            .map_err(order_domain::classify_sqlx)?;

        let entry = match self.outbox.lock_for_update(&mut tx, id).await? {
            Some(e) => e,
            None => {
                tx.commit().await.map_err(order_domain::classify_sqlx)?;
                return Ok(());
            }
        };

        if matches!(entry.status, OutboxStatus::Done | OutboxStatus::Failed) {
            // Another worker already finished this row.
            tx.commit().await.map_err(order_domain::classify_sqlx)?;
            return Ok(());
        }

        match self.dispatcher.deliver(&entry).await {
            Ok(()) => {
                self.outbox.mark_done(&mut tx, id, Utc::now()).await?;
                tx.commit().await.map_err(order_domain::classify_sqlx)?;
                info!(entry_id = %id, event_type = %entry.event_type, "outbox entry delivered");
            }
            Err(DeliveryError::Permanent(msg)) => {
                warn!(entry_id = %id, error = %msg, "permanent delivery failure, marking failed");
                self.outbox.mark_failed(&mut tx, id, Utc::now()).await?;
                tx.commit().await.map_err(order_domain::classify_sqlx)?;
            }
            Err(DeliveryError::Transient(msg)) => {
                let attempts = entry.attempts + 1;
                if attempts > self.config.max_attempts {
                    warn!(entry_id = %id, attempts, "max attempts exceeded, marking failed");
                    self.outbox.mark_failed(&mut tx, id, Utc::now()).await?;
                } else {
                    let backoff = compute_backoff(attempts);
                    warn!(entry_id = %id, attempts, error = %msg, backoff_secs = backoff.as_secs_f64(), "transient delivery failure, scheduling retry");
                    let next_attempt_at = Utc::now() + to_chrono(backoff);
                    self.outbox
                        .mark_retry(&mut tx, id, attempts, next_attempt_at)
                        .await?;
                }
                tx.commit().await.map_err(order_domain::classify_sqlx)?;
            }
        }

        Ok(())
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(0))
}
