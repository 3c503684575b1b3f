//! OutboxRelay - background worker shipping outbox events to HQ
//!
//! One relay task runs per stream; at most one relay run is in flight at a
//! time, so cursor advancement never races with itself. The relay never
//! enters the domain write path: it only reads outbox rows and writes their
//! publish metadata plus the stream cursor.
//!
//! # Run algorithm
//!
//! 1. Fetch a bounded batch of unpublished events strictly after the
//!    stream's cursor, ascending by id. Events that already exhausted the
//!    attempt ceiling are isolated (marked published with an error) so one
//!    poison event cannot stall everything behind it.
//! 2. Ship the batch under a deadline; expiry is a transient failure with
//!    no side effects.
//! 3. Acknowledgments are applied in one ledger commit: accepted/duplicate
//!    keys are marked published, rejected keys are isolated, and the cursor
//!    advances to the end of the resolved prefix - never past an event HQ
//!    did not resolve.
//! 4. Transport failures increment attempt counters in one commit and leave
//!    the cursor untouched; the next run retries from the same position,
//!    which is safe because HQ dedups on the idempotency key.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use shared::hq::{AckStatus, HqSyncBatch};
use shared::util::now_millis;

use crate::hq::{DeliveryError, HqClient};
use crate::ledger::{LedgerError, LedgerStore};
use crate::outbox::cursor::SyncCursorStore;
use crate::outbox::event::OutboxEvent;

/// Relay worker settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Stream whose cursor this relay advances
    pub stream: String,
    /// Maximum events per HQ push
    pub batch_size: usize,
    /// Idle poll interval
    pub poll_interval: Duration,
    /// Deadline for one HQ request
    pub request_timeout: Duration,
    /// Publish attempts before an event is isolated as poison
    pub max_publish_attempts: u32,
    /// First retry delay after a failed run
    pub initial_backoff: Duration,
    /// Retry delay ceiling
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stream: "hq-sales".to_string(),
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            max_publish_attempts: 10,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Relay errors; absorbed into the next scheduled run, never thrown across
/// the domain boundary
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Result summary of one relay run
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayOutcome {
    /// Unpublished events fetched after the cursor
    pub fetched: usize,
    /// Events acknowledged as accepted or duplicate
    pub published: usize,
    /// Events permanently rejected by HQ this run
    pub rejected: usize,
    /// Events isolated after exhausting the attempt ceiling
    pub isolated: usize,
    /// Cursor position after the run, if it advanced
    pub cursor: Option<u64>,
}

/// Background relay for one sync stream
pub struct OutboxRelay {
    ledger: LedgerStore,
    cursors: SyncCursorStore,
    client: Arc<dyn HqClient>,
    edge_id: String,
    config: RelayConfig,
    shutdown: CancellationToken,
}

impl OutboxRelay {
    pub fn new(
        ledger: LedgerStore,
        client: Arc<dyn HqClient>,
        edge_id: String,
        config: RelayConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let cursors = SyncCursorStore::new(ledger.clone());
        Self {
            ledger,
            cursors,
            client,
            edge_id,
            config,
            shutdown,
        }
    }

    /// Run the relay loop until cancelled.
    ///
    /// Healthy runs repeat at the poll interval; after a failure the delay
    /// doubles up to the ceiling and resets on the next success. Retries
    /// continue for as long as the node runs - business events are never
    /// dropped for being old.
    pub async fn run(self) {
        tracing::info!(stream = %self.config.stream, "OutboxRelay started");

        let mut backoff: Option<Duration> = None;

        loop {
            let delay = backoff.unwrap_or(self.config.poll_interval);
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(stream = %self.config.stream, "OutboxRelay shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.run_once().await {
                Ok(outcome) => {
                    backoff = None;
                    if outcome.published > 0 || outcome.rejected > 0 || outcome.isolated > 0 {
                        tracing::debug!(
                            stream = %self.config.stream,
                            published = outcome.published,
                            rejected = outcome.rejected,
                            isolated = outcome.isolated,
                            cursor = ?outcome.cursor,
                            "Relay run complete"
                        );
                    }
                }
                Err(e) => {
                    let next = match backoff {
                        None => self.config.initial_backoff,
                        Some(d) => (d * 2).min(self.config.max_backoff),
                    };
                    tracing::warn!(
                        stream = %self.config.stream,
                        error = %e,
                        retry_in = ?next,
                        "Relay run failed, backing off"
                    );
                    backoff = Some(next);
                }
            }
        }

        tracing::info!(stream = %self.config.stream, "OutboxRelay stopped");
    }

    /// Execute a single relay run
    pub async fn run_once(&self) -> Result<RelayOutcome, RelayError> {
        let after = self
            .cursors
            .last_outbox_id(&self.config.stream)?
            .unwrap_or(0);
        let fetched = self
            .ledger
            .fetch_unpublished_after(after, self.config.batch_size)?;
        if fetched.is_empty() {
            return Ok(RelayOutcome::default());
        }

        let mut resolved: BTreeSet<u64> = BTreeSet::new();
        let mut outcome = RelayOutcome {
            fetched: fetched.len(),
            ..Default::default()
        };

        // Isolate events that exhausted their attempt ceiling before they
        // block the stream again
        if fetched
            .iter()
            .any(|e| e.publish_attempts >= self.config.max_publish_attempts)
        {
            let now = now_millis();
            let txn = self.ledger.begin_write()?;
            for event in &fetched {
                if event.publish_attempts >= self.config.max_publish_attempts {
                    let mut updated = event.clone();
                    updated.published_at = Some(now);
                    updated.last_error = Some(format!(
                        "isolated after {} publish attempts: {}",
                        event.publish_attempts,
                        event.last_error.as_deref().unwrap_or("unknown error")
                    ));
                    self.ledger.update_outbox_event(&txn, &updated)?;
                    tracing::warn!(
                        outbox_id = event.id,
                        attempts = event.publish_attempts,
                        "Poison outbox event isolated for manual review"
                    );
                    resolved.insert(event.id);
                    outcome.isolated += 1;
                }
            }
            txn.commit().map_err(LedgerError::from)?;
        }

        let to_ship: Vec<&OutboxEvent> = fetched
            .iter()
            .filter(|e| !resolved.contains(&e.id))
            .collect();
        if to_ship.is_empty() {
            return Ok(outcome);
        }

        let envelopes = to_ship
            .iter()
            .map(|e| e.to_envelope())
            .collect::<Result<Vec<_>, _>>()?;
        let batch = HqSyncBatch {
            edge_id: self.edge_id.clone(),
            stream: self.config.stream.clone(),
            events: envelopes,
            sent_at: now_millis(),
        };

        let response = match tokio::time::timeout(
            self.config.request_timeout,
            self.client.push_batch(batch),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                self.record_batch_failure(&to_ship, &err)?;
                return Err(err.into());
            }
            Err(_elapsed) => {
                let err = DeliveryError::Transient(format!(
                    "HQ request exceeded {:?} deadline",
                    self.config.request_timeout
                ));
                self.record_batch_failure(&to_ship, &err)?;
                return Err(err.into());
            }
        };

        // Apply acknowledgments and advance the cursor in one commit
        let now = now_millis();
        let txn = self.ledger.begin_write()?;
        for event in &to_ship {
            let mut updated = (*event).clone();
            match response.ack_for(event.event_id) {
                Some(ack) if ack.status == AckStatus::Rejected => {
                    updated.published_at = Some(now);
                    updated.last_error = Some(format!(
                        "rejected by HQ: {}",
                        ack.message.as_deref().unwrap_or("no detail")
                    ));
                    resolved.insert(event.id);
                    outcome.rejected += 1;
                    tracing::warn!(
                        outbox_id = event.id,
                        event_id = %event.event_id,
                        "Outbox event permanently rejected by HQ, isolated for manual review"
                    );
                }
                Some(_accepted_or_duplicate) => {
                    updated.published_at = Some(now);
                    updated.publish_attempts = 0;
                    updated.last_error = None;
                    resolved.insert(event.id);
                    outcome.published += 1;
                }
                None => {
                    updated.publish_attempts += 1;
                    updated.last_error =
                        Some("no acknowledgment for event in HQ response".to_string());
                }
            }
            self.ledger.update_outbox_event(&txn, &updated)?;
        }

        // The cursor moves to the end of the resolved prefix of this fetch;
        // it never passes an event HQ did not resolve
        for event in &fetched {
            if resolved.contains(&event.id) {
                outcome.cursor = Some(event.id);
            } else {
                break;
            }
        }
        if let Some(id) = outcome.cursor {
            self.cursors.advance(&txn, &self.config.stream, id)?;
        }
        txn.commit().map_err(LedgerError::from)?;

        Ok(outcome)
    }

    /// Record a failed push: bump attempt counters on the whole batch in
    /// one commit, cursor untouched
    fn record_batch_failure(
        &self,
        batch: &[&OutboxEvent],
        err: &DeliveryError,
    ) -> Result<(), LedgerError> {
        tracing::warn!(
            stream = %self.config.stream,
            batch_len = batch.len(),
            error = %err,
            "Failed to push outbox batch to HQ"
        );
        let txn = self.ledger.begin_write()?;
        for event in batch {
            let mut updated = (*event).clone();
            updated.publish_attempts += 1;
            updated.last_error = Some(err.to_string());
            self.ledger.update_outbox_event(&txn, &updated)?;
        }
        txn.commit()?;
        Ok(())
    }
}
