use dashmap::DashSet;
use metrics::{counter, gauge};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::database::ensure_event_partition;
use crate::config::IngestConfig;
use crate::models::NewRateLimitEvent;

/// Asynchronous, backpressured writer of decision events into the
/// time-partitioned event store.
///
/// Events flow through a bounded queue into a small worker pool that
/// coalesces them into batch inserts. When the queue is full the submitting
/// task writes the event synchronously instead (caller-runs) — latency is
/// traded for never silently dropping an event. Write failures are logged
/// and never reach the hot path.
#[derive(Clone)]
pub struct EventIngest {
    tx: mpsc::Sender<NewRateLimitEvent>,
    db: PgPool,
    queue_capacity: usize,
    ensured_partitions: Arc<DashSet<String>>,
}

impl EventIngest {
    /// Start the worker pool and return the producer handle.
    pub fn spawn(db: PgPool, cfg: &IngestConfig) -> Self {
        let (tx, rx) = mpsc::channel::<NewRateLimitEvent>(cfg.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let ensured_partitions = Arc::new(DashSet::new());

        for worker in 0..cfg.workers {
            let rx = rx.clone();
            let db = db.clone();
            let partitions = ensured_partitions.clone();
            let batch_size = cfg.batch_size.max(1);

            tokio::spawn(async move {
                tracing::debug!("event ingest worker {} started", worker);
                loop {
                    let mut batch = Vec::with_capacity(batch_size);
                    let received = rx.lock().await.recv_many(&mut batch, batch_size).await;
                    if received == 0 {
                        // Channel closed and drained.
                        tracing::debug!("event ingest worker {} stopping", worker);
                        break;
                    }
                    write_batch(&db, &batch, &partitions).await;
                }
            });
        }

        Self {
            tx,
            db,
            queue_capacity: cfg.queue_capacity.max(1),
            ensured_partitions,
        }
    }

    /// Hand one decision event to the pipeline. Counters and gauges are
    /// bumped here so they fire exactly once per event regardless of which
    /// path persists it.
    pub async fn record(&self, event: NewRateLimitEvent) {
        if event.allowed {
            counter!("requests.allowed").increment(1);
        } else {
            counter!("requests.denied").increment(1);
        }
        if let Some(policy_id) = event.policy_id {
            let labels = [
                ("policy_id", policy_id.to_string()),
                ("identifier", event.identifier.clone()),
            ];
            gauge!("rate_limit.usage", &labels)
                .set((event.limit_value - event.remaining).max(0) as f64);
            gauge!("rate_limit.limit", &labels).set(event.limit_value as f64);
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Caller-runs: backpressure instead of data loss.
                let depth = self.queue_capacity - self.tx.capacity();
                tracing::warn!(
                    "event queue saturated (depth {}), writing synchronously",
                    depth
                );
                write_batch(&self.db, std::slice::from_ref(&event), &self.ensured_partitions)
                    .await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("event ingest channel closed; event dropped");
            }
        }
    }
}

/// Batch-insert events, creating monthly partitions on first sight. Errors
/// are logged and swallowed — metrics ingest must never corrupt or block
/// the primary flow.
async fn write_batch(
    db: &PgPool,
    events: &[NewRateLimitEvent],
    ensured_partitions: &DashSet<String>,
) {
    if events.is_empty() {
        return;
    }

    for event in events {
        let key = event.partition_key();
        if ensured_partitions.contains(&key) {
            continue;
        }
        match ensure_event_partition(db, &key).await {
            Ok(()) => {
                ensured_partitions.insert(key);
            }
            Err(e) => {
                tracing::error!("failed to ensure event partition '{}': {}", key, e);
                return;
            }
        }
    }

    let mut builder = sqlx::QueryBuilder::new(
        "INSERT INTO rate_limit_events \
         (policy_id, identifier, identifier_type, allowed, remaining, limit_value, \
          ip_address, resource, event_time, partition_key) ",
    );
    builder.push_values(events, |mut row, event| {
        row.push_bind(event.policy_id)
            .push_bind(&event.identifier)
            .push_bind(event.identifier_type)
            .push_bind(event.allowed)
            .push_bind(event.remaining)
            .push_bind(event.limit_value)
            .push_bind(&event.ip_address)
            .push_bind(&event.resource)
            .push_bind(event.event_time)
            .push_bind(event.partition_key());
    });

    if let Err(e) = builder.build().execute(db).await {
        tracing::error!("failed to write {} rate-limit events: {}", events.len(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentifierType;
    use chrono::Utc;

    fn event() -> NewRateLimitEvent {
        NewRateLimitEvent {
            policy_id: None,
            identifier: "user-1".into(),
            identifier_type: IdentifierType::User,
            allowed: true,
            remaining: 9,
            limit_value: 10,
            ip_address: None,
            resource: None,
            event_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn saturated_queue_never_panics_or_blocks_forever() {
        // No workers, capacity 1: the second record deterministically takes
        // the caller-runs path. A lazy pool lets that write execute (and
        // fail, logged) without a live database.
        let db = PgPool::connect_lazy("postgres://localhost/ratekeeper_test").unwrap();
        let ingest = EventIngest::spawn(
            db,
            &IngestConfig {
                queue_capacity: 1,
                workers: 0,
                batch_size: 10,
            },
        );

        // First fills the queue; second takes the caller-runs path. Both
        // must return — failures are swallowed, not propagated.
        ingest.record(event()).await;
        ingest.record(event()).await;
    }
}
