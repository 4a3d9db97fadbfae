//! Broadcast hub for the deduplicated record stream.
//!
//! One coordinator task owns the subscriber set. Registrations, removals and
//! published records all arrive as messages, so the set is never shared or
//! locked. Each record is serialized once and offered to every subscriber
//! queue without waiting; a subscriber whose queue is full is dropped on the
//! spot so it can never hold up the producer or the other subscribers.

use crate::error::StreamResult;
use dpe_core::DataRecord;
use futures_util::{Sink, SinkExt};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifier assigned to a subscriber on registration.
pub type SubscriberId = Uuid;

/// A serialized record as pushed to subscribers.
pub type Frame = Arc<str>;

/// Errors surfaced to hub callers.
#[derive(Debug, Error)]
pub enum HubError {
    /// The coordinator task has exited
    #[error("Broadcast hub is not running")]
    Closed,
}

/// Counters published by the coordinator.
#[derive(Debug, Default)]
pub struct HubMetrics {
    active_subscribers: AtomicUsize,
    frames_delivered: AtomicU64,
    evictions: AtomicU64,
    serialization_failures: AtomicU64,
}

/// Point-in-time copy of [`HubMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubMetricsSnapshot {
    pub active_subscribers: usize,
    pub frames_delivered: u64,
    pub evictions: u64,
    pub serialization_failures: u64,
}

impl HubMetrics {
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            active_subscribers: self.active_subscribers.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
        }
    }
}

struct Registration {
    id: SubscriberId,
    queue: mpsc::Sender<Frame>,
}

/// Receiving side of a subscriber's outbound queue.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub frames: mpsc::Receiver<Frame>,
}

/// Cloneable front end used to join and leave the hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<SubscriberId>,
    queue_capacity: usize,
    metrics: Arc<HubMetrics>,
}

impl HubHandle {
    /// Register a new subscriber with a bounded outbound queue.
    pub async fn subscribe(&self) -> StreamResult<Subscription> {
        let (queue, frames) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.register_tx
            .send(Registration { id, queue })
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(Subscription { id, frames })
    }

    /// Remove a subscriber. Unknown or already evicted ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) -> StreamResult<()> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::Closed)?;
        Ok(())
    }

    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// The coordinator. Build with [`BroadcastHub::new`], then drive with
/// [`BroadcastHub::run`] on its own task.
pub struct BroadcastHub {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Frame>>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<SubscriberId>,
    records_rx: mpsc::Receiver<Arc<DataRecord>>,
    metrics: Arc<HubMetrics>,
}

/// Control requests buffered between handles and the coordinator.
const CONTROL_QUEUE_CAPACITY: usize = 64;

impl BroadcastHub {
    /// Create a hub fed by `records_rx` whose subscribers each buffer up to
    /// `subscriber_queue_capacity` frames.
    pub fn new(
        records_rx: mpsc::Receiver<Arc<DataRecord>>,
        subscriber_queue_capacity: usize,
    ) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let metrics = Arc::new(HubMetrics::default());

        let hub = Self {
            subscribers: HashMap::new(),
            register_rx,
            unregister_rx,
            records_rx,
            metrics: Arc::clone(&metrics),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            queue_capacity: subscriber_queue_capacity.max(1),
            metrics,
        };
        (hub, handle)
    }

    /// Service registrations, removals and records until the record stream
    /// closes, then close every subscriber queue.
    pub async fn run(mut self) {
        let mut register_open = true;
        let mut unregister_open = true;

        loop {
            tokio::select! {
                registration = self.register_rx.recv(), if register_open => match registration {
                    Some(registration) => self.register(registration),
                    None => register_open = false,
                },
                id = self.unregister_rx.recv(), if unregister_open => match id {
                    Some(id) => self.unregister(id),
                    None => unregister_open = false,
                },
                record = self.records_rx.recv() => match record {
                    Some(record) => self.broadcast(&record),
                    None => break,
                },
            }
        }

        info!(
            subscribers = self.subscribers.len(),
            "Record stream closed, shutting down broadcast hub"
        );
        self.subscribers.clear();
        self.sync_active();
    }

    fn register(&mut self, registration: Registration) {
        debug!(subscriber_id = %registration.id, "Subscriber registered");
        self.subscribers.insert(registration.id, registration.queue);
        self.sync_active();
    }

    fn unregister(&mut self, id: SubscriberId) {
        // Dropping the sender closes the queue, which stops the writer
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber_id = %id, "Subscriber unregistered");
            self.sync_active();
        }
    }

    fn broadcast(&mut self, record: &DataRecord) {
        let frame: Frame = match encode_record(record) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(
                    record_id = %record.record_id,
                    error = %e,
                    "Unable to serialize record for output"
                );
                self.metrics
                    .serialization_failures
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let metrics = &self.metrics;
        self.subscribers.retain(|id, queue| match queue.try_send(Arc::clone(&frame)) {
            Ok(()) => {
                metrics.frames_delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber_id = %id, "Subscriber queue full, evicting");
                metrics.evictions.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber_id = %id, "Subscriber queue closed, removing");
                false
            }
        });
        self.sync_active();
    }

    fn sync_active(&self) {
        self.metrics
            .active_subscribers
            .store(self.subscribers.len(), Ordering::Relaxed);
    }
}

/// JSON frame for one record.
pub fn encode_record(record: &DataRecord) -> StreamResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Drain `subscription` into `sink` in FIFO order.
///
/// Returns when the hub closes the queue or the sink fails. On sink failure
/// the subscriber is unregistered so the hub stops feeding it.
pub async fn run_writer<S, M, F>(
    mut subscription: Subscription,
    mut sink: S,
    hub: HubHandle,
    into_message: F,
) where
    S: Sink<M> + Unpin,
    S::Error: Display,
    F: Fn(Frame) -> M,
{
    let id = subscription.id;
    let mut failed = false;
    while let Some(frame) = subscription.frames.recv().await {
        if let Err(e) = sink.send(into_message(frame)).await {
            warn!(subscriber_id = %id, error = %e, "Subscriber transport failed");
            failed = true;
            break;
        }
    }
    if failed {
        if let Err(e) = hub.unsubscribe(id).await {
            debug!(subscriber_id = %id, error = %e, "Hub already gone while unsubscribing");
        }
    }
    let _ = sink.close().await;
    debug!(subscriber_id = %id, "Subscriber writer stopped");
}
