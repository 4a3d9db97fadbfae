//! Ingest pipeline: admission, ledger update, dedup and hand-off to the hub.
//!
//! Publisher sessions call [`IngestHandle::submit`]. Admitted records update
//! the ledger in the caller's task and are then queued for the single dedup
//! worker, which forwards published records to the broadcast hub. Both queues
//! are bounded and block when full.

use crate::dedup::{Decision, DedupEngine};
use crate::error::StreamResult;
use crate::hub::{BroadcastHub, HubHandle};
use crate::ledger::AgreementLedger;
use dpe_core::{Config, DataRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Why a record was refused at the door.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Location is unset (lat or lon is zero)")]
    ZeroLocation,

    #[error("Location is not a finite coordinate")]
    NonFiniteLocation,

    #[error("Agreement id is empty")]
    MissingAgreementId,
}

/// Failures of the pipeline itself, as opposed to the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline is shut down")]
    Closed,
}

/// Check that `record` carries a usable location and an agreement id.
pub fn validate(record: &DataRecord) -> Result<(), AdmissionError> {
    if !record.location.is_finite() {
        return Err(AdmissionError::NonFiniteLocation);
    }
    if record.location.is_unset() {
        return Err(AdmissionError::ZeroLocation);
    }
    if record.agreement_id.is_empty() {
        return Err(AdmissionError::MissingAgreementId);
    }
    Ok(())
}

/// Pipeline-wide counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    admitted: AtomicU64,
    rejected: AtomicU64,
    published: AtomicU64,
    suppressed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub published: u64,
    pub suppressed: u64,
}

impl PipelineMetrics {
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Sizing for the pipeline's queues and dedup history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub inbound_queue_capacity: usize,
    pub ring_capacity: usize,
    pub dedup_window: Duration,
    pub publish_queue_capacity: usize,
    pub subscriber_queue_capacity: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inbound_queue_capacity: config.ingest.queue_capacity,
            ring_capacity: config.dedup.ring_capacity,
            dedup_window: config.dedup.window(),
            publish_queue_capacity: config.hub.publish_queue_capacity,
            subscriber_queue_capacity: config.hub.subscriber_queue_capacity,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cloneable entry point for publisher sessions.
#[derive(Clone)]
pub struct IngestHandle {
    inbound: mpsc::Sender<Arc<DataRecord>>,
    ledger: Arc<AgreementLedger>,
    metrics: Arc<PipelineMetrics>,
}

impl IngestHandle {
    /// Admit `record`, update the ledger and queue it for deduplication.
    ///
    /// Waits while the inbound queue is full. Malformed records fail with
    /// [`StreamError::Admission`](crate::StreamError::Admission).
    pub async fn submit(&self, record: DataRecord) -> StreamResult<()> {
        if let Err(reason) = validate(&record) {
            debug!(
                record_id = %record.record_id,
                device_id = %record.device_id,
                reason = %reason,
                "Rejecting malformed record"
            );
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(reason.into());
        }
        if self.inbound.is_closed() {
            return Err(PipelineError::Closed.into());
        }

        let record = Arc::new(record);
        self.ledger.upsert(&record);
        self.inbound
            .send(record)
            .await
            .map_err(|_| PipelineError::Closed)?;
        self.metrics.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

/// A running pipeline and the handles needed to feed and observe it.
pub struct Pipeline {
    pub ingest: IngestHandle,
    pub hub: HubHandle,
    pub ledger: Arc<AgreementLedger>,
    pub dedup: Arc<DedupEngine>,
    pub metrics: Arc<PipelineMetrics>,
    worker: JoinHandle<()>,
    hub_task: JoinHandle<()>,
}

impl Pipeline {
    /// Build the pipeline and spawn its dedup worker and hub coordinator.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: PipelineSettings) -> Self {
        let ledger = Arc::new(AgreementLedger::new());
        let dedup = Arc::new(DedupEngine::new(
            settings.ring_capacity,
            settings.dedup_window,
        ));
        let metrics = Arc::new(PipelineMetrics::default());

        let (inbound_tx, inbound_rx) = mpsc::channel(settings.inbound_queue_capacity.max(1));
        let (publish_tx, publish_rx) = mpsc::channel(settings.publish_queue_capacity.max(1));
        let (hub, hub_handle) = BroadcastHub::new(publish_rx, settings.subscriber_queue_capacity);

        let hub_task = tokio::spawn(hub.run());
        let worker = tokio::spawn(run_dedup_worker(
            inbound_rx,
            Arc::clone(&dedup),
            publish_tx,
            Arc::clone(&metrics),
        ));

        info!(
            inbound_queue = settings.inbound_queue_capacity,
            ring_capacity = settings.ring_capacity,
            window_secs = settings.dedup_window.as_secs(),
            "Ingest pipeline started"
        );

        Self {
            ingest: IngestHandle {
                inbound: inbound_tx,
                ledger: Arc::clone(&ledger),
                metrics: Arc::clone(&metrics),
            },
            hub: hub_handle,
            ledger,
            dedup,
            metrics,
            worker,
            hub_task,
        }
    }

    /// Drain and stop.
    ///
    /// Drops this pipeline's [`IngestHandle`]; once every clone is gone the
    /// worker empties the inbound queue, the hub delivers what it was given
    /// and closes all subscriber queues.
    pub async fn join(self) -> Result<(), JoinError> {
        let Pipeline {
            ingest,
            worker,
            hub_task,
            ..
        } = self;
        drop(ingest);

        worker.await?;
        hub_task.await?;
        info!("Ingest pipeline drained");
        Ok(())
    }
}

async fn run_dedup_worker(
    mut inbound: mpsc::Receiver<Arc<DataRecord>>,
    dedup: Arc<DedupEngine>,
    publish: mpsc::Sender<Arc<DataRecord>>,
    metrics: Arc<PipelineMetrics>,
) {
    while let Some(record) = inbound.recv().await {
        match dedup.process(Arc::clone(&record)) {
            Decision::Publish => {
                metrics.published.fetch_add(1, Ordering::Relaxed);
                if publish.send(record).await.is_err() {
                    warn!("Broadcast hub stopped, dedup worker exiting");
                    return;
                }
            }
            Decision::Suppress { .. } => {
                metrics.suppressed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!("Inbound queue closed, dedup worker exiting");
}
