//! gRPC Ingest Service
//!
//! Each publisher holds one bidirectional `Store` session. Records are fed to
//! the pipeline in arrival order; malformed ones are counted and skipped
//! without failing the session. When the publisher closes its side, or the
//! node begins shutting down, the session replies with a single
//! [`SessionSummary`](proto::SessionSummary) and completes with OK.

use crate::error::ApiResult;
use crate::{shutdown_requested, ShutdownSignal};
use dpe_core::{DataRecord, Location};
use dpe_stream::{IngestHandle, StreamError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{transport::Server, Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

pub mod proto {
    tonic::include_proto!("dpe.v1");
}

use proto::data_processing_engine_server::{DataProcessingEngine, DataProcessingEngineServer};
use proto::SessionSummary;

impl From<proto::DataRecord> for DataRecord {
    fn from(msg: proto::DataRecord) -> Self {
        DataRecord {
            record_id: msg.record_id,
            device_id: msg.device_id,
            agreement_id: msg.agreement_id,
            location: Location::new(msg.lat, msg.lon),
            ha_partners: msg.ha_partners.into_iter().collect(),
            device_timestamp: msg.device_timestamp,
            payload: msg.payload,
        }
    }
}

impl From<&DataRecord> for proto::DataRecord {
    fn from(record: &DataRecord) -> Self {
        proto::DataRecord {
            record_id: record.record_id.clone(),
            device_id: record.device_id.clone(),
            agreement_id: record.agreement_id.clone(),
            lat: record.location.lat,
            lon: record.location.lon,
            ha_partners: record.ha_partners.iter().cloned().collect(),
            device_timestamp: record.device_timestamp,
            payload: record.payload.clone(),
        }
    }
}

/// `DataProcessingEngine` implementation backed by the ingest pipeline.
pub struct IngestService {
    ingest: IngestHandle,
    shutdown: ShutdownSignal,
}

impl IngestService {
    pub fn new(ingest: IngestHandle, shutdown: ShutdownSignal) -> Self {
        Self { ingest, shutdown }
    }

    pub fn into_server(self) -> DataProcessingEngineServer<Self> {
        DataProcessingEngineServer::new(self)
    }
}

#[tonic::async_trait]
impl DataProcessingEngine for IngestService {
    type StoreStream = ReceiverStream<Result<SessionSummary, Status>>;

    async fn store(
        &self,
        request: Request<Streaming<proto::DataRecord>>,
    ) -> Result<Response<Self::StoreStream>, Status> {
        if self.ingest.is_closed() {
            return Err(Status::unavailable("ingest pipeline is shut down"));
        }

        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let inbound = request.into_inner();
        let ingest = self.ingest.clone();
        let shutdown = self.shutdown.clone();
        let (tx, rx) = mpsc::channel(1);

        info!(peer = %peer, "Publisher session opened");
        tokio::spawn(async move {
            let outcome = run_session(&ingest, inbound, shutdown).await;
            match &outcome {
                Ok(summary) => info!(
                    peer = %peer,
                    admitted = summary.admitted,
                    rejected = summary.rejected,
                    "Publisher session closed"
                ),
                Err(status) => warn!(peer = %peer, status = %status, "Publisher session failed"),
            }
            if tx.send(outcome).await.is_err() {
                debug!(peer = %peer, "Publisher went away before the session summary");
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn run_session(
    ingest: &IngestHandle,
    mut inbound: Streaming<proto::DataRecord>,
    shutdown: ShutdownSignal,
) -> Result<SessionSummary, Status> {
    let mut summary = SessionSummary::default();
    let stopping = shutdown_requested(shutdown);
    tokio::pin!(stopping);

    loop {
        let message = tokio::select! {
            message = inbound.message() => message?,
            _ = &mut stopping => {
                debug!("Ending publisher session for shutdown");
                return Ok(summary);
            }
        };
        let Some(message) = message else {
            return Ok(summary);
        };

        match ingest.submit(message.into()).await {
            Ok(()) => summary.admitted += 1,
            Err(StreamError::Admission(_)) => summary.rejected += 1,
            Err(e) => return Err(Status::unavailable(e.to_string())),
        }
    }
}

/// Serve the ingest endpoint on `listener` until `shutdown` fires.
pub async fn serve_grpc(
    listener: TcpListener,
    ingest: IngestHandle,
    shutdown: ShutdownSignal,
) -> ApiResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "gRPC ingest endpoint listening");
    }

    let service = IngestService::new(ingest, shutdown.clone());
    Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown_requested(shutdown),
        )
        .await?;

    info!("gRPC ingest endpoint stopped");
    Ok(())
}
