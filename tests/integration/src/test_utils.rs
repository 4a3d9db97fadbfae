//! Test utilities for running a full node in-process

use bytes::Bytes;
use dpe_api::grpc::proto::data_processing_engine_client::DataProcessingEngineClient;
use dpe_api::grpc::proto::DataRecord;
use dpe_api::{bind, router, serve_grpc, serve_http, ApiResult, AppState};
use dpe_stream::{Pipeline, PipelineSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// A node bound to ephemeral localhost ports.
pub struct TestNode {
    pub grpc_url: String,
    pub http_url: String,
    pub ws_url: String,
    pub pipeline: Pipeline,
    shutdown: watch::Sender<bool>,
    grpc: JoinHandle<ApiResult<()>>,
    http: JoinHandle<ApiResult<()>>,
}

impl TestNode {
    /// Start a node with small queues.
    pub async fn start() -> Self {
        Self::start_with(PipelineSettings {
            inbound_queue_capacity: 1024,
            ring_capacity: 50,
            dedup_window: Duration::from_secs(5),
            publish_queue_capacity: 64,
            subscriber_queue_capacity: 64,
        })
        .await
    }

    pub async fn start_with(settings: PipelineSettings) -> Self {
        let grpc_listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let http_listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let grpc_addr = grpc_listener.local_addr().unwrap();
        let http_addr = http_listener.local_addr().unwrap();

        let pipeline = Pipeline::spawn(settings);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let app = router(
            AppState::new(Arc::clone(&pipeline.ledger), pipeline.hub.clone()),
            None,
        );

        let grpc = tokio::spawn(serve_grpc(
            grpc_listener,
            pipeline.ingest.clone(),
            shutdown_rx.clone(),
        ));
        let http = tokio::spawn(serve_http(http_listener, app, shutdown_rx));

        // Wait for servers to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            grpc_url: format!("http://{}", grpc_addr),
            http_url: format!("http://{}", http_addr),
            ws_url: format!("ws://{}/stream/data", http_addr),
            pipeline,
            shutdown,
            grpc,
            http,
        }
    }

    pub async fn grpc_client(&self) -> DataProcessingEngineClient<Channel> {
        DataProcessingEngineClient::connect(self.grpc_url.clone())
            .await
            .unwrap()
    }

    /// Block until the hub reports `expected` subscribers.
    pub async fn wait_for_subscribers(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.pipeline.hub.metrics().active_subscribers != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    /// Stop both servers and drain the pipeline.
    pub async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.grpc.await.unwrap().unwrap();
        self.http.await.unwrap().unwrap();
        self.pipeline.join().await.unwrap();
    }
}

/// A valid reading from `device_id` with the given HA partners.
pub fn reading(record_id: &str, device_id: &str, partners: &[&str]) -> DataRecord {
    DataRecord {
        record_id: record_id.to_string(),
        device_id: device_id.to_string(),
        agreement_id: "agreement-1".to_string(),
        lat: 45.52,
        lon: -122.68,
        ha_partners: partners.iter().map(|p| p.to_string()).collect(),
        device_timestamp: 1_700_000_000.25,
        payload: Bytes::from_static(b"{\"freq\":60.01}"),
    }
}
