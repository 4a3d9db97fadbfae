//! Synchrophasor DPE node.
//!
//! Binds the gRPC ingest endpoint and the HTTP endpoint, runs the pipeline
//! and drains it on Ctrl-C.

use anyhow::{bail, Context, Result};
use dpe_api::{bind, router, serve_grpc, serve_http, AppState};
use dpe_core::{logging, Config};
use dpe_stream::{Pipeline, PipelineSettings};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Version of the `dpe.v1` ingest protocol served by this build
const INGEST_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: INGEST_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config_path = parse_config_path(&args)?;
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    logging::init(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "Starting synchrophasor DPE"
    );

    let grpc_listener = bind(config.ingest.bind_addr)
        .await
        .context("cannot start gRPC ingest endpoint")?;
    let http_listener = bind(config.http.bind_addr)
        .await
        .context("cannot start HTTP endpoint")?;

    let pipeline = Pipeline::spawn(PipelineSettings::from_config(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = router(
        AppState::new(Arc::clone(&pipeline.ledger), pipeline.hub.clone()),
        config.http.web_root.as_deref(),
    );
    let grpc = tokio::spawn(serve_grpc(
        grpc_listener,
        pipeline.ingest.clone(),
        shutdown_rx.clone(),
    ));
    let http = tokio::spawn(serve_http(http_listener, app, shutdown_rx));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Unable to listen for Ctrl-C, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let (grpc_result, http_result) = tokio::join!(grpc, http);
    grpc_result
        .context("gRPC ingest task panicked")?
        .context("gRPC ingest endpoint failed")?;
    http_result
        .context("HTTP task panicked")?
        .context("HTTP endpoint failed")?;

    let metrics = Arc::clone(&pipeline.metrics);
    pipeline.join().await.context("pipeline task panicked")?;

    let totals = metrics.snapshot();
    info!(
        admitted = totals.admitted,
        rejected = totals.rejected,
        published = totals.published,
        suppressed = totals.suppressed,
        "Synchrophasor DPE stopped"
    );
    Ok(())
}

/// `--config <path>` is optional; defaults and environment apply without it.
fn parse_config_path(args: &[String]) -> Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            match args_iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            }
        }
    }
    Ok(None)
}
