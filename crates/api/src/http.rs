//! HTTP query, status and subscription endpoints.

use crate::error::ApiResult;
use crate::{shutdown_requested, ShutdownSignal};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Json, Response};
use axum::routing::get;
use axum::Router;
use dpe_core::LedgerEntry;
use dpe_stream::{run_writer, AgreementLedger, Frame, HubHandle};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<AgreementLedger>,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new(ledger: Arc<AgreementLedger>, hub: HubHandle) -> Self {
        Self { ledger, hub }
    }
}

/// Build the HTTP router. Files under `web_root` are served at `/web`.
pub fn router(state: AppState, web_root: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/agreements", get(agreements))
        .route("/status", get(status))
        .route("/stream/data", get(stream_data))
        .with_state(state);

    match web_root {
        Some(root) => {
            info!(web_root = %root.display(), "Serving static files under /web");
            router.nest_service("/web", ServeDir::new(root))
        }
        None => router,
    }
}

/// Serve `app` on `listener` until `shutdown` fires.
pub async fn serve_http(
    listener: TcpListener,
    app: Router,
    shutdown: ShutdownSignal,
) -> ApiResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP endpoint listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown))
        .await?;

    info!("HTTP endpoint stopped");
    Ok(())
}

async fn agreements(State(state): State<AppState>) -> Json<Vec<LedgerEntry>> {
    Json(state.ledger.snapshot())
}

async fn status() -> Json<Value> {
    Json(json!({ "service": "RUNNING" }))
}

async fn stream_data(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| subscriber_session(socket, state.hub))
}

/// Pump hub frames to one WebSocket client until either side goes away.
async fn subscriber_session(socket: WebSocket, hub: HubHandle) {
    let subscription = match hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(error = %e, "Rejecting subscriber");
            return;
        }
    };
    let id = subscription.id;
    info!(subscriber_id = %id, "Subscriber connected");

    let (sink, mut incoming) = socket.split();
    let mut writer = tokio::spawn(run_writer(
        subscription,
        sink,
        hub.clone(),
        |frame: Frame| Message::Text(frame.to_string()),
    ));

    // Inbound messages are ignored; the reader only watches for disconnect
    let mut reader = tokio::spawn(async move {
        while let Some(message) = incoming.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Subscriber socket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {
            if let Err(e) = hub.unsubscribe(id).await {
                debug!(subscriber_id = %id, error = %e, "Hub already gone while unsubscribing");
            }
            let _ = writer.await;
        }
    }
    info!(subscriber_id = %id, "Subscriber disconnected");
}
