//! Publisher to subscriber flow over real sockets

use crate::test_utils::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_frame(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_ha_duplicate_reaches_subscriber_once() {
    let node = TestNode::start().await;
    let (mut ws, _) = connect_async(node.ws_url.as_str()).await.unwrap();
    node.wait_for_subscribers(1).await;

    let mut client = node.grpc_client().await;
    let records = vec![
        reading("r1", "pmu-a", &["pmu-b"]),
        reading("r1", "pmu-b", &["pmu-a"]),
        reading("r2", "pmu-b", &["pmu-a"]),
    ];
    let mut replies = client
        .store(tokio_stream::iter(records))
        .await
        .unwrap()
        .into_inner();
    let summary = replies.message().await.unwrap().unwrap();
    assert_eq!(summary.admitted, 3);
    assert_eq!(summary.rejected, 0);

    let first = next_frame(&mut ws).await;
    assert_eq!(first["recordId"], "r1");
    assert_eq!(first["deviceId"], "pmu-a");
    assert_eq!(first["haPartners"], serde_json::json!(["pmu-b"]));
    assert_eq!(first["lat"], 45.52);
    assert_eq!(first["payload"], "eyJmcmVxIjo2MC4wMX0=");

    // r1 from pmu-b was suppressed, so r2 is next
    let second = next_frame(&mut ws).await;
    assert_eq!(second["recordId"], "r2");
    assert_eq!(second["deviceId"], "pmu-b");

    let metrics = node.pipeline.metrics.snapshot();
    assert_eq!(metrics.published, 2);
    assert_eq!(metrics.suppressed, 1);

    drop(replies);
    drop(client);
    ws.close(None).await.unwrap();
    node.stop().await;
}

#[tokio::test]
async fn test_every_subscriber_receives_each_frame() {
    let node = TestNode::start().await;
    let (mut ws_a, _) = connect_async(node.ws_url.as_str()).await.unwrap();
    let (mut ws_b, _) = connect_async(node.ws_url.as_str()).await.unwrap();
    node.wait_for_subscribers(2).await;

    let mut client = node.grpc_client().await;
    let records: Vec<_> = (0..5)
        .map(|n| reading(&format!("r{}", n), "pmu-a", &["pmu-b"]))
        .collect();
    let mut replies = client
        .store(tokio_stream::iter(records))
        .await
        .unwrap()
        .into_inner();
    replies.message().await.unwrap().unwrap();

    for ws in [&mut ws_a, &mut ws_b] {
        for n in 0..5 {
            assert_eq!(next_frame(ws).await["recordId"], format!("r{}", n));
        }
    }

    drop(replies);
    drop(client);
    node.stop().await;
}

#[tokio::test]
async fn test_disconnected_subscriber_is_removed() {
    let node = TestNode::start().await;
    let (mut ws, _) = connect_async(node.ws_url.as_str()).await.unwrap();
    node.wait_for_subscribers(1).await;

    ws.close(None).await.unwrap();
    node.wait_for_subscribers(0).await;

    node.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_subscriber_stream() {
    let node = TestNode::start().await;
    let (mut ws, _) = connect_async(node.ws_url.as_str()).await.unwrap();
    node.wait_for_subscribers(1).await;

    node.stop().await;

    let ended = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "subscriber stream should end on shutdown");
}
