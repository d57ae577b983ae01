//! End-to-end tests against a real WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use dagboard_channel::{ChannelClient, ConnectionState, Handler, WsConnector};
use dagboard_core::{EventAction, EventGroup, EventKey, ReconnectPolicy};
use futures::SinkExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const TIMEOUT: Duration = Duration::from_secs(5);

type ServerConn = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// Bind a listener and hand every accepted WebSocket to the test.
async fn boot_server() -> (Url, mpsc::UnboundedReceiver<ServerConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let _accept = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                if tx.send(ws).is_err() {
                    break;
                }
            }
        }
    });
    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    (url, rx)
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_retries: 5,
        base_delay_ms: 50,
    }
}

fn forwarding(tx: mpsc::UnboundedSender<Value>) -> Handler {
    Handler::new(move |data| {
        let _ = tx.send(data.clone());
        Ok(())
    })
}

async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    timeout(TIMEOUT, rx.wait_for(|s| *s == want))
        .await
        .expect("state change timed out")
        .unwrap();
}

#[tokio::test]
async fn delivers_frames_from_server() {
    let (url, mut conns) = boot_server().await;
    let client = ChannelClient::new(url, fast_policy(), Arc::new(WsConnector));
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_message(
        EventKey::new(EventGroup::Dag, EventAction::Add),
        forwarding(tx),
    );
    let mut states = client.subscribe_state();

    client.connect();
    let mut server = timeout(TIMEOUT, conns.recv()).await.unwrap().unwrap();
    wait_for(&mut states, ConnectionState::Connected).await;

    server.send(Message::text("garbage")).await.unwrap();
    server
        .send(Message::text(
            json!({"type": "dag", "action": "add", "data": {"id": 7, "name": "a"}}).to_string(),
        ))
        .await
        .unwrap();

    let data = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data, json!({"id": 7, "name": "a"}));
    client.shutdown();
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let (url, mut conns) = boot_server().await;
    let client = ChannelClient::new(url, fast_policy(), Arc::new(WsConnector));
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_message(
        EventKey::new(EventGroup::Log, EventAction::Unspecified),
        forwarding(tx),
    );
    let mut states = client.subscribe_state();
    let opens = client.subscribe_opens();

    client.connect();
    let mut first = timeout(TIMEOUT, conns.recv()).await.unwrap().unwrap();
    wait_for(&mut states, ConnectionState::Connected).await;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = timeout(TIMEOUT, conns.recv()).await.unwrap().unwrap();
    wait_for(&mut states, ConnectionState::Connected).await;
    assert_eq!(*opens.borrow(), 2);
    assert_eq!(client.retry_count(), 0);

    second
        .send(Message::text(
            json!({"type": "log", "data": {"dag_id": 1, "msg": "hi"}}).to_string(),
        ))
        .await
        .unwrap();
    let data = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data["msg"], "hi");
    client.shutdown();
}

#[tokio::test]
async fn unreachable_server_exhausts_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let policy = ReconnectPolicy {
        max_retries: 2,
        base_delay_ms: 10,
    };
    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let client = ChannelClient::new(url, policy, Arc::new(WsConnector));

    client.connect();
    timeout(TIMEOUT, async {
        while client.retry_count() < 2 || client.state() != ConnectionState::Disconnected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    // Let the last scheduled attempt finish; no further retry follows.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.retry_count(), 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
