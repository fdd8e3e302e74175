//! End-to-end tests against a real listener using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use tally_server::config::ServerConfig;
use tally_server::counter::COUNTER_MAX;
use tally_server::message::CountMessage;
use tally_server::server::{BANNER, ServerHandle, TallyServer};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config(tick_ms: u64, heartbeat_ms: u64) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        tick_interval: Duration::from_millis(tick_ms),
        heartbeat_interval: Duration::from_millis(heartbeat_ms),
        max_send_queue: 64,
        shutdown_timeout: Duration::from_secs(2),
    }
}

/// Boot a server and return it with its address and shutdown handle.
async fn boot_server(
    tick_ms: u64,
    heartbeat_ms: u64,
) -> (Arc<TallyServer>, SocketAddr, ServerHandle) {
    let server = Arc::new(TallyServer::new(test_config(tick_ms, heartbeat_ms)));
    let (addr, handle) = server.listen().await.unwrap();
    (server, addr, handle)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}/")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Read frames until the next counter update.
async fn next_count(ws: &mut WsStream) -> u32 {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("read timed out")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = msg {
            let parsed: CountMessage = serde_json::from_str(text.as_str()).unwrap();
            return parsed.count;
        }
    }
}

/// Drain until the server closes the socket. Returns the counts seen on the way.
async fn read_until_closed(ws: &mut WsStream) -> Vec<u32> {
    let mut counts = Vec::new();
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("close timed out") {
            Some(Ok(Message::Text(text))) => {
                let parsed: CountMessage = serde_json::from_str(text.as_str()).unwrap();
                counts.push(parsed.count);
            }
            Some(Ok(Message::Close(_)) | Err(_)) | None => return counts,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn client_receives_count_on_connect() {
    // Long tick so only the admission message can arrive.
    let (_server, addr, handle) = boot_server(60_000, 60_000).await;
    let mut ws = connect(addr).await;

    assert_eq!(next_count(&mut ws).await, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn first_message_is_followed_by_its_successor() {
    let (_server, addr, handle) = boot_server(50, 60_000).await;
    sleep(Duration::from_millis(180)).await;

    let mut ws = connect(addr).await;
    let first = next_count(&mut ws).await;
    let second = next_count(&mut ws).await;
    let third = next_count(&mut ws).await;
    assert!(first <= COUNTER_MAX);
    assert_eq!(second, first + 1);
    assert_eq!(third, second + 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn all_clients_see_the_same_tick() {
    let (server, addr, handle) = boot_server(60_000, 60_000).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    assert_eq!(next_count(&mut a).await, 0);
    assert_eq!(next_count(&mut b).await, 0);

    // Drive one tick by hand through the same path the clock uses.
    let counter = server.broadcaster().counter().clone();
    let (value, delivery) = server.broadcaster().publish_with(|| counter.advance());
    assert_eq!(value, 1);
    assert_eq!(delivery.delivered, 2);

    assert_eq!(next_count(&mut a).await, 1);
    assert_eq!(next_count(&mut b).await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn plain_http_returns_banner_on_any_path() {
    let (_server, addr, handle) = boot_server(60_000, 60_000).await;

    for path in ["/", "/health", "/a/b/c?q=1"] {
        let resp = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.headers()[reqwest::header::CONTENT_TYPE], "text/plain");
        assert_eq!(resp.text().await.unwrap(), BANNER);
    }

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/submit"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), BANNER);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_messages_are_ignored() {
    let (server, addr, handle) = boot_server(60_000, 60_000).await;
    let mut ws = connect(addr).await;
    assert_eq!(next_count(&mut ws).await, 0);

    ws.send(Message::Text("hello".into())).await.unwrap();
    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(server.registry().len(), 1);
    let _ = server.broadcaster().publish(9);
    assert_eq!(next_count(&mut ws).await, 9);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_close_removes_connection() {
    let (server, addr, handle) = boot_server(60_000, 60_000).await;
    let mut ws = connect(addr).await;
    assert_eq!(next_count(&mut ws).await, 0);
    assert_eq!(server.registry().len(), 1);

    ws.close(None).await.unwrap();
    let _ = read_until_closed(&mut ws).await;
    sleep(Duration::from_millis(100)).await;
    assert!(server.registry().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_client_is_evicted_while_responsive_client_stays() {
    let (server, addr, handle) = boot_server(50, 200).await;

    let mut silent = connect(addr).await;
    let _ = next_count(&mut silent).await;

    // A client that keeps reading answers pings automatically.
    let responsive = connect(addr).await;
    let reader = tokio::spawn(async move {
        let mut ws = responsive;
        let mut counts = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(1_200);
        while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(deadline, ws.next()).await {
            if let Message::Text(text) = msg {
                let parsed: CountMessage = serde_json::from_str(text.as_str()).unwrap();
                counts.push(parsed.count);
            }
        }
        (ws, counts)
    });

    // Two heartbeat periods plus slack.
    sleep(Duration::from_millis(700)).await;
    assert_eq!(server.registry().len(), 1);

    let (_responsive, counts) = reader.await.unwrap();
    assert!(counts.len() > 10, "responsive client stalled: {counts:?}");
    assert!(counts.windows(2).all(|w| w[1] == w[0] + 1));

    // The silent client finds its backlog followed by a close.
    let backlog = read_until_closed(&mut silent).await;
    assert!(backlog.len() < counts.len());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_clients_and_listener() {
    let (server, addr, handle) = boot_server(50, 60_000).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = next_count(&mut a).await;
    let _ = next_count(&mut b).await;
    assert_eq!(server.registry().len(), 2);

    handle.shutdown().await.unwrap();

    let _ = read_until_closed(&mut a).await;
    let _ = read_until_closed(&mut b).await;
    assert!(server.registry().is_empty());
    assert!(server.registry().is_closed());

    // No ticks once shut down.
    let stopped_at = server.broadcaster().counter().current();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.broadcaster().counter().current(), stopped_at);

    assert!(connect_async(format!("ws://{addr}/")).await.is_err());
}

#[tokio::test]
async fn upgrade_during_shutdown_is_refused() {
    let server = TallyServer::new(test_config(60_000, 60_000));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server.router();
    let serve = tokio::spawn(async move { axum::serve(listener, app).await });

    server.shutdown().shutdown();

    match connect_async(format!("ws://{addr}/")).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status().as_u16(), 503),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should be refused"),
    }

    serve.abort();
}
