//! End-to-end tests driving the client against the real server.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use realtime_client::{Endpoint, RealtimeClient, ReconnectPolicy};
use realtime_server::{RealtimeServer, ServerConfig};
use realtime_wire::kind;

async fn start_server(config: ServerConfig) -> (RealtimeServer, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RealtimeServer::new(config);
    let runner = server.clone();
    tokio::spawn(async move {
        let _ = runner.run(listener).await;
    });
    (server, Endpoint::insecure(addr.to_string()))
}

async fn wait_for_clients(server: &RealtimeServer, count: usize) {
    timeout(Duration::from_secs(2), async {
        loop {
            if server.client_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("server never reached {} clients", count));
}

#[tokio::test(flavor = "multi_thread")]
async fn full_session_lifecycle() {
    let (server, endpoint) = start_server(ServerConfig::default()).await;

    let policy = ReconnectPolicy {
        initial_delay: Duration::from_millis(100),
        ..ReconnectPolicy::default()
    };
    let client = RealtimeClient::with_policy(endpoint, policy);

    let (system_tx, mut system_rx) = mpsc::unbounded_channel();
    client.on(kind::SYSTEM, move |frame| {
        let _ = system_tx.send(frame.field_str("message").unwrap_or_default().to_string());
    });
    let (job_tx, mut job_rx) = mpsc::unbounded_channel();
    client.on(kind::JOB, move |frame| {
        let _ = job_tx.send(frame.field_str("message").unwrap_or_default().to_string());
    });

    assert!(client.connect("user-1").await);

    // the server answers the handshake with a welcome notice
    let welcome = timeout(Duration::from_secs(2), system_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(welcome, "Connected to real-time updates");

    // a targeted update reaches the handler
    assert!(server.send_job_update("user-1", "Interview scheduled").await);
    let update = timeout(Duration::from_secs(2), job_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update, "Interview scheduled");

    // client-to-server traffic goes through while connected
    assert!(client.send(&serde_json::json!({"type": "chat", "msg": "hello"})));

    // the server drops every socket of the user; the client notices and
    // dials back in with the identity it was given at connect time
    assert_eq!(server.registry().disconnect_user("user-1").await, 1);

    let welcome = timeout(Duration::from_secs(3), system_rx.recv())
        .await
        .expect("client did not reconnect and re-authenticate")
        .unwrap();
    assert_eq!(welcome, "Connected to real-time updates");

    // the re-authenticated session receives updates again
    wait_for_clients(&server, 1).await;
    assert!(server.send_job_update("user-1", "Offer extended").await);
    let update = timeout(Duration::from_secs(2), job_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update, "Offer extended");

    client.disconnect();
}

#[tokio::test(flavor = "multi_thread")]
async fn keepalive_survives_aggressive_sweeps() {
    let config = ServerConfig {
        ping_interval: Duration::from_millis(100),
    };
    let (server, endpoint) = start_server(config).await;

    let client = RealtimeClient::new(endpoint);
    assert!(client.connect("user-1").await);
    wait_for_clients(&server, 1).await;

    // the client answers pings on its own; several sweep intervals pass
    // without the server terminating it
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.client_count().await, 1);
    assert!(client.is_connected());

    client.disconnect();
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcast_reaches_every_identity() {
    let (server, endpoint) = start_server(ServerConfig::default()).await;

    let alice = RealtimeClient::new(endpoint.clone());
    let bob = RealtimeClient::new(endpoint);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx2 = tx.clone();
    alice.on(kind::MARKET, move |frame| {
        let _ = tx.send(format!("alice:{}", frame.field_str("message").unwrap_or_default()));
    });
    bob.on(kind::MARKET, move |frame| {
        let _ = tx2.send(format!("bob:{}", frame.field_str("message").unwrap_or_default()));
    });

    assert!(alice.connect("alice").await);
    assert!(bob.connect("bob").await);
    wait_for_clients(&server, 2).await;

    let frame: realtime_wire::Envelope =
        realtime_wire::UpdateMessage::new(realtime_wire::UpdateKind::Market, "Demand up").into();
    assert_eq!(server.broadcast(&frame).await, 2);

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap());
    }
    seen.sort();
    assert_eq!(seen, vec!["alice:Demand up", "bob:Demand up"]);

    alice.disconnect();
    bob.disconnect();
}
