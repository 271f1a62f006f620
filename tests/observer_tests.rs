mod common;

use common::SharedSink;
use futures::{SinkExt, StreamExt};
use groundlink::observer::{self, ObserverSettings};
use groundlink::relay::Relay;
use groundlink::simulation::SimulationSettings;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay() -> (Arc<Relay>, SharedSink, SocketAddr) {
    let sink = SharedSink::default();
    let relay = Relay::new(Box::new(sink.clone()), SimulationSettings::default());

    let settings = ObserverSettings {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ObserverSettings::default()
    };
    let listener = observer::bind(&settings).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(observer::serve(listener, Arc::clone(&relay), settings));

    (relay, sink, addr)
}

async fn wait_for_observer(relay: &Relay, connected: bool) -> bool {
    for _ in 0..250 {
        if relay.status().await.observer_connected == connected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn wait_for_serial(sink: &SharedSink, expected: &str) -> bool {
    for _ in 0..250 {
        if sink.contents() == expected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_observer_receives_records_and_sends_commands() {
    let (relay, sink, addr) = start_relay().await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    assert!(wait_for_observer(&relay, true).await);

    assert!(relay.broadcast("2078,00:00:05,5,F,ASCENT,GOAT").await);
    let message = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(message, Message::Text("2078,00:00:05,5,F,ASCENT,GOAT".to_string()));

    socket.send(Message::Text("CMD,2078,CX,ON".to_string())).await.unwrap();
    assert!(wait_for_serial(&sink, "CMD,2078,CX,ON").await);

    socket.close(None).await.unwrap();
    assert!(wait_for_observer(&relay, false).await);
}

#[tokio::test]
async fn test_upgrade_on_other_path_is_rejected() {
    let (relay, _sink, addr) = start_relay().await;

    let result = connect_async(format!("ws://{}/telemetry", addr)).await;

    assert!(result.is_err());
    assert!(!relay.status().await.observer_connected);
}

#[tokio::test]
async fn test_second_observer_takes_over() {
    let (relay, _sink, addr) = start_relay().await;
    let url = format!("ws://{}/ws", addr);

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    assert!(wait_for_observer(&relay, true).await);

    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    // The first connection is closed by the relay.
    let ended = timeout(WAIT, async {
        loop {
            match first.next().await {
                Some(Ok(Message::Text(_))) => continue,
                _ => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    // Records now go to the second observer only.
    assert!(relay.broadcast("2078,B,GOAT").await);
    let message = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(message, Message::Text("2078,B,GOAT".to_string()));
}

#[tokio::test]
async fn test_binary_messages_are_forwarded() {
    let (relay, sink, addr) = start_relay().await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    assert!(wait_for_observer(&relay, true).await);

    socket.send(Message::Binary(b"CMD,2078,SIM,EN,GOAT".to_vec())).await.unwrap();

    assert!(wait_for_serial(&sink, "CMD,2078,SIM,EN,GOAT").await);
    assert!(relay.sim_state().await.enabled);
}
