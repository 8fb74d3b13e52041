// File: pacebot-core/tests/relay_tests.rs
//
// Loopback hub + client tests: a real TcpListener on an ephemeral port,
// real websocket clients, no external services.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

use pacebot_common::models::relay::{ChannelTarget, RelayEvent};
use pacebot_core::platforms::ConnectionStatus;
use pacebot_core::relay::{RelayClient, RelayHub};

async fn start_hub() -> (RelayHub, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = RelayHub::new();
    let hub_for_serve = hub.clone();
    tokio::spawn(async move {
        let _ = hub_for_serve.serve(listener).await;
    });
    (hub, format!("ws://{addr}"))
}

async fn connected_client(url: &str, id: &str) -> RelayClient {
    let client = RelayClient::connect(url, id);
    let mut status = client.status_watch();
    timeout(Duration::from_secs(5), async {
        while !matches!(*status.borrow(), ConnectionStatus::Connected) {
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("client should connect to the loopback hub");
    client
}

fn join_event(channel: &str) -> RelayEvent {
    RelayEvent::JoinChannel(ChannelTarget { channel_name: channel.into() })
}

#[tokio::test]
async fn publish_reaches_every_connected_subscriber_exactly_once() {
    let (_hub, url) = start_hub().await;

    let mut c1 = connected_client(&url, "consumer-1").await;
    let mut c2 = connected_client(&url, "consumer-2").await;
    let mut c3 = connected_client(&url, "consumer-3").await;
    let producer = connected_client(&url, "producer").await;

    let mut rx1 = c1.take_incoming().unwrap();
    let mut rx2 = c2.take_incoming().unwrap();
    let mut rx3 = c3.take_incoming().unwrap();

    producer.emit(join_event("speedchat"));

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let envelope = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivery within the timeout")
            .expect("stream still open");
        assert_eq!(envelope.source, "producer");
        assert_eq!(envelope.event, join_event("speedchat"));
    }

    // Exactly once: no straggler frame shows up afterwards.
    assert!(timeout(Duration::from_millis(200), rx1.recv()).await.is_err());
}

#[tokio::test]
async fn producer_does_not_receive_its_own_event() {
    let (_hub, url) = start_hub().await;

    let mut consumer = connected_client(&url, "consumer").await;
    let mut producer = connected_client(&url, "producer").await;

    let mut consumer_rx = consumer.take_incoming().unwrap();
    let mut producer_rx = producer.take_incoming().unwrap();

    producer.emit(join_event("speedchat"));

    let envelope = timeout(Duration::from_secs(2), consumer_rx.recv())
        .await
        .expect("consumer should receive")
        .expect("stream still open");
    assert_eq!(envelope.source, "producer");

    assert!(timeout(Duration::from_millis(200), producer_rx.recv()).await.is_err());
}

#[tokio::test]
async fn disconnected_subscriber_misses_events() {
    let (hub, url) = start_hub().await;

    let mut kept = connected_client(&url, "kept").await;
    let gone = connected_client(&url, "gone").await;
    let producer = connected_client(&url, "producer").await;
    let mut kept_rx = kept.take_incoming().unwrap();

    gone.shutdown();

    // Wait for the hub to notice the dropped socket.
    timeout(Duration::from_secs(2), async {
        while hub.state().subscriber_count() > 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hub should unregister the dropped connection");

    producer.emit(join_event("speedchat"));

    let envelope = timeout(Duration::from_secs(2), kept_rx.recv())
        .await
        .expect("remaining subscriber still receives")
        .expect("stream still open");
    assert_eq!(envelope.event, join_event("speedchat"));

    // No replay buffer: nothing is queued for the dropped client, which
    // would have to rely on reconciliation after reconnecting.
    assert_eq!(hub.state().subscriber_count(), 2);
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_breaking_the_hub() {
    use futures_util::SinkExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    let (_hub, url) = start_hub().await;

    let mut consumer = connected_client(&url, "consumer").await;
    let mut consumer_rx = consumer.take_incoming().unwrap();

    // A raw socket that speaks garbage first, then a valid frame.
    let (mut raw, _) = connect_async(format!("{url}?clientId=garbage-producer"))
        .await
        .expect("raw connect");
    raw.send(Message::text("this is not json")).await.unwrap();
    raw.send(Message::text(
        r#"{"event":"joinChannel","payload":{"channelName":"speedchat"},"source":"garbage-producer"}"#,
    ))
    .await
    .unwrap();

    let envelope = timeout(Duration::from_secs(2), consumer_rx.recv())
        .await
        .expect("valid frame still delivered")
        .expect("stream still open");
    assert_eq!(envelope.event, join_event("speedchat"));
    assert_eq!(envelope.source, "garbage-producer");
}
