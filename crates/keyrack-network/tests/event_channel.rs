//! EventChannel behavior against a local server: subscription, routing,
//! delivery and reconnection.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use keyrack_core::{ChannelConfig, InboundCommand, OutboundEvent, SlotNumber};
use keyrack_network::EventChannel;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    events: mpsc::Sender<OutboundEvent>,
    commands: mpsc::Receiver<InboundCommand>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    stats: std::sync::Arc<keyrack_network::ChannelStats>,
}

fn start(addr: SocketAddr) -> Harness {
    let config = ChannelConfig {
        server_addr: addr.to_string(),
        reconnect_delay_ms: 50,
        connect_timeout_ms: 1000,
        outbound_capacity: 16,
    };
    let (events, events_rx) = mpsc::channel(16);
    let (commands_tx, commands) = mpsc::channel(16);
    let channel = EventChannel::new(config, events_rx, commands_tx);
    let stats = channel.stats();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(channel.run(cancel.clone()));
    Harness {
        events,
        commands,
        cancel,
        task,
        stats,
    }
}

async fn accept(listener: &TcpListener) -> Framed<TcpStream, LinesCodec> {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    Framed::new(stream, LinesCodec::new())
}

async fn next_line(framed: &mut Framed<TcpStream, LinesCodec>) -> String {
    timeout(WAIT, framed.next()).await.unwrap().unwrap().unwrap()
}

fn slot(n: u8) -> SlotNumber {
    SlotNumber::new(n).unwrap()
}

#[tokio::test]
async fn subscribes_on_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let harness = start(listener.local_addr().unwrap());

    let mut server = accept(&listener).await;
    assert_eq!(next_line(&mut server).await, r#"{"event":"join:gpio"}"#);

    harness.cancel.cancel();
    timeout(WAIT, harness.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn routes_commands_and_skips_malformed_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut harness = start(listener.local_addr().unwrap());

    let mut server = accept(&listener).await;
    next_line(&mut server).await;
    server
        .send(r#"{"event":"gpio:unlock","slotNumber":3,"correlationToken":"txn-77"}"#)
        .await
        .unwrap();
    server.send("{not json").await.unwrap();
    server
        .send(r#"{"event":"gpio:unlock","slotNumber":5,"bookingId":"b-1"}"#)
        .await
        .unwrap();

    let first = timeout(WAIT, harness.commands.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, harness.commands.recv()).await.unwrap().unwrap();
    let InboundCommand::UnlockSlot { slot_number, .. } = first;
    assert_eq!(slot_number, slot(3));
    let InboundCommand::UnlockSlot {
        slot_number,
        correlation_token,
    } = second;
    assert_eq!(slot_number, slot(5));
    assert_eq!(correlation_token.as_str(), "b-1");

    assert_eq!(harness.stats.commands_received(), 2);
    assert_eq!(harness.stats.malformed_frames(), 1);
    harness.cancel.cancel();
}

#[tokio::test]
async fn delivers_events_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let harness = start(listener.local_addr().unwrap());

    let mut server = accept(&listener).await;
    next_line(&mut server).await;

    harness
        .events
        .send(OutboundEvent::SlotUnlocked {
            slot_number: slot(3),
            success: true,
        })
        .await
        .unwrap();
    harness
        .events
        .send(OutboundEvent::KeyPulled {
            slot_number: slot(3),
            correlation_token: keyrack_core::CorrelationToken::new("txn-77").unwrap(),
        })
        .await
        .unwrap();

    assert_eq!(
        next_line(&mut server).await,
        r#"{"event":"slot:unlocked","slotNumber":3,"success":true}"#
    );
    assert_eq!(
        next_line(&mut server).await,
        r#"{"event":"key:pulled","slotNumber":3,"correlationToken":"txn-77"}"#
    );
    harness.cancel.cancel();
}

#[tokio::test]
async fn reconnects_and_resubscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let harness = start(listener.local_addr().unwrap());

    let mut first = accept(&listener).await;
    assert_eq!(next_line(&mut first).await, r#"{"event":"join:gpio"}"#);
    drop(first);

    let mut second = accept(&listener).await;
    assert_eq!(next_line(&mut second).await, r#"{"event":"join:gpio"}"#);
    assert_eq!(harness.stats.connections(), 2);

    harness.cancel.cancel();
    timeout(WAIT, harness.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn drops_events_while_disconnected() {
    // Nothing listens here, so every connect attempt fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let harness = start(addr);

    for n in 1..=3 {
        harness
            .events
            .send(OutboundEvent::SlotUnlocked {
                slot_number: slot(n),
                success: true,
            })
            .await
            .unwrap();
    }

    timeout(WAIT, async {
        while harness.stats.events_dropped() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(harness.stats.events_sent(), 0);

    harness.cancel.cancel();
    timeout(WAIT, harness.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn flushes_queued_events_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let harness = start(listener.local_addr().unwrap());

    let mut server = accept(&listener).await;
    next_line(&mut server).await;

    harness
        .events
        .send(OutboundEvent::BorrowCancelled {
            slot_number: slot(2),
            correlation_token: keyrack_core::CorrelationToken::new("late").unwrap(),
        })
        .await
        .unwrap();
    harness.cancel.cancel();
    timeout(WAIT, harness.task).await.unwrap().unwrap();

    assert_eq!(
        next_line(&mut server).await,
        r#"{"event":"borrow:cancelled","slotNumber":2,"correlationToken":"late"}"#
    );
}
