//! Integration tests for ChannelClient against a local line-based server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use keyrack_core::{ChannelConfig, CorrelationToken, InboundCommand, OutboundEvent, SlotNumber};
use keyrack_network::{ChannelClient, ChannelError, InboundFrame};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};

fn config(addr: std::net::SocketAddr) -> ChannelConfig {
    ChannelConfig {
        server_addr: addr.to_string(),
        connect_timeout_ms: 1000,
        ..ChannelConfig::default()
    }
}

#[tokio::test]
async fn test_send_and_receive_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        let line = framed.next().await.unwrap().unwrap();
        framed
            .send(r#"{"event":"gpio:unlock","slotNumber":3,"correlationToken":"txn-77"}"#)
            .await
            .unwrap();
        line
    });

    let mut client = ChannelClient::new(&config(addr));
    client.connect().await.unwrap();
    assert!(client.is_connected());

    let event = OutboundEvent::SlotUnlocked {
        slot_number: SlotNumber::new(3).unwrap(),
        success: true,
    };
    client.send(&event).await.unwrap();

    let frame = client.recv().await.unwrap();
    assert_eq!(
        frame,
        InboundFrame::Command(InboundCommand::UnlockSlot {
            slot_number: SlotNumber::new(3).unwrap(),
            correlation_token: CorrelationToken::new("txn-77").unwrap(),
        })
    );

    let line = server.await.unwrap();
    assert_eq!(line, r#"{"event":"slot:unlocked","slotNumber":3,"success":true}"#);

    client.close().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = ChannelClient::new(&config(addr));
    assert!(client.connect().await.is_err());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connection_lost_during_recv() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut client = ChannelClient::new(&config(addr));
    client.connect().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), client.recv())
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(ChannelError::ConnectionLost(_) | ChannelError::Io(_))
    ));
}
