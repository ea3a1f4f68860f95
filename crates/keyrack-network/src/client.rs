//! TCP client for the remote authority.
//!
//! One connection carries both directions: outbound events are written as
//! JSON lines, inbound commands are read with the same framing.
//!
//! ```text
//! EventChannel ──> ChannelClient ───(TCP)───> remote authority
//!                       │
//!                       └─> EventCodec (newline-delimited JSON)
//! ```
//!
//! The client itself never retries; reconnection policy lives in
//! [`EventChannel`](crate::EventChannel).

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use keyrack_core::{ChannelConfig, OutboundEvent};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::codec::{EventCodec, InboundFrame};
use crate::error::{ChannelError, Result};

/// Timeout for flush and shutdown on close.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// A single connection to the remote authority.
#[derive(Debug)]
pub struct ChannelClient {
    server_addr: String,
    connect_timeout: Duration,
    framed: Option<Framed<TcpStream, EventCodec>>,
}

impl ChannelClient {
    /// Create a client; it is not connected until [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            server_addr: config.server_addr.clone(),
            connect_timeout: config.connect_timeout(),
            framed: None,
        }
    }

    #[must_use]
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Connect to the server with the configured timeout.
    ///
    /// # Errors
    ///
    /// `ChannelError::ConnectionTimeout` if the timeout elapses, otherwise the
    /// I/O error from the connect attempt.
    pub async fn connect(&mut self) -> Result<()> {
        debug!(server = %self.server_addr, "connecting");

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.server_addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ChannelError::ConnectionTimeout(
                    self.connect_timeout.as_millis() as u64,
                ));
            }
        };

        // Events are small and latency matters more than throughput.
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY");
        }

        self.framed = Some(Framed::new(stream, EventCodec::new()));
        info!(server = %self.server_addr, "connected");
        Ok(())
    }

    /// Write one event.
    ///
    /// # Errors
    ///
    /// `ChannelError::NotConnected` before `connect`, otherwise the encode or
    /// write failure.
    pub async fn send(&mut self, event: &OutboundEvent) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(ChannelError::NotConnected)?;
        framed.send(event).await?;
        trace!(event = event.name(), slot = ?event.slot(), "frame sent");
        Ok(())
    }

    /// Wait for the next inbound frame.
    ///
    /// # Errors
    ///
    /// `ChannelError::NotConnected` before `connect`,
    /// `ChannelError::ConnectionLost` when the server closes the connection,
    /// or the underlying I/O error.
    pub async fn recv(&mut self) -> Result<InboundFrame> {
        let framed = self.framed.as_mut().ok_or(ChannelError::NotConnected)?;
        match framed.next().await {
            Some(Ok(frame)) => {
                trace!(?frame, "frame received");
                Ok(frame)
            }
            Some(Err(e)) => Err(e),
            None => Err(ChannelError::ConnectionLost(
                "Server closed connection".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Flush and shut the connection down; idempotent.
    pub async fn close(&mut self) {
        let Some(mut framed) = self.framed.take() else {
            return;
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, framed.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "flush failed during close"),
            Err(_) => debug!("flush timed out during close"),
        }

        let mut stream = framed.into_inner();
        match tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "shutdown failed during close"),
            Err(_) => debug!("shutdown timed out during close"),
        }
        info!(server = %self.server_addr, "connection closed");
    }
}
