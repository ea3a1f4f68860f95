//! Reconnecting event channel.
//!
//! Owns the receiving end of the coordinator's outbound queue and the sending
//! end of the inbound command queue. While connected it forwards events to
//! the server and commands to the coordinator; while disconnected it drains
//! the outbound queue and drops what it finds, so a stale `key:pulled` is
//! never replayed after a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use keyrack_core::{ChannelConfig, InboundCommand, OutboundEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ChannelClient;
use crate::codec::InboundFrame;
use crate::error::ChannelError;

/// Counters kept by a running channel.
#[derive(Debug, Default)]
pub struct ChannelStats {
    connections: AtomicU64,
    events_sent: AtomicU64,
    events_dropped: AtomicU64,
    commands_received: AtomicU64,
    malformed_frames: AtomicU64,
}

impl ChannelStats {
    #[must_use]
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// Events discarded while disconnected or lost with a failed write.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn commands_received(&self) -> u64 {
        self.commands_received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown requested, or a local queue closed.
    Stopped,
    Lost(ChannelError),
}

/// Supervisor for the connection to the remote authority.
#[derive(Debug)]
pub struct EventChannel {
    config: ChannelConfig,
    outbound: mpsc::Receiver<OutboundEvent>,
    inbound: mpsc::Sender<InboundCommand>,
    stats: Arc<ChannelStats>,
}

impl EventChannel {
    pub fn new(
        config: ChannelConfig,
        outbound: mpsc::Receiver<OutboundEvent>,
        inbound: mpsc::Sender<InboundCommand>,
    ) -> Self {
        Self {
            config,
            outbound,
            inbound,
            stats: Arc::new(ChannelStats::default()),
        }
    }

    /// Shared counters; stays valid after [`run`](Self::run) consumes the
    /// channel.
    #[must_use]
    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// Connect, forward, reconnect, until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(server = %self.config.server_addr, "event channel started");

        loop {
            let mut client = ChannelClient::new(&self.config);
            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = client.connect() => result,
            };

            match connected {
                Ok(()) => {
                    ChannelStats::bump(&self.stats.connections);
                    let end = self.session(&mut client, &cancel).await;
                    client.close().await;
                    match end {
                        SessionEnd::Stopped => break,
                        SessionEnd::Lost(e) => {
                            warn!(server = %self.config.server_addr, error = %e, "connection lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(server = %self.config.server_addr, error = %e, "connect failed");
                }
            }

            if !self.wait_disconnected(&cancel).await {
                break;
            }
            info!(
                server = %self.config.server_addr,
                delay_ms = self.config.reconnect_delay_ms,
                "reconnecting"
            );
        }

        info!(
            sent = self.stats.events_sent(),
            dropped = self.stats.events_dropped(),
            "event channel stopped"
        );
    }

    async fn session(&mut self, client: &mut ChannelClient, cancel: &CancellationToken) -> SessionEnd {
        if let Err(e) = client.send(&OutboundEvent::Join).await {
            return SessionEnd::Lost(e);
        }
        debug!("subscription sent");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.flush(client).await;
                    return SessionEnd::Stopped;
                }
                frame = client.recv() => match frame {
                    Ok(InboundFrame::Command(command)) => {
                        ChannelStats::bump(&self.stats.commands_received);
                        debug!(?command, "command received");
                        if self.inbound.send(command).await.is_err() {
                            debug!("command receiver closed");
                            return SessionEnd::Stopped;
                        }
                    }
                    Ok(InboundFrame::Malformed { reason }) => {
                        ChannelStats::bump(&self.stats.malformed_frames);
                        warn!(%reason, "skipping malformed frame");
                    }
                    Err(e) => return SessionEnd::Lost(e),
                },
                event = self.outbound.recv() => match event {
                    Some(event) => {
                        if let Err(e) = client.send(&event).await {
                            ChannelStats::bump(&self.stats.events_dropped);
                            return SessionEnd::Lost(e);
                        }
                        ChannelStats::bump(&self.stats.events_sent);
                    }
                    None => {
                        debug!("event queue closed");
                        return SessionEnd::Stopped;
                    }
                },
            }
        }
    }

    /// Write out whatever is already queued before closing.
    async fn flush(&mut self, client: &mut ChannelClient) {
        while let Ok(event) = self.outbound.try_recv() {
            if let Err(e) = client.send(&event).await {
                ChannelStats::bump(&self.stats.events_dropped);
                warn!(error = %e, "failed to flush event");
                return;
            }
            ChannelStats::bump(&self.stats.events_sent);
        }
    }

    /// Sit out the reconnect delay, discarding events.
    ///
    /// Returns `false` if the channel should stop instead of reconnecting.
    async fn wait_disconnected(&mut self, cancel: &CancellationToken) -> bool {
        let delay = tokio::time::sleep(self.config.reconnect_delay());
        tokio::pin!(delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = &mut delay => return true,
                event = self.outbound.recv() => match event {
                    Some(event) => {
                        ChannelStats::bump(&self.stats.events_dropped);
                        warn!(event = event.name(), slot = ?event.slot(), "disconnected, dropping event");
                    }
                    None => return false,
                },
            }
        }
    }
}
