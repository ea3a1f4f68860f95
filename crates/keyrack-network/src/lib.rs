//! Event channel to the remote authority.
//!
//! A single TCP connection carries newline-delimited JSON both ways: unlock
//! commands in, slot events out. [`EventChannel`] keeps that connection up,
//! resubscribing with a `join:gpio` frame every time it reconnects.
//!
//! # Example
//!
//! ```no_run
//! use keyrack_core::ChannelConfig;
//! use keyrack_network::EventChannel;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let (events_tx, events_rx) = mpsc::channel(64);
//! let (commands_tx, mut commands_rx) = mpsc::channel(16);
//! let channel = EventChannel::new(ChannelConfig::default(), events_rx, commands_tx);
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(channel.run(cancel.clone()));
//! # drop(events_tx);
//! while let Some(command) = commands_rx.recv().await {
//!     println!("{command:?}");
//! }
//! # }
//! ```

mod channel;
mod client;
mod codec;
mod error;

pub use channel::{ChannelStats, EventChannel};
pub use client::ChannelClient;
pub use codec::{EventCodec, InboundFrame};
pub use error::{ChannelError, Result};
