//! Newline-delimited JSON framing.
//!
//! Each frame is one JSON object on one line. Inbound lines that do not parse
//! as a command, or that exceed [`MAX_FRAME_LENGTH`], are surfaced as
//! [`InboundFrame::Malformed`] rather than as decode errors: a decode error
//! ends a `Framed` stream, and one bad frame should not cost the connection.

use bytes::BytesMut;
use keyrack_core::constants::MAX_FRAME_LENGTH;
use keyrack_core::{InboundCommand, OutboundEvent};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::ChannelError;

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Command(InboundCommand),
    Malformed { reason: String },
}

/// Codec for the event channel: commands in, events out.
#[derive(Debug)]
pub struct EventCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl EventCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn parse(line: &str) -> Option<InboundFrame> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match serde_json::from_str(line) {
            Ok(command) => InboundFrame::Command(command),
            Err(e) => InboundFrame::Malformed {
                reason: e.to_string(),
            },
        })
    }

    fn oversized(&self) -> InboundFrame {
        InboundFrame::Malformed {
            reason: format!("frame exceeds {} bytes", self.max_length),
        }
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventCodec {
    type Item = InboundFrame;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, ChannelError> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = Self::parse(&line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => return Ok(Some(self.oversized())),
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, ChannelError> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = Self::parse(&line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => return Ok(Some(self.oversized())),
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            }
        }
    }
}

impl Encoder<&OutboundEvent> for EventCodec {
    type Error = ChannelError;

    fn encode(&mut self, event: &OutboundEvent, dst: &mut BytesMut) -> Result<(), ChannelError> {
        let line = serde_json::to_string(event)?;
        self.lines.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e.into(),
            LinesCodecError::MaxLineLengthExceeded => ChannelError::Codec(e.to_string()),
        })
    }
}
