// Change-suppressed, heartbeat-backed transmit policy
// A packet is written only when it differs from the last one sent, or when the
// heartbeat interval has passed so the rover can tell the link is still alive.

use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::link::ByteSink;
use crate::messages::ControlPacket;
use crate::protocol::codec::{self, CodecError, DEFAULT_MAX_PAYLOAD};

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("Failed to encode packet: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to write frame: {0}")]
    Io(#[from] io::Error),
}

/// What a scheduling tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent { bytes: usize },
    /// Same packet as last time and the heartbeat is not due
    Suppressed,
    /// Sink not connected, nothing attempted
    SinkClosed,
}

pub struct TransmitScheduler {
    heartbeat: Duration,
    max_payload: usize,
    last_sent: Option<(ControlPacket, Instant)>,
}

impl TransmitScheduler {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            heartbeat,
            max_payload: DEFAULT_MAX_PAYLOAD,
            last_sent: None,
        }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Whether `packet` would be sent at `now`
    pub fn should_send(&self, packet: &ControlPacket, now: Instant) -> bool {
        match &self.last_sent {
            None => true,
            Some((last, sent_at)) => {
                last != packet || now.saturating_duration_since(*sent_at) > self.heartbeat
            }
        }
    }

    /// Run one scheduling tick with the packet sampled for it.
    ///
    /// State only advances after a successful write, so a failed write is
    /// retried on the next tick.
    pub fn tick(
        &mut self,
        packet: ControlPacket,
        now: Instant,
        sink: &mut dyn ByteSink,
    ) -> Result<TickOutcome, TransmitError> {
        if !sink.is_open() {
            return Ok(TickOutcome::SinkClosed);
        }
        if !self.should_send(&packet, now) {
            return Ok(TickOutcome::Suppressed);
        }

        let frame = codec::encode_packet_with_limit(&packet, self.max_payload)?;
        let bytes = sink.write(&frame)?;

        match &self.last_sent {
            Some((last, _)) if *last == packet => trace!("Heartbeat resend"),
            _ => debug!("Sending {:?}", packet),
        }
        self.last_sent = Some((packet, now));
        Ok(TickOutcome::Sent { bytes })
    }

    /// Forget the last packet so the next tick always sends
    pub fn force_resend(&mut self) {
        self.last_sent = None;
    }

    pub fn last_sent(&self) -> Option<&ControlPacket> {
        self.last_sent.as_ref().map(|(packet, _)| packet)
    }
}
