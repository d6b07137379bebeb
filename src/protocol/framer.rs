// Incremental parser for the inbound serial byte stream

use bytes::{Buf, BytesMut};
use serde::Serialize;
use tracing::debug;

use super::codec::{self, Unit, DEFAULT_MAX_PAYLOAD};
use crate::messages::ControlPacket;

/// One decoded unit of the inbound stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FramerEvent {
    /// Free text printed by the rover (lossy UTF-8)
    Text { text: String },
    Packet { packet: ControlPacket },
    /// Frame length matched but the payload is not a valid packet
    DecodeError { payload: Vec<u8>, reason: String },
    /// Unparseable frame header skipped while resynchronizing
    Resync { raw: Vec<u8> },
}

/// Splits arbitrary chunks of serial bytes into text, packets and diagnostics.
///
/// One framer per connection, fed from one task.
#[derive(Debug)]
pub struct StreamFramer {
    buf: BytesMut,
    max_payload: usize,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
        }
    }

    /// Append a chunk and return every event it completes, in stream order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<FramerEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            let scan = codec::scan_with_limit(&self.buf, self.max_payload);
            let mut consumed = scan.consumed;

            if !scan.prefix.is_empty() {
                events.push(FramerEvent::Text {
                    text: String::from_utf8_lossy(scan.prefix).into_owned(),
                });
            }

            let waiting = match scan.unit {
                None => true,
                Some(Unit::Frame(frame)) => {
                    let event = decode_frame_payload(frame.payload);
                    if let FramerEvent::DecodeError { .. } = event {
                        // A corrupted length can swallow the next frame's marker.
                        // Resume at that marker instead of past the declared span.
                        let start = scan.prefix.len();
                        if let Some(next) = codec::resync_point(&self.buf, start, consumed) {
                            debug!("Undecodable frame overlaps a marker, resyncing at {}", next);
                            consumed = next;
                        }
                    }
                    events.push(event);
                    false
                }
                Some(Unit::Malformed(raw)) => {
                    debug!("Skipping malformed frame header ({} bytes)", raw.len());
                    events.push(FramerEvent::Resync { raw: raw.to_vec() });
                    false
                }
            };

            self.buf.advance(consumed);
            if waiting || self.buf.is_empty() {
                break;
            }
        }

        events
    }

    /// Bytes held back awaiting the rest of a frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received data
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!("Discarding {} buffered bytes", self.buf.len());
        }
        self.buf.clear();
    }
}

fn decode_frame_payload(payload: &[u8]) -> FramerEvent {
    match codec::decode_payload(payload) {
        Ok(packet) => FramerEvent::Packet { packet },
        Err(e) => FramerEvent::DecodeError {
            payload: payload.to_vec(),
            reason: e.to_string(),
        },
    }
}
