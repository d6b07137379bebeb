// Wire framing for the rover serial link
//
// Binary frames are interleaved with free text printed by the rover:
//   "\n~" <ascii decimal length> "~" <payload[length]>
// The payload is a MessagePack array of the ControlPacket fields.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use std::io::Cursor;

use crate::config::MAX_PAYLOAD;
use crate::messages::ControlPacket;

/// Start of a binary frame. Neither byte is an ASCII digit.
pub const START_MARKER: &[u8; 2] = b"\n~";

/// Terminates the decimal length field
pub const SEP_BYTE: u8 = b'~';

/// Default maximum payload size a frame may declare
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_PAYLOAD;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to serialize packet: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to deserialize payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Payload has {extra} trailing bytes after the packet")]
    TrailingBytes { extra: usize },

    #[error("Payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A length-delimited frame located inside a scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub declared_length: usize,
    pub payload: &'a [u8],
}

/// What a scan found after the text prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit<'a> {
    Frame(BinaryFrame<'a>),
    /// Marker followed by an unparseable header, up to the next marker
    Malformed(&'a [u8]),
}

/// Result of scanning a buffer for one framed unit.
///
/// `unit == None` means "need more data": everything from `consumed` onward
/// must be kept and scanned again once more bytes arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan<'a> {
    pub prefix: &'a [u8],
    pub unit: Option<Unit<'a>>,
    pub consumed: usize,
}

impl Scan<'_> {
    pub fn needs_more_data(&self) -> bool {
        self.unit.is_none()
    }
}

/// Serialize a packet as a positional MessagePack array
pub fn encode_payload(packet: &ControlPacket) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(packet)?)
}

/// Append a framed payload to `dst`
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    if payload.len() > max_payload {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    let length = payload.len().to_string();

    dst.reserve(START_MARKER.len() + length.len() + 1 + payload.len());
    dst.put_slice(START_MARKER);
    dst.put_slice(length.as_bytes());
    dst.put_u8(SEP_BYTE);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a packet into the bytes written to the serial link
pub fn encode_packet(packet: &ControlPacket) -> Result<Bytes> {
    encode_packet_with_limit(packet, DEFAULT_MAX_PAYLOAD)
}

pub fn encode_packet_with_limit(packet: &ControlPacket, max_payload: usize) -> Result<Bytes> {
    let payload = encode_payload(packet)?;
    let mut dst = BytesMut::new();
    encode_frame(&payload, &mut dst, max_payload)?;
    Ok(dst.freeze())
}

/// Decode a frame payload. The payload must hold exactly one packet.
pub fn decode_payload(payload: &[u8]) -> Result<ControlPacket> {
    let mut cursor = Cursor::new(payload);
    let packet = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        ControlPacket::deserialize(&mut de)?
    };

    let extra = payload.len() - cursor.position() as usize;
    if extra > 0 {
        return Err(CodecError::TrailingBytes { extra });
    }
    Ok(packet)
}

/// Scan `buf` for the first framed unit using the default payload limit
pub fn scan(buf: &[u8]) -> Scan<'_> {
    scan_with_limit(buf, DEFAULT_MAX_PAYLOAD)
}

/// Scan `buf` for the first framed unit.
///
/// Never fails: an unparseable header is reported as [`Unit::Malformed`] and
/// consumed up to the next marker so parsing can resynchronize.
pub fn scan_with_limit(buf: &[u8], max_payload: usize) -> Scan<'_> {
    let Some(start) = find_marker(buf, 0) else {
        // Hold back a possible split marker or split UTF-8 character
        let end = buf.len() - held_back_len(buf);
        return Scan {
            prefix: &buf[..end],
            unit: None,
            consumed: end,
        };
    };

    let prefix = &buf[..start];
    let header = start + START_MARKER.len();
    let max_digits = max_length_digits(max_payload);
    let mut length: usize = 0;
    let mut digits = 0;

    for (offset, &byte) in buf[header..].iter().enumerate() {
        match byte {
            // Leading zeros do not grow `length`, so the digit count is capped too
            b'0'..=b'9' if digits >= max_digits => return malformed(buf, start),
            b'0'..=b'9' => {
                length = match length
                    .checked_mul(10)
                    .and_then(|l| l.checked_add(usize::from(byte - b'0')))
                {
                    Some(l) if l <= max_payload => l,
                    _ => return malformed(buf, start),
                };
                digits += 1;
            }
            SEP_BYTE if digits > 0 => {
                let body = header + offset + 1;
                let end = body + length;
                if buf.len() < end {
                    // Candidate frame is incomplete, keep it
                    return Scan {
                        prefix,
                        unit: None,
                        consumed: start,
                    };
                }
                return Scan {
                    prefix,
                    unit: Some(Unit::Frame(BinaryFrame {
                        declared_length: length,
                        payload: &buf[body..end],
                    })),
                    consumed: end,
                };
            }
            _ => return malformed(buf, start),
        }
    }

    // Header is a valid prefix so far
    Scan {
        prefix,
        unit: None,
        consumed: start,
    }
}

fn malformed(buf: &[u8], start: usize) -> Scan<'_> {
    let after = start + START_MARKER.len();
    let end = match find_marker(buf, after) {
        Some(next) => next,
        None => buf.len() - partial_marker_len(&buf[after..]),
    };
    Scan {
        prefix: &buf[..start],
        unit: Some(Unit::Malformed(&buf[start..end])),
        consumed: end,
    }
}

/// Where to resume after the frame `buf[start..end]` failed to decode.
///
/// A corrupted length can make the frame swallow the start of the next
/// frame's marker. Returns the first marker (or trailing partial marker)
/// inside the frame, past its own header.
pub fn resync_point(buf: &[u8], start: usize, end: usize) -> Option<usize> {
    let from = start + START_MARKER.len();
    if let Some(next) = find_marker(buf, from).filter(|&next| next < end) {
        return Some(next);
    }
    if end == buf.len() && end > from {
        let partial = partial_marker_len(&buf[from..end]);
        if partial > 0 {
            return Some(end - partial);
        }
    }
    None
}

/// Digits needed to write `max_payload` in decimal
fn max_length_digits(max_payload: usize) -> usize {
    max_payload.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(START_MARKER.len())
        .position(|w| w == START_MARKER)
        .map(|pos| pos + from)
}

/// Length of the longest suffix of `buf` that is a proper prefix of the marker
fn partial_marker_len(buf: &[u8]) -> usize {
    (1..START_MARKER.len())
        .rev()
        .find(|&n| buf.ends_with(&START_MARKER[..n]))
        .unwrap_or(0)
}

/// Length of a trailing UTF-8 sequence whose continuation bytes have not arrived yet
fn incomplete_utf8_len(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        let byte = buf[buf.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

fn held_back_len(buf: &[u8]) -> usize {
    match partial_marker_len(buf) {
        0 => incomplete_utf8_len(buf),
        n => n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> ControlPacket {
        ControlPacket {
            button_a: true,
            button_b: false,
            throttle: 10,
            joystick_x: 5,
            joystick_y: 5,
            text: String::new(),
        }
    }

    #[test]
    fn test_payload_is_positional_array() {
        let payload = encode_payload(&sample_packet()).unwrap();
        // fixarray(6), true, false, 10, 5, 5, fixstr(0)
        assert_eq!(payload, vec![0x96, 0xC3, 0xC2, 0x0A, 0x05, 0x05, 0xA0]);
    }

    #[test]
    fn test_encode_packet_wire_layout() {
        let wire = encode_packet(&sample_packet()).unwrap();
        assert_eq!(&wire[..5], b"\n~7~\x96");
        assert_eq!(wire.len(), 4 + 7);
    }

    #[test]
    fn test_round_trip() {
        let packets = [
            sample_packet(),
            ControlPacket::neutral(),
            ControlPacket {
                button_a: false,
                button_b: true,
                throttle: 1023,
                joystick_x: -32767,
                joystick_y: 32767,
                text: "héllo ~\n~ rover".to_string(),
            },
        ];
        for packet in packets {
            let wire = encode_packet(&packet).unwrap();
            let scan = scan(&wire);
            let Some(Unit::Frame(frame)) = scan.unit else {
                panic!("expected frame, got {:?}", scan);
            };
            assert!(scan.prefix.is_empty());
            assert_eq!(scan.consumed, wire.len());
            assert_eq!(frame.declared_length, frame.payload.len());
            assert_eq!(decode_payload(frame.payload).unwrap(), packet);
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let packet = ControlPacket::neutral().with_text("x".repeat(64));
        let result = encode_packet_with_limit(&packet, 16);
        assert!(matches!(
            result,
            Err(CodecError::PayloadTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_scan_no_marker_is_text() {
        let scan = scan(b"battery 87%");
        assert_eq!(scan.prefix, b"battery 87%");
        assert!(scan.needs_more_data());
        assert_eq!(scan.consumed, 11);
    }

    #[test]
    fn test_scan_holds_back_partial_marker() {
        let scan = scan(b"status ok\n");
        assert_eq!(scan.prefix, b"status ok");
        assert_eq!(scan.consumed, 9);
    }

    #[test]
    fn test_scan_holds_back_split_utf8() {
        let text = "temp 21°".as_bytes();
        let cut = &text[..text.len() - 1];
        let scan = scan(cut);
        assert_eq!(scan.prefix, b"temp 21");
        assert_eq!(scan.consumed, 7);
    }

    #[test]
    fn test_scan_text_then_frame() {
        let mut buf = b"hello".to_vec();
        buf.extend_from_slice(&encode_packet(&sample_packet()).unwrap());
        buf.extend_from_slice(b"tail");

        let scan = scan(&buf);
        assert_eq!(scan.prefix, b"hello");
        assert!(matches!(scan.unit, Some(Unit::Frame(_))));
        assert_eq!(&buf[scan.consumed..], b"tail");
    }

    #[test]
    fn test_scan_incomplete_header_waits() {
        for buf in [&b"ab\n~"[..], b"ab\n~1", b"ab\n~12"] {
            let scan = scan(buf);
            assert_eq!(scan.prefix, b"ab");
            assert!(scan.needs_more_data());
            assert_eq!(scan.consumed, 2);
        }
    }

    #[test]
    fn test_scan_incomplete_payload_waits() {
        let scan = scan(b"\n~5~abc");
        assert!(scan.prefix.is_empty());
        assert!(scan.needs_more_data());
        assert_eq!(scan.consumed, 0);
    }

    #[test]
    fn test_scan_bad_length_resyncs_to_next_marker() {
        let buf = b"\n~x5~abc\n~3~xyz";
        let scan = scan(buf);
        assert_eq!(scan.unit, Some(Unit::Malformed(b"\n~x5~abc")));
        assert_eq!(scan.consumed, 8);
    }

    #[test]
    fn test_scan_missing_digits_is_malformed() {
        let scan = scan(b"\n~~abc");
        assert_eq!(scan.unit, Some(Unit::Malformed(b"\n~~abc")));
        assert_eq!(scan.consumed, 6);
    }

    #[test]
    fn test_scan_malformed_keeps_partial_next_marker() {
        let scan = scan(b"\n~zz\n");
        assert_eq!(scan.unit, Some(Unit::Malformed(b"\n~zz")));
        assert_eq!(scan.consumed, 4);
    }

    #[test]
    fn test_scan_length_over_limit_is_malformed() {
        let scan = scan_with_limit(b"\n~100~", 99);
        assert!(matches!(scan.unit, Some(Unit::Malformed(_))));
        assert_eq!(scan.consumed, 6);
    }

    #[test]
    fn test_scan_length_overflow_is_malformed() {
        let buf = b"\n~99999999999999999999999999~";
        let scan = scan_with_limit(buf, usize::MAX);
        assert!(matches!(scan.unit, Some(Unit::Malformed(_))));
    }

    #[test]
    fn test_scan_length_digits_are_capped() {
        // Zero padding up to the width of the limit is still a valid length
        let scan = scan_with_limit(b"\n~0007~", 4096);
        assert!(scan.needs_more_data());

        let scan = scan_with_limit(b"\n~00007~", 4096);
        assert!(matches!(scan.unit, Some(Unit::Malformed(_))));

        let mut zeros = b"\n~".to_vec();
        zeros.extend_from_slice(&[b'0'; 64]);
        let scan = scan_with_limit(&zeros, 4096);
        assert_eq!(scan.unit, Some(Unit::Malformed(&zeros[..])));
        assert_eq!(scan.consumed, zeros.len());
    }

    #[test]
    fn test_resync_point_finds_swallowed_marker() {
        let buf = b"\n~9~abcdefg\n~7~";
        assert_eq!(resync_point(buf, 0, 13), Some(11));
        // Only the newline of the next marker has arrived
        assert_eq!(resync_point(&buf[..12], 0, 12), Some(11));
        assert_eq!(resync_point(buf, 0, 11), None);
    }

    #[test]
    fn test_max_length_digits() {
        assert_eq!(max_length_digits(0), 1);
        assert_eq!(max_length_digits(9), 1);
        assert_eq!(max_length_digits(10), 2);
        assert_eq!(max_length_digits(4096), 4);
    }

    #[test]
    fn test_scan_zero_length_frame() {
        let scan = scan(b"\n~0~rest");
        assert_eq!(
            scan.unit,
            Some(Unit::Frame(BinaryFrame {
                declared_length: 0,
                payload: b"",
            }))
        );
        assert_eq!(scan.consumed, 4);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut payload = encode_payload(&sample_packet()).unwrap();
        payload.push(0x01);
        assert!(matches!(
            decode_payload(&payload),
            Err(CodecError::TrailingBytes { extra: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let payload = encode_payload(&sample_packet()).unwrap();
        assert!(matches!(
            decode_payload(&payload[..4]),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        // Array of six strings
        let payload = rmp_serde::to_vec(&("a", "b", "c", "d", "e", "f")).unwrap();
        assert!(matches!(
            decode_payload(&payload),
            Err(CodecError::Decode(_))
        ));
    }
}
