// Serial wire protocol: length-prefixed MessagePack frames mixed with free text

pub mod codec;
pub mod framer;

pub use codec::{
    decode_payload, encode_packet, scan, BinaryFrame, CodecError, Scan, Unit, SEP_BYTE,
    START_MARKER,
};
pub use framer::{FramerEvent, StreamFramer};
