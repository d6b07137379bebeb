//! Gamepad teleoperation for a four-wheel steered rover over a serial link.
//!
//! - [`protocol`]: length-prefixed MessagePack frames interleaved with free text
//! - [`drive`]: joystick -> pivot point -> per-wheel steering angle and speed
//! - [`transmit`]: change-suppressed, heartbeat-backed send policy
//! - [`runtime`]: the zenoh <-> serial loop tying them together

pub mod config;
pub mod drive;
pub mod link;
pub mod messages;
pub mod protocol;
pub mod runtime;
pub mod transmit;
