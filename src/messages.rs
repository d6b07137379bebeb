// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::config::InputLimits;

/// Command sent to the rover over the serial link.
///
/// Serialized as a positional MessagePack array in field order, so the field
/// order below is part of the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPacket {
    pub button_a: bool,
    pub button_b: bool,
    pub throttle: i32,
    pub joystick_x: i32,
    pub joystick_y: i32,
    pub text: String,
}

impl ControlPacket {
    /// Neutral packet: no buttons, no throttle, centered stick
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Same packet carrying a text payload
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

// Gamepad state from the input surface -> runtime
// Axis values are already normalized by whatever reads the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    #[serde(default)]
    pub button_a: bool,
    #[serde(default)]
    pub button_b: bool,
    #[serde(default)]
    pub throttle: i32,
    #[serde(default)]
    pub joystick_x: i32,
    #[serde(default)]
    pub joystick_y: i32,
}

impl InputState {
    /// Build a fresh packet from this sample, clamped into the configured ranges
    pub fn to_packet(&self, text: impl Into<String>, limits: &InputLimits) -> ControlPacket {
        let axis = |value: i32| {
            let value = value.clamp(-limits.joystick_max, limits.joystick_max);
            if value.abs() <= limits.joystick_deadzone {
                0
            } else {
                value
            }
        };

        ControlPacket {
            button_a: self.button_a,
            button_b: self.button_b,
            throttle: self.throttle.clamp(0, limits.throttle_max),
            joystick_x: axis(self.joystick_x),
            joystick_y: axis(self.joystick_y),
            text: text.into(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    InputStale,
    LinkDown,
}
