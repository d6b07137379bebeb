// Tick rates, topics, link settings, chassis geometry
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Outbound scheduling tick
pub const TX_PERIOD: Duration = Duration::from_millis(25);

// Inbound serial poll period
pub const RX_PERIOD: Duration = Duration::from_millis(5);

// Unchanged packets are re-sent after this long so the rover can detect link liveness
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// Gamepad input watchdog: stale input is replaced by a neutral packet
pub const INPUT_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_INPUT: &str = "rover/input/gamepad"; // normalized gamepad state
pub const TOPIC_TEXT_CMD: &str = "rover/cmd/text"; // one-shot text carried in the next packet
pub const TOPIC_TELEMETRY: &str = "rover/telemetry/rx"; // decoded inbound serial events
pub const TOPIC_MOTION: &str = "rover/state/motion"; // computed wheel angles/speeds
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

// Serial link to the rover's microcontroller
pub const SERIAL_PORT: &str = "/dev/ttyACM0";
pub const SERIAL_BAUDRATE: u32 = 115_200;

// Input ranges
pub const THROTTLE_MAX: i32 = 1023;
pub const JOYSTICK_MAX: i32 = 32767;
pub const JOYSTICK_DEADZONE: i32 = 0;

// Largest payload a frame may declare
pub const MAX_PAYLOAD: usize = 4096;

// Chassis geometry (cm): wheel centers sit at (+-HALF_TRACK, +-HALF_WHEELBASE)
pub const HALF_TRACK: f32 = 10.0;
pub const HALF_WHEELBASE: f32 = 12.0;

// Steering curve. Empirically tuned, validate against the real chassis.
pub const D_MIN: f32 = 15.0; // tightest pivot radius without a point turn
pub const PIVOT_SCALE: f32 = 20.0;
pub const MAX_STEER_ANGLE_DEG: f32 = 45.0;
pub const MAX_PIVOT_DISTANCE: f32 = 10_000.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serial link settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baudrate: u32,
    pub max_payload: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            baudrate: SERIAL_BAUDRATE,
            max_payload: MAX_PAYLOAD,
        }
    }
}

/// Chassis geometry and steering curve parameters
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    pub d_min: f32,
    pub scale: f32,
    pub max_steer_angle_deg: f32,
    pub max_pivot_distance: f32,
    pub half_track: f32,
    pub half_wheelbase: f32,
    pub joystick_max: i32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            d_min: D_MIN,
            scale: PIVOT_SCALE,
            max_steer_angle_deg: MAX_STEER_ANGLE_DEG,
            max_pivot_distance: MAX_PIVOT_DISTANCE,
            half_track: HALF_TRACK,
            half_wheelbase: HALF_WHEELBASE,
            joystick_max: JOYSTICK_MAX,
        }
    }
}

/// Clamp ranges applied when building a packet from gamepad input
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputLimits {
    pub throttle_max: i32,
    pub joystick_max: i32,
    pub joystick_deadzone: i32,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            throttle_max: THROTTLE_MAX,
            joystick_max: JOYSTICK_MAX,
            joystick_deadzone: JOYSTICK_DEADZONE,
        }
    }
}

/// Loop periods and watchdog timeouts, in milliseconds
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransmitConfig {
    pub tx_period_ms: u64,
    pub rx_period_ms: u64,
    pub heartbeat_ms: u64,
    pub input_timeout_ms: u64,
}

impl TransmitConfig {
    // Tick periods must be non-zero for tokio intervals
    pub fn tx_period(&self) -> Duration {
        Duration::from_millis(self.tx_period_ms.max(1))
    }

    pub fn rx_period(&self) -> Duration {
        Duration::from_millis(self.rx_period_ms.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            tx_period_ms: TX_PERIOD.as_millis() as u64,
            rx_period_ms: RX_PERIOD.as_millis() as u64,
            heartbeat_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            input_timeout_ms: INPUT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub input: String,
    pub text_cmd: String,
    pub telemetry: String,
    pub motion: String,
    pub health: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            input: TOPIC_INPUT.to_string(),
            text_cmd: TOPIC_TEXT_CMD.to_string(),
            telemetry: TOPIC_TELEMETRY.to_string(),
            motion: TOPIC_MOTION.to_string(),
            health: TOPIC_HEALTH.to_string(),
        }
    }
}

/// Everything the runtime needs. Missing fields fall back to the constants above.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TeleopConfig {
    pub link: LinkConfig,
    pub steering: SteeringConfig,
    pub input: InputLimits,
    pub transmit: TransmitConfig,
    pub topics: TopicConfig,
}

impl TeleopConfig {
    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
