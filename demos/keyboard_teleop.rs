// Keyboard stand-in for the gamepad: WASD stick, R/F throttle, Space=A, B=B, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use rover_teleop::config::{JOYSTICK_MAX, THROTTLE_MAX, TOPIC_INPUT};
use rover_teleop::messages::InputState;

const THROTTLE_STEPS: [i32; 4] = [0, THROTTLE_MAX / 4, THROTTLE_MAX / 2, THROTTLE_MAX];
const STICK_DEFLECTION: i32 = JOYSTICK_MAX / 2;
const INPUT_TIMEOUT_MS: u64 = 150; // Re-center the stick after this much time with no key

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_INPUT).await?;

    info!("Controls: WASD=stick, R/F=throttle, Space=button A, B=button B, Q=quit");
    print_throttle(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut throttle_idx: usize = 0;
    let mut input = InputState::default();
    let mut last_stick_input = Instant::now();

    loop {
        // 20ms poll timeout gives ~50Hz publishing
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        input.joystick_y = STICK_DEFLECTION;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        input.joystick_y = -STICK_DEFLECTION;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        input.joystick_x = -STICK_DEFLECTION;
                        last_stick_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        input.joystick_x = STICK_DEFLECTION;
                        last_stick_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        throttle_idx = (throttle_idx + 1).min(THROTTLE_STEPS.len() - 1);
                        print_throttle(throttle_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        throttle_idx = throttle_idx.saturating_sub(1);
                        print_throttle(throttle_idx);
                    }

                    KeyCode::Char(' ') if kind == KeyEventKind::Press => {
                        input.button_a = !input.button_a;
                    }
                    KeyCode::Char('b') if kind == KeyEventKind::Press => {
                        input.button_b = !input.button_b;
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_stick_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            input.joystick_x = 0;
            input.joystick_y = 0;
        }
        input.throttle = THROTTLE_STEPS[throttle_idx];

        publisher.put(serde_json::to_string(&input)?).await?;
    }

    Ok(())
}

fn print_throttle(idx: usize) {
    info!("Throttle: {}/{}", THROTTLE_STEPS[idx], THROTTLE_MAX);
}
