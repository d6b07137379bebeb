// Teleop loop: gamepad input -> kinematics + control packet -> serial, serial -> telemetry
// Two periodic activities share one task: an inbound poll and the outbound transmit tick.
// Note: the input watchdog replaces stale gamepad input with a neutral packet, so the rover
// stops if the input publisher dies while the link stays up.

use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TeleopConfig;
use crate::drive::{motion_from_packet, MotionVector, PivotPoint};
use crate::link::{ByteSink, ByteSource, SerialLink};
use crate::messages::{ControlPacket, InputState, RuntimeHealth};
use crate::protocol::{FramerEvent, StreamFramer};
use crate::transmit::{TickOutcome, TransmitError, TransmitScheduler};

const READ_CHUNK: usize = 1024;

// Text commands waiting for a packet to carry them
const MAX_PENDING_TEXT: usize = 32;

/// Motion state published every transmit tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionReport {
    pub pivot: PivotPoint,
    pub motion: MotionVector,
}

/// Result of one transmit tick
#[derive(Debug)]
pub struct TxReport {
    pub packet: ControlPacket,
    pub report: MotionReport,
    pub outcome: Result<TickOutcome, TransmitError>,
}

pub struct TeleopRuntime {
    cfg: TeleopConfig,
    latest_input: Option<InputState>,
    input_received_at: Instant,
    pending_text: VecDeque<String>,
    health: RuntimeHealth,
    framer: StreamFramer,
    scheduler: TransmitScheduler,
}

impl TeleopRuntime {
    pub fn new(cfg: TeleopConfig) -> Self {
        let framer = StreamFramer::with_max_payload(cfg.link.max_payload);
        let scheduler = TransmitScheduler::new(cfg.transmit.heartbeat())
            .with_max_payload(cfg.link.max_payload);
        Self {
            cfg,
            latest_input: None,
            input_received_at: Instant::now(),
            pending_text: VecDeque::new(),
            health: RuntimeHealth::InputStale, // Start stale until first input
            framer,
            scheduler,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming gamepad state
    pub fn on_input(&mut self, input: InputState, now: Instant) {
        debug!("Received input: {:?}", &input);
        self.latest_input = Some(input);
        self.input_received_at = now;
    }

    /// Queue text for the rover. Each sent packet carries one queued line, oldest first.
    pub fn on_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.pending_text.len() >= MAX_PENDING_TEXT {
            if let Some(dropped) = self.pending_text.pop_front() {
                warn!("Text queue full, dropping {:?}", dropped);
            }
        }
        info!("Queued text for rover: {:?}", text);
        self.pending_text.push_back(text);
    }

    pub fn pending_text(&self) -> usize {
        self.pending_text.len()
    }

    /// Current input, or neutral if the watchdog has tripped
    fn current_input(&mut self, now: Instant) -> InputState {
        let input_age = now.saturating_duration_since(self.input_received_at);
        match self.latest_input {
            Some(input) if input_age <= self.cfg.transmit.input_timeout() => input,
            Some(_) => {
                if self.health != RuntimeHealth::InputStale {
                    warn!("Input stale ({:?} old), sending neutral packet", input_age);
                }
                self.latest_input = None;
                InputState::default()
            }
            None => InputState::default(),
        }
    }

    /// Sample input, compute the motion vector and let the scheduler decide whether to send
    pub fn tx_tick(&mut self, now: Instant, sink: &mut dyn ByteSink) -> TxReport {
        let input = self.current_input(now);
        let text = self.pending_text.front().cloned().unwrap_or_default();
        let packet = input.to_packet(text, &self.cfg.input);

        let (pivot, motion) = motion_from_packet(&packet, &self.cfg.steering);
        let outcome = self.scheduler.tick(packet.clone(), now, sink);

        if let Ok(TickOutcome::Sent { .. }) = outcome {
            if !packet.text.is_empty() {
                self.pending_text.pop_front();
                // A repeated line would otherwise be suppressed as an unchanged packet
                if self.pending_text.front() == Some(&packet.text) {
                    self.scheduler.force_resend();
                }
            }
        }

        let health = if !sink.is_open() {
            RuntimeHealth::LinkDown
        } else if self.latest_input.is_none() {
            RuntimeHealth::InputStale
        } else {
            RuntimeHealth::Ok
        };
        if health != self.health {
            info!("Health: {:?} -> {:?}", self.health, health);
            self.health = health;
        }

        TxReport {
            packet,
            report: MotionReport { pivot, motion },
            outcome,
        }
    }

    /// Drain available serial bytes through the framer
    pub fn rx_poll(&mut self, source: &mut dyn ByteSource) -> io::Result<Vec<FramerEvent>> {
        let mut events = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            events.extend(self.framer.feed(&buf[..n]));
            if n < buf.len() {
                break;
            }
        }
        Ok(events)
    }

    /// Stop both activities' state: partial inbound data is dropped, nothing is flushed
    pub fn shutdown(&mut self) {
        self.framer.reset();
        self.scheduler.force_resend();
        self.pending_text.clear();
    }
}

/// Whether a failed transmit means the serial link is gone.
/// A write timeout leaves the link up and the packet is retried next tick.
pub fn is_link_fault(err: &TransmitError) -> bool {
    match err {
        TransmitError::Io(e) => !matches!(
            e.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        ),
        TransmitError::Codec(_) => false,
    }
}

fn log_event(event: &FramerEvent) {
    match event {
        FramerEvent::Text { text } => info!("RX: {}", text.trim_end()),
        FramerEvent::Packet { packet } => debug!("RX packet: {:?}", packet),
        FramerEvent::DecodeError { payload, reason } => {
            warn!("Undecodable frame ({} bytes): {}: {:?}", payload.len(), reason, payload)
        }
        FramerEvent::Resync { raw } => {
            warn!("Malformed frame header, skipped {:?}", String::from_utf8_lossy(raw))
        }
    }
}

pub async fn run(cfg: TeleopConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let topics = cfg.topics.clone();
    let sub_input = session.declare_subscriber(topics.input.clone()).await?;
    let sub_text = session.declare_subscriber(topics.text_cmd.clone()).await?;
    let pub_telemetry = session.declare_publisher(topics.telemetry.clone()).await?;
    let pub_motion = session.declare_publisher(topics.motion.clone()).await?;
    let pub_health = session.declare_publisher(topics.health.clone()).await?;

    let mut link = match SerialLink::open_with_baudrate(&cfg.link.port, cfg.link.baudrate) {
        Ok(link) => link,
        Err(e) => {
            warn!("Serial link unavailable ({}), running without it", e);
            SerialLink::closed(&cfg.link.port)
        }
    };

    let mut tx_tick = interval(cfg.transmit.tx_period());
    tx_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rx_tick = interval(cfg.transmit.rx_period());
    rx_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Runtime started: {}ms transmit tick, {}ms heartbeat, {}ms input watchdog",
        cfg.transmit.tx_period_ms, cfg.transmit.heartbeat_ms, cfg.transmit.input_timeout_ms
    );
    info!("Subscribed to: {}, {}", topics.input, topics.text_cmd);
    info!(
        "Publishing to: {}, {}, {}",
        topics.telemetry, topics.motion, topics.health
    );

    let mut runtime = TeleopRuntime::new(cfg);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopping teleoperation");
                break;
            }

            _ = rx_tick.tick() => {
                match runtime.rx_poll(&mut link) {
                    Ok(events) => {
                        for event in &events {
                            log_event(event);
                            pub_telemetry.put(serde_json::to_string(event)?).await?;
                        }
                    }
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        link.close();
                    }
                }
            }

            _ = tx_tick.tick() => {
                // 1. Drain all pending input (non-blocking), keep latest
                while let Ok(Some(sample)) = sub_input.try_recv() {
                    let payload = sample.payload().to_bytes();
                    match serde_json::from_slice::<InputState>(&payload) {
                        Ok(input) => runtime.on_input(input, Instant::now()),
                        Err(e) => warn!("Failed to parse input: {}", e),
                    }
                }
                while let Ok(Some(sample)) = sub_text.try_recv() {
                    let payload = sample.payload().to_bytes();
                    runtime.on_text(String::from_utf8_lossy(&payload).into_owned());
                }

                // 2. Compute motion and send if needed (includes watchdog logic)
                // The serial write blocks for up to the port timeout
                let tx = tokio::task::block_in_place(|| {
                    runtime.tx_tick(Instant::now(), &mut link)
                });
                if let Err(e) = &tx.outcome {
                    warn!("Failed to send packet: {}", e);
                    if is_link_fault(e) {
                        link.close();
                    }
                }

                // 3. Publish motion and health
                pub_motion.put(serde_json::to_string(&tx.report)?).await?;
                pub_health.put(serde_json::to_string(&runtime.health())?).await?;
            }
        }
    }

    runtime.shutdown();
    link.close();
    Ok(())
}
