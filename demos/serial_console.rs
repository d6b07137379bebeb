// Serial console: print everything the rover sends, send typed lines as text packets
//
// Does not need a Zenoh session, only the serial port.
//
// Usage: cargo run --example serial_console -- --port /dev/ttyACM0

use clap::Parser;
use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rover_teleop::config::{SERIAL_BAUDRATE, SERIAL_PORT};
use rover_teleop::link::{ByteSink, ByteSource, SerialLink};
use rover_teleop::messages::ControlPacket;
use rover_teleop::protocol::{encode_packet, FramerEvent, StreamFramer};

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = SERIAL_PORT)]
    port: String,

    #[arg(short, long, default_value_t = SERIAL_BAUDRATE)]
    baud: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    println!("Serial port: {} @ {}", args.port, args.baud);
    let mut link = match SerialLink::open_with_baudrate(&args.port, args.baud) {
        Ok(link) => link,
        Err(e) => {
            println!("Failed to open serial port: {}", e);
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            return Err(e.into());
        }
    };
    println!("Type a line and press Enter to send it as a text packet. Ctrl-D quits.");
    println!();

    // Stdin blocks, so lines come in from a helper thread
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut framer = StreamFramer::new();
    let mut buf = [0u8; 256];

    loop {
        match rx.try_recv() {
            Ok(line) => {
                let frame = encode_packet(&ControlPacket::neutral().with_text(line))?;
                link.write(&frame)?;
            }
            Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let n = link.read(&mut buf)?;
        if n == 0 {
            thread::sleep(Duration::from_millis(5));
            continue;
        }

        for event in framer.feed(&buf[..n]) {
            match event {
                FramerEvent::Text { text } => print!("{}", text),
                FramerEvent::Packet { packet } => println!("[packet] {:?}", packet),
                FramerEvent::DecodeError { payload, reason } => {
                    println!("[undecodable {} bytes] {}", payload.len(), reason)
                }
                FramerEvent::Resync { raw } => {
                    println!("[resync] skipped {:?}", String::from_utf8_lossy(&raw))
                }
            }
        }
    }

    link.close();
    Ok(())
}
