// Serial byte-stream link to the rover's microcontroller
//
// The protocol layer only needs a non-blocking byte source and sink; this module
// supplies both over a `serialport` handle.

use serialport::{self, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SERIAL_BAUDRATE;

/// Short timeout so a stalled write never blocks the tick loop for long
pub const DEFAULT_TIMEOUT_MS: u64 = 10;

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Inbound half of a duplex byte stream
pub trait ByteSource {
    /// Read whatever is available without waiting. `Ok(0)` means no data this tick.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Outbound half of a duplex byte stream
pub trait ByteSink {
    fn is_open(&self) -> bool;

    /// Write a whole frame, returning the number of bytes written
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

/// In-memory sink, always open
impl ByteSink for Vec<u8> {
    fn is_open(&self) -> bool {
        true
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// Serial link - owns the port handle while it is open
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open a serial port at the default baudrate
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, SERIAL_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening serial link on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            name: port_name.to_string(),
            port: Some(port),
        })
    }

    /// A link that is not connected; reads return nothing and sends are skipped
    pub fn closed(port_name: &str) -> Self {
        Self {
            name: port_name.to_string(),
            port: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop the port handle. Unread inbound bytes are discarded.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial link {}", self.name);
        }
    }
}

impl ByteSource for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Ok(0);
        };

        let available = port.bytes_to_read()? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = available.min(buf.len());
        match port.read(&mut buf[..len]) {
            Ok(n) => {
                debug!("RX {} bytes", n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl ByteSink for SerialLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("serial link {} is closed", self.name),
            ));
        };

        port.write_all(bytes)?;
        port.flush()?;
        debug!("TX {} bytes", bytes.len());
        Ok(bytes.len())
    }
}
