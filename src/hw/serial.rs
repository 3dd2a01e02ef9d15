// Serial links: command/telemetry port and the two rangefinder ports
//
// Reader threads block on the port and forward bytes either one at a time
// into an mpsc channel (interrupt-style receive) or into a DmaRing
// (autonomous fill).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{DmaRing, HwError, TelemetrySink};
use crate::messages::TelemetryLine;

/// Read timeout used by reader threads; a timeout just loops
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Open a serial port with the default read timeout
pub fn open(port_name: &str, baudrate: u32) -> Result<Box<dyn SerialPort>, HwError> {
    info!("Opening serial port {} at {} baud", port_name, baudrate);
    let port = serialport::new(port_name, baudrate)
        .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        .open()?;
    Ok(port)
}

/// Write a raw command and flush
pub fn send_command(port: &mut dyn SerialPort, bytes: &[u8]) -> Result<(), HwError> {
    debug!("Sending {:02X?}", bytes);
    port.write_all(bytes)?;
    port.flush()?;
    Ok(())
}

/// Forward every received byte into `tx`, one at a time
///
/// The thread ends when the receiving side is dropped or the port fails.
pub fn spawn_byte_reader(
    name: &'static str,
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<u8>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 64];
        loop {
            match port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => {
                    for &b in &buf[..n] {
                        if tx.blocking_send(b).is_err() {
                            debug!("{} reader: receiver dropped, exiting", name);
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!("{} reader stopped: {}", name, e);
                    return;
                }
            }
        }
    })
}

/// Fill a DmaRing from the port without consumer involvement
pub fn spawn_ring_filler(
    mut port: Box<dyn SerialPort>,
    ring: Arc<DmaRing>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 64];
        loop {
            match port.read(&mut buf) {
                Ok(n) => ring.extend(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!("ring filler stopped: {}", e);
                    return;
                }
            }
        }
    })
}

/// Telemetry lines written to a serial port with a bounded timeout
pub struct SerialTelemetry {
    port: Box<dyn SerialPort>,
}

impl SerialTelemetry {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl TelemetrySink for SerialTelemetry {
    fn emit(&mut self, line: TelemetryLine) {
        let text = line.to_string();
        if let Err(e) = self.port.write_all(text.as_bytes()) {
            // Telemetry is best effort; a lost line is not fatal
            warn!("Telemetry write failed: {}", e);
        }
    }
}
