// Scan probe: bring up a framed rangefinder and print a few revolutions
//
// Sends the start command, feeds received bytes through the frame decoder,
// prints a summary of each published scan and stops the sensor on exit.
//
// Usage: cargo run --example scan_probe -- [port] [revolutions]
// Example: cargo run --example scan_probe -- /dev/ttyUSB0 5

use diffbot_runtime::config::DEFAULT_LIDAR_BAUD;
use diffbot_runtime::hw::serial;
use diffbot_runtime::lidar::{FramedScanDecoder, START_COMMAND, STOP_COMMAND};
use std::io::Read;
use std::time::{Duration, Instant};

const GIVE_UP_AFTER: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let wanted: u64 = match std::env::args().nth(2) {
        Some(n) => n.parse()?,
        None => 3,
    };

    println!("Serial port: {} @ {} baud", port_name, DEFAULT_LIDAR_BAUD);

    println!("Step 1: Opening serial port...");
    let mut port = match serial::open(&port_name, DEFAULT_LIDAR_BAUD) {
        Ok(port) => {
            println!("  ✓ Serial port opened");
            port
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            return Err(e.into());
        }
    };

    println!("Step 2: Starting scan...");
    serial::send_command(port.as_mut(), &START_COMMAND)?;

    println!("Step 3: Waiting for {} revolutions...", wanted);
    let mut decoder = FramedScanDecoder::new();
    let mut seen = 0;
    let mut buf = [0u8; 256];
    let started = Instant::now();

    while seen < wanted && started.elapsed() < GIVE_UP_AFTER {
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        };
        for &byte in &buf[..n] {
            // Nothing else shares this decoder; re-arming is implicit
            let _ = decoder.on_byte(byte);
        }

        let stats = decoder.stats();
        if stats.revolutions > seen {
            seen = stats.revolutions;
            let scan = decoder.latest();
            let valid: Vec<_> = scan.points.iter().filter(|p| p.distance > 0).collect();
            let nearest = valid.iter().min_by_key(|p| p.distance);
            print!(
                "  Revolution {}: {} points, {} with range",
                scan.revolution,
                scan.points.len(),
                valid.len()
            );
            match nearest {
                Some(p) => println!(
                    ", nearest {} mm at {:.2} deg",
                    p.distance,
                    p.angle as f32 / 100.0
                ),
                None => println!(),
            }
        }
    }

    let stats = decoder.stats();
    println!();
    println!(
        "Frames: {} accepted, {} dropped on checksum",
        stats.frames, stats.dropped
    );
    if seen < wanted {
        println!("⚠ Only {} of {} revolutions within {:?}", seen, wanted, GIVE_UP_AFTER);
    }

    println!("Step 4: Stopping scan...");
    serial::send_command(port.as_mut(), &STOP_COMMAND)?;
    Ok(())
}
