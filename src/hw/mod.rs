// Hardware collaborators of the control core
//
// The core only talks to hardware through these narrow contracts:
// - MotorOutputs: four duty channels
// - Chassis: motors + free-running encoder counters + inertial sensor
// - TelemetrySink: newline-terminated telemetry lines
// - HardwareRing: a circular byte buffer filled autonomously by a producer

pub mod bridge;
pub mod ring;
pub mod serial;
pub mod sim;

use crate::config::{ADC_DIVIDER, ADC_FULL_SCALE, ADC_VREF};
use crate::messages::{DutyCycle, HardwareFeedback, ImuSample, TelemetryLine};

pub use bridge::BridgeChassis;
pub use ring::DmaRing;
pub use sim::SimChassis;

/// Error types for hardware collaborators
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inertial sensor initialization failed: {0}")]
    SensorInit(String),

    #[error("No {0} feedback received yet")]
    NoFeedback(&'static str),

    #[error("{0} feedback is stale ({1}ms old)")]
    StaleFeedback(&'static str, u32),
}

/// Actuator contract: set the four motor driver channels
pub trait MotorOutputs {
    fn apply(&mut self, duty: DutyCycle);
}

/// Everything the control loop needs from the drive base
pub trait Chassis: MotorOutputs {
    /// Raw free-running pulse counters (A, B) in their native widths
    fn encoder_counts(&mut self) -> Result<[u32; 2], HwError>;

    fn init_imu(&mut self) -> Result<(), HwError>;

    fn read_imu(&mut self) -> Result<ImuSample, HwError>;

    /// Raw 12-bit battery ADC sample, if the base exposes one
    fn battery_raw(&mut self) -> Option<u16> {
        None
    }

    /// Advance time-dependent hardware state by one control period
    fn step(&mut self, _dt_ms: u32) {}

    /// Feed externally reported hardware state
    fn ingest(&mut self, _feedback: &HardwareFeedback) {}
}

/// Destination for telemetry lines
pub trait TelemetrySink {
    fn emit(&mut self, line: TelemetryLine);
}

impl TelemetrySink for Vec<TelemetryLine> {
    fn emit(&mut self, line: TelemetryLine) {
        self.push(line);
    }
}

/// A fixed-size circular byte buffer filled by an autonomous producer
///
/// The consumer only reads bytes and the producer's write index. The one
/// corrective write it may make is `restart_fill`.
pub trait HardwareRing {
    fn capacity(&self) -> usize;

    /// Index the producer will write next, in `0..capacity()`
    fn write_index(&self) -> usize;

    fn byte_at(&self, index: usize) -> u8;

    /// True (once) if a fill cycle completed with the sync byte at index 0
    fn take_wrap_sync(&self) -> bool;

    /// Force the producer back to a full, empty buffer (write index 0)
    fn restart_fill(&self);
}

/// Convert a raw 12-bit ADC sample of the battery divider to volts
pub fn battery_voltage(raw: u16) -> f32 {
    (raw as f32 * ADC_VREF * ADC_DIVIDER) / ADC_FULL_SCALE
}
