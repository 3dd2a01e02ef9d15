// Timing, protocol constants, topics and command-line options
use clap::Parser;

// Motion control
pub const MAX_SPEED: u32 = 500;
pub const SPEED_STEP: u32 = 100;
pub const TURN_SPEED: u32 = 300;

// Ramp cadence (ms), independent of the control sample period
pub const SPEED_UPDATE_INTERVAL: u64 = 50;

// Control loop sample period (ms) - encoders, gyro integration and lidar polling run at this rate
pub const SAMPLE_TIME_MS: u32 = 100;

// Bridge feedback older than this (ms) is treated as lost - tolerates one missed sample
pub const FEEDBACK_TIMEOUT_MS: u32 = 2 * SAMPLE_TIME_MS;

// Encoder pulses per wheel revolution
pub const PPR: u32 = 360;

// Native widths of the two hardware pulse counters
// (wheel A on a 32-bit timer, wheel B on a 16-bit one)
pub const ENCODER_A_BITS: u32 = 32;
pub const ENCODER_B_BITS: u32 = 16;

// Per-wheel PID gains (Kp, Ki, Kd)
pub const PID_GAINS_A: (f32, f32, f32) = (0.8, 0.01, 0.1);
pub const PID_GAINS_B: (f32, f32, f32) = (0.85, 0.01, 0.1);

// Turn maneuvers (degrees of integrated heading)
pub const ANGLE_TURN_TARGET: f32 = 90.0;
pub const U_TURN_TARGET: f32 = 180.0;

// Streaming rangefinder (hardware-filled ring, 5 byte measurement packets)
pub const DMA_BUFFER_SIZE: usize = 256;
pub const DATA_PACKET_SIZE: usize = 5;
pub const SYNC_BYTE: u8 = 0xA5;
pub const ANGLE_FILTER_THRESHOLD: f32 = 1.0;
pub const MIN_VALID_DISTANCE: f32 = 50.0; // mm
pub const MAX_VALID_DISTANCE: f32 = 12000.0; // mm
pub const LIDAR_TIMEOUT_THRESHOLD: u64 = 500; // ms
pub const SCAN_REQUEST: [u8; 2] = [SYNC_BYTE, 0x20];

// Framed rangefinder (checksum framed 84 byte capsules)
pub const LS_HEADER1: u8 = 0xA;
pub const LS_HEADER2: u8 = 0x5;
pub const LS_FRAME_LEN: usize = 84;
pub const SAMPLES_PER_FRAME: usize = 20;
pub const SCAN_POINTS: usize = 250;
pub const REVOLUTION_THRESHOLD: usize = 260;

// Battery divider on the ADC input (12-bit, 3.3V reference, 1:11 divider)
pub const ADC_VREF: f32 = 3.3;
pub const ADC_DIVIDER: f32 = 11.0;
pub const ADC_FULL_SCALE: f32 = 4096.0;

// Zenoh topics
pub const TOPIC_CMD_BYTE: &str = "diffbot/cmd/byte"; // command bytes from teleop
pub const TOPIC_HW_FEEDBACK: &str = "diffbot/hw/feedback"; // encoder counts + IMU from the bridge
pub const TOPIC_RT_DUTY: &str = "diffbot/rt/duty"; // actuation
pub const TOPIC_HEALTH: &str = "diffbot/state/health"; // health status
pub const TOPIC_TELEMETRY: &str = "diffbot/telemetry"; // telemetry lines
pub const TOPIC_SCAN: &str = "diffbot/scan"; // published 360 degree scans

pub const DEFAULT_COMMAND_BAUD: u32 = 9600;
pub const DEFAULT_LIDAR_BAUD: u32 = 460_800;

/// Command line options for the runtime binary
#[derive(Debug, Clone, Parser)]
#[command(
    name = "diffbot-runtime",
    about = "Differential-drive control and lidar ingestion runtime"
)]
pub struct Args {
    /// Serial port carrying single-byte commands and telemetry lines (e.g. a Bluetooth SPP link)
    #[arg(long)]
    pub command_port: Option<String>,

    #[arg(long, default_value_t = DEFAULT_COMMAND_BAUD)]
    pub command_baud: u32,

    /// Serial port of the streaming rangefinder (5 byte measurement packets)
    #[arg(long)]
    pub stream_lidar_port: Option<String>,

    /// Serial port of the framed rangefinder (84 byte capsules)
    #[arg(long)]
    pub framed_lidar_port: Option<String>,

    #[arg(long, default_value_t = DEFAULT_LIDAR_BAUD)]
    pub lidar_baud: u32,

    /// Drive an in-process simulated base instead of the zenoh hardware bridge
    #[arg(long)]
    pub simulate: bool,
}
