// Message and payload types shared by the control core, the decoders and the runtime

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction intent / state of the drive base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Stop,
    Forward,
    Backward,
    Left,
    Right,
    UTurn,
}

impl Direction {
    /// Map a command byte ('0'..='5') to a direction; anything else is not a command
    pub fn from_command_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Direction::Stop),
            b'1' => Some(Direction::Forward),
            b'2' => Some(Direction::Backward),
            b'3' => Some(Direction::Left),
            b'4' => Some(Direction::Right),
            b'5' => Some(Direction::UTurn),
            _ => None,
        }
    }

    pub fn command_byte(self) -> u8 {
        match self {
            Direction::Stop => b'0',
            Direction::Forward => b'1',
            Direction::Backward => b'2',
            Direction::Left => b'3',
            Direction::Right => b'4',
            Direction::UTurn => b'5',
        }
    }

    /// Straight-line directions run closed loop through the wheel PIDs
    pub fn is_driven(self) -> bool {
        matches!(self, Direction::Forward | Direction::Backward)
    }

    /// In-place rotations run open loop at the fixed turn speed
    pub fn is_turn(self) -> bool {
        matches!(self, Direction::Left | Direction::Right | Direction::UTurn)
    }
}

/// Duty command for the four motor driver channels
///
/// Wheel A uses channel 1 (reverse) and channel 2 (forward);
/// wheel B uses channel 3 (forward) and channel 4 (reverse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DutyCycle {
    pub channels: [u32; 4],
}

impl DutyCycle {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build channel duties from signed per-wheel commands (positive = forward)
    pub fn from_wheels(a: i32, b: i32) -> Self {
        let a_mag = a.unsigned_abs();
        let b_mag = b.unsigned_abs();
        Self {
            channels: [
                if a < 0 { a_mag } else { 0 },
                if a > 0 { a_mag } else { 0 },
                if b > 0 { b_mag } else { 0 },
                if b < 0 { b_mag } else { 0 },
            ],
        }
    }

    /// Signed per-wheel commands (A, B) recovered from the channel pattern
    pub fn wheels(&self) -> (i32, i32) {
        let [c1, c2, c3, c4] = self.channels;
        (c2 as i32 - c1 as i32, c3 as i32 - c4 as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.channels.iter().all(|&c| c == 0)
    }
}

/// One wheel-speed sample pair in revolutions per minute (sign = rotation sense)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelRates {
    pub a: f32,
    pub b: f32,
}

/// Inertial sample: acceleration in g, angular rate in deg/s
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
}

/// Single measurement from the streaming rangefinder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    pub quality: u8,
    /// Degrees, 1/64 degree resolution
    pub angle: f32,
    /// Millimeters, 0.25mm resolution
    pub distance: f32,
    pub start_flag: bool,
    pub check_bit: bool,
}

/// One sample of a framed scan: angle in 1/100 degree, raw distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanPoint {
    pub angle: u16,
    pub distance: u16,
}

/// A complete revolution from the framed rangefinder
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanFrame {
    pub revolution: u64,
    pub points: Vec<ScanPoint>,
}

/// Newline-terminated ASCII lines written to the telemetry sink
///
/// The text layout is fixed for compatibility with existing consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryLine {
    Connected,
    ImuStatus { ok: bool },
    WheelRates(WheelRates),
    Imu(ImuSample),
    TurnAngle(f32),
    UTurnAngle(f32),
    Range(RangeReading),
}

impl fmt::Display for TelemetryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryLine::Connected => write!(f, "Connected\r\n"),
            TelemetryLine::ImuStatus { ok: true } => write!(f, "MPU6500 OK\r\n"),
            TelemetryLine::ImuStatus { ok: false } => write!(f, "MPU6500 init failed!\r\n"),
            TelemetryLine::WheelRates(r) => write!(f, "MotorA:{:.2},RPMB:{:.2}\n", r.a, r.b),
            TelemetryLine::Imu(s) => write!(
                f,
                "AccX:{:.2},AccY:{:.2},AccZ:{:.2},GyroX:{:.2},GyroY:{:.2},GyroZ:{:.2}\n",
                s.accel_x, s.accel_y, s.accel_z, s.gyro_x, s.gyro_y, s.gyro_z
            ),
            TelemetryLine::TurnAngle(a) => write!(f, "TurningAngle:{:.2}\n", a),
            TelemetryLine::UTurnAngle(a) => write!(f, "U-TurnAngle:{:.2}\n", a),
            TelemetryLine::Range(r) => {
                write!(f, "A:{:.2},D:{:.2},Q:{}\n", r.angle, r.distance, r.quality)
            }
        }
    }
}

/// Encoder counts and inertial sample reported by the hardware bridge
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareFeedback {
    pub encoder_a: u32,
    pub encoder_b: u32,
    pub imu: Option<ImuSample>,
    #[serde(default)]
    pub battery_raw: Option<u16>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeHealth {
    pub status: HealthStatus,
    pub imu_ok: bool,
    pub link_connected: bool,
    pub direction: Direction,
    pub speed: u32,
    pub battery_volts: Option<f32>,
    pub ring_overruns: u64,
    pub stalled_packets: u64,
    pub dropped_frames: u64,
    pub revolutions: u64,
}
