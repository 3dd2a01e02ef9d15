// Simulated differential-drive base
//
// Converts duty commands to wheel speeds through a first-order lag,
// accumulates encoder pulses in counters of the real native widths and
// derives the yaw rate seen by the gyroscope from the wheel speed difference.

use std::f32::consts::PI;

use tracing::debug;

use super::{Chassis, HwError, MotorOutputs};
use crate::config::{ENCODER_A_BITS, ENCODER_B_BITS, PPR};
use crate::messages::{DutyCycle, ImuSample};

/// Base geometry
pub const WHEEL_RADIUS: f32 = 0.033; // meters
pub const TRACK_WIDTH: f32 = 0.16; // meters (distance between wheels)

/// Steady-state wheel speed per unit of duty
const RPM_PER_DUTY: f32 = 0.2;

/// Motor response time constant (ms)
const MOTOR_TAU_MS: f32 = 150.0;

/// Battery ADC sample for a 12V pack
const NOMINAL_BATTERY_RAW: u16 = 1354;

pub struct SimChassis {
    duty: DutyCycle,
    rpm: [f32; 2],
    pulses: [f32; 2],
    counts: [u32; 2],
    yaw_rate: f32,
    gyro_bias: f32,
    imu_fault: bool,
}

impl SimChassis {
    pub fn new() -> Self {
        Self {
            duty: DutyCycle::zero(),
            rpm: [0.0; 2],
            pulses: [0.0; 2],
            counts: [0; 2],
            yaw_rate: 0.0,
            gyro_bias: 0.0,
            imu_fault: false,
        }
    }

    /// Add a constant gyroscope bias (deg/s); heading integration does not correct for it
    pub fn with_gyro_bias(mut self, bias: f32) -> Self {
        self.gyro_bias = bias;
        self
    }

    /// Simulate an inertial sensor that fails to initialize
    pub fn with_imu_fault(mut self) -> Self {
        self.imu_fault = true;
        self
    }

    pub fn duty(&self) -> DutyCycle {
        self.duty
    }

    pub fn wheel_rpm(&self) -> [f32; 2] {
        self.rpm
    }

    /// Start the counters at arbitrary positions (exercises counter wraparound)
    pub fn set_counts(&mut self, counts: [u32; 2]) {
        self.counts = [counts[0], counts[1] & mask(ENCODER_B_BITS)];
    }
}

impl Default for SimChassis {
    fn default() -> Self {
        Self::new()
    }
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

/// Wheel surface speed in m/s for a given rpm
fn rpm_to_linear(rpm: f32) -> f32 {
    rpm * 2.0 * PI * WHEEL_RADIUS / 60.0
}

impl MotorOutputs for SimChassis {
    fn apply(&mut self, duty: DutyCycle) {
        self.duty = duty;
    }
}

impl Chassis for SimChassis {
    fn encoder_counts(&mut self) -> Result<[u32; 2], HwError> {
        Ok(self.counts)
    }

    fn init_imu(&mut self) -> Result<(), HwError> {
        if self.imu_fault {
            return Err(HwError::SensorInit("simulated sensor fault".to_string()));
        }
        Ok(())
    }

    fn read_imu(&mut self) -> Result<ImuSample, HwError> {
        if self.imu_fault {
            return Err(HwError::NoFeedback("IMU"));
        }
        Ok(ImuSample {
            accel_z: 1.0,
            gyro_z: self.yaw_rate + self.gyro_bias,
            ..ImuSample::default()
        })
    }

    fn battery_raw(&mut self) -> Option<u16> {
        Some(NOMINAL_BATTERY_RAW)
    }

    fn step(&mut self, dt_ms: u32) {
        let dt_ms = dt_ms as f32;
        let (a, b) = self.duty.wheels();
        let targets = [a as f32 * RPM_PER_DUTY, b as f32 * RPM_PER_DUTY];
        let alpha = dt_ms / (MOTOR_TAU_MS + dt_ms);

        let widths = [ENCODER_A_BITS, ENCODER_B_BITS];
        for i in 0..2 {
            self.rpm[i] += (targets[i] - self.rpm[i]) * alpha;

            // Whole pulses go to the counter, the fraction carries over
            self.pulses[i] += self.rpm[i] * PPR as f32 / 60_000.0 * dt_ms;
            let whole = self.pulses[i].trunc();
            self.pulses[i] -= whole;
            self.counts[i] = self.counts[i].wrapping_add(whole as i32 as u32) & mask(widths[i]);
        }

        // Counter-clockwise positive: wheel B faster than A turns left
        let v_a = rpm_to_linear(self.rpm[0]);
        let v_b = rpm_to_linear(self.rpm[1]);
        self.yaw_rate = ((v_b - v_a) / TRACK_WIDTH).to_degrees();

        debug!(
            "sim step: rpm=({:.1}, {:.1}) counts={:?} yaw={:.1}deg/s",
            self.rpm[0], self.rpm[1], self.counts, self.yaw_rate
        );
    }
}
