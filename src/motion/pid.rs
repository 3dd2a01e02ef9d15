// Per-wheel speed PID
//
// Discrete form without a time base: the integral is a plain running sum
// and the derivative a plain difference, both per control sample. The output
// saturates to `[0, MAX_SPEED]`; the only anti-windup is the external
// `reset_integral` applied while the wheel is not driven.

use crate::config::MAX_SPEED;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidController {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub setpoint: f32,
    integral: f32,
    last_error: f32,
    output: f32,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint: 0.0,
            integral: 0.0,
            last_error: 0.0,
            output: 0.0,
        }
    }

    pub fn from_gains((kp, ki, kd): (f32, f32, f32)) -> Self {
        Self::new(kp, ki, kd)
    }

    /// Run one PID step against a measured value and return the clamped output
    pub fn compute(&mut self, measured: f32) -> f32 {
        let error = self.setpoint - measured;
        self.integral += error;
        let derivative = error - self.last_error;
        self.last_error = error;

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;

        // Overflowed accumulators can produce NaN; treat that as no drive
        self.output = if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, MAX_SPEED as f32)
        };
        self.output
    }

    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn output(&self) -> f32 {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step() {
        let mut pid = PidController::new(0.8, 0.01, 0.1);
        pid.setpoint = 100.0;
        // error 100: 0.8*100 + 0.01*100 + 0.1*100 = 91
        let out = pid.compute(0.0);
        assert!((out - 91.0).abs() < 1e-4, "got {}", out);
        assert_eq!(pid.integral(), 100.0);
    }

    #[test]
    fn test_output_always_in_range() {
        let inputs = [
            0.0,
            1.0,
            -1.0,
            250.0,
            499.9,
            500.0,
            1e6,
            -1e6,
            f32::MAX,
            f32::MIN,
            f32::MIN_POSITIVE,
            -f32::EPSILON,
        ];
        for &setpoint in &[0.0, 300.0, 500.0, -500.0, f32::MAX] {
            let mut pid = PidController::new(0.85, 0.01, 0.1);
            pid.setpoint = setpoint;
            for _ in 0..3 {
                for &measured in &inputs {
                    let out = pid.compute(measured);
                    assert!(
                        (0.0..=MAX_SPEED as f32).contains(&out),
                        "setpoint {} measured {} -> {}",
                        setpoint,
                        measured,
                        out
                    );
                }
            }
        }
    }

    #[test]
    fn test_overshoot_saturates_low() {
        let mut pid = PidController::new(0.8, 0.01, 0.1);
        pid.setpoint = 100.0;
        assert_eq!(pid.compute(1000.0), 0.0);
    }

    #[test]
    fn test_reset_integral() {
        let mut pid = PidController::new(0.8, 0.01, 0.1);
        pid.setpoint = 50.0;
        pid.compute(0.0);
        pid.compute(0.0);
        assert!(pid.integral() > 0.0);
        pid.reset_integral();
        assert_eq!(pid.integral(), 0.0);
    }
}
