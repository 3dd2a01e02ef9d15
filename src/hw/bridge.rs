// Hardware bridge chassis
//
// Motor duties leave through the runtime's duty topic; encoder counts and
// inertial samples arrive as `HardwareFeedback` over zenoh.
// Note: the feedback watchdog ages on the control clock (`step`), so a
// bridge that stops reporting turns into `StaleFeedback` instead of the
// last sample being replayed forever

use tracing::{debug, warn};

use super::{Chassis, HwError, MotorOutputs};
use crate::config::FEEDBACK_TIMEOUT_MS;
use crate::messages::{DutyCycle, HardwareFeedback, ImuSample};

#[derive(Default)]
pub struct BridgeChassis {
    feedback: Option<HardwareFeedback>,
    feedback_age_ms: u32,
}

impl BridgeChassis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest feedback, if it is fresh enough to act on
    fn fresh(&self, what: &'static str) -> Result<HardwareFeedback, HwError> {
        let feedback = self.feedback.ok_or(HwError::NoFeedback(what))?;
        if self.feedback_age_ms > FEEDBACK_TIMEOUT_MS {
            return Err(HwError::StaleFeedback(what, self.feedback_age_ms));
        }
        Ok(feedback)
    }
}

impl MotorOutputs for BridgeChassis {
    fn apply(&mut self, _duty: DutyCycle) {}
}

impl Chassis for BridgeChassis {
    fn encoder_counts(&mut self) -> Result<[u32; 2], HwError> {
        let fb = self.fresh("encoder")?;
        Ok([fb.encoder_a, fb.encoder_b])
    }

    fn init_imu(&mut self) -> Result<(), HwError> {
        // The bridge owns the sensor; until it reports a sample we cannot confirm it
        self.read_imu().map(|_| ())
    }

    fn read_imu(&mut self) -> Result<ImuSample, HwError> {
        self.fresh("IMU")?.imu.ok_or(HwError::NoFeedback("IMU"))
    }

    fn battery_raw(&mut self) -> Option<u16> {
        self.feedback.and_then(|fb| fb.battery_raw)
    }

    fn step(&mut self, dt_ms: u32) {
        self.feedback_age_ms = self.feedback_age_ms.saturating_add(dt_ms);
    }

    fn ingest(&mut self, feedback: &HardwareFeedback) {
        if feedback.imu.is_none() {
            warn!("Bridge feedback without IMU sample");
        }
        debug!("Bridge feedback: {:?}", feedback);
        self.feedback = Some(*feedback);
        self.feedback_age_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SAMPLE_TIME_MS;

    fn feedback(a: u32, b: u32, gyro_z: f32) -> HardwareFeedback {
        HardwareFeedback {
            encoder_a: a,
            encoder_b: b,
            imu: Some(ImuSample {
                gyro_z,
                ..ImuSample::default()
            }),
            battery_raw: Some(1354),
        }
    }

    #[test]
    fn test_feedback_ingest() {
        let mut bridge = BridgeChassis::new();
        assert!(matches!(bridge.read_imu(), Err(HwError::NoFeedback(_))));
        assert!(matches!(bridge.encoder_counts(), Err(HwError::NoFeedback(_))));
        assert!(bridge.init_imu().is_err());

        bridge.ingest(&feedback(42, 7, 12.5));
        assert_eq!(bridge.encoder_counts().unwrap(), [42, 7]);
        assert_eq!(bridge.read_imu().unwrap().gyro_z, 12.5);
        assert!(bridge.init_imu().is_ok());
        assert_eq!(bridge.battery_raw(), Some(1354));
    }

    #[test]
    fn test_feedback_goes_stale() {
        let mut bridge = BridgeChassis::new();
        bridge.ingest(&feedback(42, 7, 30.0));

        // One missed sample is tolerated
        bridge.step(SAMPLE_TIME_MS);
        bridge.step(SAMPLE_TIME_MS);
        assert!(bridge.read_imu().is_ok());
        assert!(bridge.encoder_counts().is_ok());

        bridge.step(SAMPLE_TIME_MS);
        assert!(matches!(
            bridge.read_imu(),
            Err(HwError::StaleFeedback("IMU", 300))
        ));
        assert!(matches!(
            bridge.encoder_counts(),
            Err(HwError::StaleFeedback("encoder", 300))
        ));

        // Fresh feedback revives both
        bridge.ingest(&feedback(50, 9, 0.0));
        assert_eq!(bridge.encoder_counts().unwrap(), [50, 9]);
        assert_eq!(bridge.read_imu().unwrap().gyro_z, 0.0);
    }
}
