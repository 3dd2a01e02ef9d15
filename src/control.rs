// Control context: all mutable control state in one place
//
// Command bytes (receive side) and the periodic ticks (loop side) both act on
// this struct. Write ownership per field:
// - target direction/speed: command path and ramp tick (last writer wins)
// - current direction: ramp tick, eager turn actuation, maneuver completion
// - turn accumulators: control tick only; activation/clear from commands
// - PID state and duty output: motion controller only

use tracing::{debug, info, warn};

use crate::config::{ENCODER_A_BITS, ENCODER_B_BITS, SAMPLE_TIME_MS};
use crate::hw::{Chassis, HwError, TelemetrySink, battery_voltage};
use crate::messages::{Direction, DutyCycle, TelemetryLine, WheelRates};
use crate::motion::{CommandInterpreter, MotionController, TurnManeuverTracker, WheelSpeedEstimator};
use crate::rx::Rearm;

pub struct ControlContext<C: Chassis> {
    pub motion: MotionController,
    pub turns: TurnManeuverTracker,
    pub commands: CommandInterpreter,
    encoders: WheelSpeedEstimator,
    encoders_primed: bool,
    chassis: C,
    imu_ok: bool,
}

impl<C: Chassis> ControlContext<C> {
    pub fn new(mut chassis: C) -> Self {
        let mut encoders = WheelSpeedEstimator::new(ENCODER_A_BITS, ENCODER_B_BITS);
        // A bridged base has no counts until its first feedback; priming waits for it
        let encoders_primed = match chassis.encoder_counts() {
            Ok(counts) => {
                encoders.prime(counts);
                true
            }
            Err(_) => false,
        };
        Self {
            motion: MotionController::new(),
            turns: TurnManeuverTracker::new(),
            commands: CommandInterpreter::new(),
            encoders,
            encoders_primed,
            chassis,
            imu_ok: false,
        }
    }

    /// Bring up the inertial sensor. Failure is reported once and not fatal:
    /// turns still run, but heading integration gives no guarantees.
    pub fn init_imu<S: TelemetrySink>(&mut self, telemetry: &mut S) -> bool {
        self.imu_ok = match self.chassis.init_imu() {
            Ok(()) => {
                info!("Inertial sensor ready");
                true
            }
            Err(e) => {
                warn!("{}; continuing without reliable heading", e);
                false
            }
        };
        telemetry.emit(TelemetryLine::ImuStatus { ok: self.imu_ok });
        self.imu_ok
    }

    pub fn imu_ok(&self) -> bool {
        self.imu_ok
    }

    /// Whether wheel counts are currently arriving
    pub fn encoders_live(&self) -> bool {
        self.encoders_primed
    }

    /// Command channel handler
    pub fn on_command_byte(&mut self, byte: u8) -> Rearm {
        self.commands
            .on_byte(byte, &mut self.motion, &mut self.turns, &mut self.chassis)
    }

    /// Speed ramp / direction state machine, on its own interval
    pub fn ramp_tick(&mut self, now_ms: u64) -> bool {
        self.motion.tick(now_ms, &mut self.chassis)
    }

    /// One fixed-period control sample: link notice, wheel rates, inertial
    /// sample and turn tracking
    pub fn control_tick<S: TelemetrySink>(&mut self, telemetry: &mut S) -> WheelRates {
        self.commands.announce(telemetry);

        self.chassis.step(SAMPLE_TIME_MS);
        let rates = match self.chassis.encoder_counts() {
            Ok(counts) if self.encoders_primed => self.encoders.sample(counts),
            Ok(counts) => {
                // First counts after start-up or a feedback gap: no delta yet
                debug!("Wheel counters primed at {:?}", counts);
                self.encoders.prime(counts);
                self.encoders_primed = true;
                WheelRates::default()
            }
            Err(e) => {
                self.on_feedback_lost(e);
                return WheelRates::default();
            }
        };
        self.motion.update_rates(rates);
        telemetry.emit(TelemetryLine::WheelRates(rates));

        let sample = match self.chassis.read_imu() {
            Ok(sample) => sample,
            Err(e) => {
                if self.imu_ok {
                    warn!("IMU read failed: {}", e);
                }
                return rates;
            }
        };
        telemetry.emit(TelemetryLine::Imu(sample));

        if let Some(kind) = self.turns.update(sample.gyro_z, SAMPLE_TIME_MS, telemetry) {
            info!("{:?} finished, stopping", kind);
            self.motion.emergency_stop(&mut self.chassis);
        }
        rates
    }

    /// Without wheel counts there is neither speed control nor trustworthy
    /// heading, so the base is stopped and counters re-primed on recovery
    fn on_feedback_lost(&mut self, e: HwError) {
        let state = self.motion.state();
        let moving = state.current_direction != Direction::Stop
            || state.target_direction != Direction::Stop;
        if moving {
            warn!("{}; stopping base", e);
            self.emergency_stop();
        } else if self.encoders_primed {
            warn!("{}", e);
        }
        self.encoders_primed = false;
    }

    /// Immediate total stop: clear maneuvers, zero speed, zero all channels
    pub fn emergency_stop(&mut self) {
        self.turns.clear();
        self.motion.emergency_stop(&mut self.chassis);
    }

    pub fn duty(&self) -> DutyCycle {
        self.motion.last_duty()
    }

    pub fn battery_volts(&mut self) -> Option<f32> {
        self.chassis.battery_raw().map(battery_voltage)
    }

    pub fn chassis(&self) -> &C {
        &self.chassis
    }

    pub fn chassis_mut(&mut self) -> &mut C {
        &mut self.chassis
    }
}
