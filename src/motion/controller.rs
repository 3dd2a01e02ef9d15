// Direction/speed state machine and the only writer of motor duties
//
// Direction changes and speed ramps are evaluated on a fixed wall-clock
// interval (`SPEED_UPDATE_INTERVAL`); a tick before the interval elapsed is
// a no-op. Forward/backward duties come from the per-wheel PIDs fed with the
// magnitude of the latest wheel rate; turns are open loop at `TURN_SPEED`.

use tracing::debug;

use super::pid::PidController;
use crate::config::{
    MAX_SPEED, PID_GAINS_A, PID_GAINS_B, SPEED_STEP, SPEED_UPDATE_INTERVAL, TURN_SPEED,
};
use crate::hw::MotorOutputs;
use crate::messages::{Direction, DutyCycle, WheelRates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub target_direction: Direction,
    pub current_direction: Direction,
    pub target_speed: u32,
    pub current_speed: u32,
    pub last_update_ms: u64,
}

pub struct MotionController {
    state: MotionState,
    pid_a: PidController,
    pid_b: PidController,
    rates: WheelRates,
    last_duty: DutyCycle,
}

impl MotionController {
    pub fn new() -> Self {
        Self {
            state: MotionState::default(),
            pid_a: PidController::from_gains(PID_GAINS_A),
            pid_b: PidController::from_gains(PID_GAINS_B),
            rates: WheelRates::default(),
            last_duty: DutyCycle::zero(),
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn pids(&self) -> (&PidController, &PidController) {
        (&self.pid_a, &self.pid_b)
    }

    pub fn last_duty(&self) -> DutyCycle {
        self.last_duty
    }

    /// Record the direction intent; the state machine acts on it at the next ramp tick
    pub fn set_intent(&mut self, direction: Direction, speed_hint: u32) {
        self.state.target_direction = direction;
        self.state.target_speed = speed_hint.min(MAX_SPEED);
    }

    /// Switch into a turn immediately and actuate, ahead of the next ramp tick
    ///
    /// Ends in the same state the ramp tick would reach for the same intent.
    pub fn engage_turn<O: MotorOutputs>(&mut self, direction: Direction, outputs: &mut O) {
        debug_assert!(direction.is_turn());
        self.state.target_direction = direction;
        self.state.current_direction = direction;
        self.state.target_speed = TURN_SPEED;
        self.drive(outputs);
    }

    /// Store the latest wheel rate sample for the PIDs
    pub fn update_rates(&mut self, rates: WheelRates) {
        self.rates = rates;
    }

    /// Immediate and total stop: zero speed, STOP committed, all channels zeroed
    pub fn emergency_stop<O: MotorOutputs>(&mut self, outputs: &mut O) {
        self.state.target_direction = Direction::Stop;
        self.state.current_direction = Direction::Stop;
        self.state.target_speed = 0;
        self.state.current_speed = 0;
        self.pid_a.setpoint = 0.0;
        self.pid_b.setpoint = 0.0;
        self.pid_a.reset_integral();
        self.pid_b.reset_integral();
        self.drive(outputs);
    }

    /// Evaluate the direction state machine and speed ramp
    ///
    /// Returns true if the ramp interval elapsed and the state machine ran.
    pub fn tick<O: MotorOutputs>(&mut self, now_ms: u64, outputs: &mut O) -> bool {
        // Anti-windup: integrals only accumulate while a wheel is driven
        if !self.state.current_direction.is_driven() {
            self.pid_a.setpoint = 0.0;
            self.pid_b.setpoint = 0.0;
            self.pid_a.reset_integral();
            self.pid_b.reset_integral();
        }

        if now_ms.saturating_sub(self.state.last_update_ms) < SPEED_UPDATE_INTERVAL {
            return false;
        }
        self.state.last_update_ms = now_ms;

        let target = self.state.target_direction;
        let current = self.state.current_direction;

        if target != current {
            if target.is_driven() && (current == Direction::Stop || current.is_driven()) {
                self.state.current_direction = target;
                self.state.target_speed = MAX_SPEED;
                debug!("direction {:?} -> {:?}", current, target);
                self.drive(outputs);
            } else if target.is_turn() {
                self.state.current_direction = target;
                self.state.target_speed = TURN_SPEED;
                debug!("direction {:?} -> {:?}", current, target);
                self.drive(outputs);
            } else if target == Direction::Stop {
                self.state.target_speed = 0;
                if self.state.current_speed > 0 {
                    self.state.current_speed = self.state.current_speed.saturating_sub(SPEED_STEP);
                } else {
                    self.state.current_direction = Direction::Stop;
                    debug!("direction {:?} -> Stop", current);
                }
                self.drive(outputs);
            }
            // Forward/backward requested mid-turn: held until the turn ends
        } else if current != Direction::Stop {
            let s = &mut self.state;
            if s.current_speed < s.target_speed {
                s.current_speed = (s.current_speed + SPEED_STEP).min(s.target_speed);
            } else if s.current_speed > s.target_speed {
                s.current_speed = s.current_speed.saturating_sub(SPEED_STEP).max(s.target_speed);
            }
            self.drive(outputs);
        }
        true
    }

    /// Compute and emit the duty for the current direction
    fn drive<O: MotorOutputs>(&mut self, outputs: &mut O) {
        let duty = match self.state.current_direction {
            Direction::Stop => DutyCycle::zero(),
            dir @ (Direction::Forward | Direction::Backward) => {
                self.pid_a.setpoint = self.state.target_speed as f32;
                self.pid_b.setpoint = self.state.target_speed as f32;
                let a = self.pid_a.compute(self.rates.a.abs()) as i32;
                let b = self.pid_b.compute(self.rates.b.abs()) as i32;
                if dir == Direction::Forward {
                    DutyCycle::from_wheels(a, b)
                } else {
                    DutyCycle::from_wheels(-a, -b)
                }
            }
            // UTURN shares the left spin pattern; only its completion threshold differs
            Direction::Left | Direction::UTurn => {
                DutyCycle::from_wheels(-(TURN_SPEED as i32), TURN_SPEED as i32)
            }
            Direction::Right => DutyCycle::from_wheels(TURN_SPEED as i32, -(TURN_SPEED as i32)),
        };
        self.last_duty = duty;
        outputs.apply(duty);
    }
}

impl Default for MotionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every duty command
    #[derive(Default)]
    struct Recorder(Vec<DutyCycle>);

    impl MotorOutputs for Recorder {
        fn apply(&mut self, duty: DutyCycle) {
            self.0.push(duty);
        }
    }

    fn run_ticks(mc: &mut MotionController, out: &mut Recorder, start_ms: u64, n: u64) -> u64 {
        let mut now = start_ms;
        for _ in 0..n {
            now += SPEED_UPDATE_INTERVAL;
            mc.tick(now, out);
        }
        now
    }

    #[test]
    fn test_tick_without_elapsed_interval_is_noop() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        assert!(mc.tick(SPEED_UPDATE_INTERVAL, &mut out));
        assert!(!mc.tick(SPEED_UPDATE_INTERVAL + 10, &mut out));
        assert_eq!(out.0.len(), 1);
    }

    #[test]
    fn test_stop_to_forward_ramps_up() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);

        // First tick switches direction, speed still 0
        let now = run_ticks(&mut mc, &mut out, 0, 1);
        assert_eq!(mc.state().current_direction, Direction::Forward);
        assert_eq!(mc.state().current_speed, 0);
        assert_eq!(mc.state().target_speed, MAX_SPEED);

        // Then one step per interval
        let now = run_ticks(&mut mc, &mut out, now, 1);
        assert_eq!(mc.state().current_speed, SPEED_STEP);
        run_ticks(&mut mc, &mut out, now, 10);
        assert_eq!(mc.state().current_speed, MAX_SPEED);
    }

    #[test]
    fn test_speed_changes_at_most_one_step_per_interval() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Backward, MAX_SPEED);
        let mut now = 0;
        let mut prev = 0;
        for i in 0..30 {
            if i == 15 {
                mc.set_intent(Direction::Stop, 0);
            }
            now += SPEED_UPDATE_INTERVAL;
            mc.tick(now, &mut out);
            let speed = mc.state().current_speed;
            assert!(speed.abs_diff(prev) <= SPEED_STEP);
            prev = speed;
        }
        assert_eq!(mc.state().current_direction, Direction::Stop);
    }

    #[test]
    fn test_forward_to_backward_switches_immediately() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        let now = run_ticks(&mut mc, &mut out, 0, 4);
        let speed = mc.state().current_speed;

        mc.set_intent(Direction::Backward, MAX_SPEED);
        run_ticks(&mut mc, &mut out, now, 1);
        assert_eq!(mc.state().current_direction, Direction::Backward);
        assert_eq!(mc.state().current_speed, speed);
    }

    const ALL: [Direction; 6] = [
        Direction::Stop,
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::UTurn,
    ];

    /// Speed a direction settles at once its ramp is done
    fn cruise_speed(direction: Direction) -> u32 {
        match direction {
            Direction::Stop => 0,
            Direction::Forward | Direction::Backward => MAX_SPEED,
            Direction::Left | Direction::Right | Direction::UTurn => TURN_SPEED,
        }
    }

    /// `(current_direction, current_speed)` one tick after `to` is requested
    /// while settled in `from`
    fn after_one_tick(from: Direction, to: Direction) -> (Direction, u32) {
        let speed = cruise_speed(from);
        if to == from {
            return (from, speed);
        }
        match to {
            Direction::Stop if speed > 0 => (from, speed - SPEED_STEP),
            Direction::Stop => (Direction::Stop, 0),
            // Driven intents wait for a running turn to finish
            Direction::Forward | Direction::Backward if from.is_turn() => (from, speed),
            _ => (to, speed),
        }
    }

    /// `(current_direction, current_speed)` once the ramp has settled
    fn after_settling(from: Direction, to: Direction) -> (Direction, u32) {
        match to {
            Direction::Forward | Direction::Backward if from.is_turn() => (from, TURN_SPEED),
            _ => (to, cruise_speed(to)),
        }
    }

    #[test]
    fn test_every_direction_transition() {
        for from in ALL {
            for to in ALL {
                let mut mc = MotionController::new();
                let mut out = Recorder::default();
                mc.set_intent(from, cruise_speed(from));
                let now = run_ticks(&mut mc, &mut out, 0, 6);
                assert_eq!(
                    (mc.state().current_direction, mc.state().current_speed),
                    (from, cruise_speed(from)),
                    "settling in {:?}",
                    from
                );

                mc.set_intent(to, cruise_speed(to));
                let now = run_ticks(&mut mc, &mut out, now, 1);
                assert_eq!(
                    (mc.state().current_direction, mc.state().current_speed),
                    after_one_tick(from, to),
                    "{:?} -> {:?} after one tick",
                    from,
                    to
                );

                run_ticks(&mut mc, &mut out, now, 10);
                assert_eq!(
                    (mc.state().current_direction, mc.state().current_speed),
                    after_settling(from, to),
                    "{:?} -> {:?} settled",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_stop_from_turn_ramps_three_steps() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Left, TURN_SPEED);
        let mut now = run_ticks(&mut mc, &mut out, 0, 4);
        assert_eq!(mc.state().current_speed, TURN_SPEED);

        mc.set_intent(Direction::Stop, 0);
        for expected in [200, 100, 0] {
            now = run_ticks(&mut mc, &mut out, now, 1);
            assert_eq!(mc.state().current_direction, Direction::Left);
            assert_eq!(mc.state().current_speed, expected);
        }
        run_ticks(&mut mc, &mut out, now, 1);
        assert_eq!(mc.state().current_direction, Direction::Stop);
        assert!(out.0.last().unwrap().is_zero());
    }

    #[test]
    fn test_pid_setpoint_follows_target_speed() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);

        // Switching tick already drives, current speed still 0
        let now = run_ticks(&mut mc, &mut out, 0, 1);
        assert_eq!(mc.state().current_speed, 0);
        assert_eq!(mc.pids().0.setpoint, MAX_SPEED as f32);
        assert_eq!(mc.pids().1.setpoint, MAX_SPEED as f32);
        assert!(!out.0.last().unwrap().is_zero());

        // STOP drops the setpoint at once while the speed ramps down
        let now = run_ticks(&mut mc, &mut out, now, 5);
        mc.set_intent(Direction::Stop, 0);
        run_ticks(&mut mc, &mut out, now, 1);
        assert_eq!(mc.state().current_direction, Direction::Forward);
        assert_eq!(mc.state().current_speed, MAX_SPEED - SPEED_STEP);
        assert_eq!(mc.pids().0.setpoint, 0.0);
        assert_eq!(mc.pids().1.setpoint, 0.0);
    }

    #[test]
    fn test_driven_intent_held_during_turn() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.engage_turn(Direction::Left, &mut out);
        mc.set_intent(Direction::Forward, MAX_SPEED);
        run_ticks(&mut mc, &mut out, 0, 5);
        assert_eq!(mc.state().current_direction, Direction::Left);
    }

    #[test]
    fn test_stop_ramps_down_then_commits() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        let now = run_ticks(&mut mc, &mut out, 0, 6);
        assert_eq!(mc.state().current_speed, MAX_SPEED);

        mc.set_intent(Direction::Stop, 0);
        // 5 steps down to 0, still Forward
        let now = run_ticks(&mut mc, &mut out, now, 5);
        assert_eq!(mc.state().current_speed, 0);
        assert_eq!(mc.state().current_direction, Direction::Forward);
        // Next tick commits Stop and zeroes all channels
        run_ticks(&mut mc, &mut out, now, 1);
        assert_eq!(mc.state().current_direction, Direction::Stop);
        assert!(out.0.last().unwrap().is_zero());
    }

    #[test]
    fn test_turn_patterns() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        let ts = TURN_SPEED;

        mc.engage_turn(Direction::Left, &mut out);
        assert_eq!(out.0.last().unwrap().channels, [ts, 0, ts, 0]);
        mc.engage_turn(Direction::Right, &mut out);
        assert_eq!(out.0.last().unwrap().channels, [0, ts, 0, ts]);
        mc.engage_turn(Direction::UTurn, &mut out);
        assert_eq!(out.0.last().unwrap().channels, [ts, 0, ts, 0]);
    }

    #[test]
    fn test_eager_and_ticked_turn_converge() {
        let mut eager = MotionController::new();
        let mut eager_out = Recorder::default();
        eager.engage_turn(Direction::Right, &mut eager_out);

        let mut ticked = MotionController::new();
        let mut ticked_out = Recorder::default();
        ticked.set_intent(Direction::Right, 0);
        run_ticks(&mut ticked, &mut ticked_out, 0, 1);

        assert_eq!(eager.state().current_direction, ticked.state().current_direction);
        assert_eq!(eager.state().target_speed, ticked.state().target_speed);
        assert_eq!(eager_out.0.last(), ticked_out.0.last());
    }

    #[test]
    fn test_forward_duty_uses_pid() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        let now = run_ticks(&mut mc, &mut out, 0, 3);
        mc.update_rates(WheelRates { a: -20.0, b: 20.0 });
        run_ticks(&mut mc, &mut out, now, 1);

        let duty = *out.0.last().unwrap();
        let (a, b) = duty.wheels();
        assert!(a > 0 && b > 0);
        // Forward uses channels 2 and 3 only
        assert_eq!(duty.channels[0], 0);
        assert_eq!(duty.channels[3], 0);
        assert!(a as u32 <= MAX_SPEED && b as u32 <= MAX_SPEED);
    }

    #[test]
    fn test_integral_reset_when_not_driven() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        let now = run_ticks(&mut mc, &mut out, 0, 4);
        assert!(mc.pids().0.integral() != 0.0);

        mc.engage_turn(Direction::Left, &mut out);
        mc.tick(now + 1, &mut out);
        assert_eq!(mc.pids().0.integral(), 0.0);
        assert_eq!(mc.pids().1.integral(), 0.0);
    }

    #[test]
    fn test_emergency_stop() {
        let mut mc = MotionController::new();
        let mut out = Recorder::default();
        mc.set_intent(Direction::Forward, MAX_SPEED);
        run_ticks(&mut mc, &mut out, 0, 6);

        mc.emergency_stop(&mut out);
        let s = mc.state();
        assert_eq!(s.current_direction, Direction::Stop);
        assert_eq!(s.target_direction, Direction::Stop);
        assert_eq!(s.current_speed, 0);
        assert_eq!(s.target_speed, 0);
        assert!(out.0.last().unwrap().is_zero());
        assert!(mc.last_duty().is_zero());
    }
}
