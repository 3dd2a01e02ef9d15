// Single-byte remote command stream
//
// '0'..'5' map to Stop, Forward, Backward, Left, Right, UTurn. Any other byte
// is ignored, but every byte (valid or not) still hands back a `Rearm` so
// the channel keeps receiving.

use tracing::{debug, info};

use super::controller::MotionController;
use super::turn::TurnManeuverTracker;
use crate::config::MAX_SPEED;
use crate::hw::{MotorOutputs, TelemetrySink};
use crate::messages::{Direction, TelemetryLine};
use crate::rx::Rearm;

#[derive(Debug, Default)]
pub struct CommandInterpreter {
    connected: bool,
    announced: bool,
    ignored: u64,
}

impl CommandInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Handle one received command byte
    pub fn on_byte<O: MotorOutputs>(
        &mut self,
        byte: u8,
        motion: &mut MotionController,
        turns: &mut TurnManeuverTracker,
        outputs: &mut O,
    ) -> Rearm {
        // Any first byte latches the link, whatever its content
        if !self.connected {
            info!("Command link up");
            self.connected = true;
        }

        let Some(direction) = Direction::from_command_byte(byte) else {
            debug!("Ignoring command byte 0x{:02X}", byte);
            self.ignored += 1;
            return Rearm::next();
        };

        debug!("Command {:?}", direction);
        match direction {
            Direction::Stop => {
                turns.clear();
                motion.set_intent(Direction::Stop, 0);
            }
            Direction::Forward | Direction::Backward => {
                turns.clear();
                motion.set_intent(direction, MAX_SPEED);
            }
            Direction::Left | Direction::Right => {
                turns.start_angle_turn(direction);
                motion.engage_turn(direction, outputs);
            }
            Direction::UTurn => {
                turns.start_u_turn();
                motion.engage_turn(Direction::UTurn, outputs);
            }
        }

        Rearm::next()
    }

    /// Emit the connection notice once per connection
    pub fn announce<S: TelemetrySink>(&mut self, telemetry: &mut S) {
        if self.connected && !self.announced {
            telemetry.emit(TelemetryLine::Connected);
            self.announced = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TURN_SPEED;
    use crate::messages::DutyCycle;

    #[derive(Default)]
    struct Recorder(Vec<DutyCycle>);

    impl MotorOutputs for Recorder {
        fn apply(&mut self, duty: DutyCycle) {
            self.0.push(duty);
        }
    }

    struct Fixture {
        cmd: CommandInterpreter,
        motion: MotionController,
        turns: TurnManeuverTracker,
        out: Recorder,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                cmd: CommandInterpreter::new(),
                motion: MotionController::new(),
                turns: TurnManeuverTracker::new(),
                out: Recorder::default(),
            }
        }

        fn send(&mut self, byte: u8) -> Rearm {
            self.cmd
                .on_byte(byte, &mut self.motion, &mut self.turns, &mut self.out)
        }
    }

    #[test]
    fn test_forward_sets_max_speed() {
        let mut f = Fixture::new();
        let _ = f.send(b'1');
        assert_eq!(f.motion.state().target_direction, Direction::Forward);
        assert_eq!(f.motion.state().target_speed, MAX_SPEED);
        // No eager actuation for straight driving
        assert!(f.out.0.is_empty());
    }

    #[test]
    fn test_left_engages_turn_eagerly() {
        let mut f = Fixture::new();
        let _ = f.send(b'3');
        assert!(f.turns.angle_turn().active);
        assert_eq!(f.turns.angle_turn().turn_direction, Some(Direction::Left));
        assert_eq!(f.motion.state().current_direction, Direction::Left);
        assert_eq!(f.motion.state().target_speed, TURN_SPEED);
        assert_eq!(f.out.0.len(), 1);
    }

    #[test]
    fn test_u_turn_engages_tracker() {
        let mut f = Fixture::new();
        let _ = f.send(b'3');
        let _ = f.send(b'5');
        assert!(f.turns.u_turn().active);
        assert!(!f.turns.angle_turn().active);
        assert_eq!(f.motion.state().current_direction, Direction::UTurn);
    }

    #[test]
    fn test_stop_clears_trackers() {
        let mut f = Fixture::new();
        let _ = f.send(b'4');
        let _ = f.send(b'0');
        assert!(!f.turns.is_active());
        assert_eq!(f.motion.state().target_direction, Direction::Stop);
        assert_eq!(f.motion.state().target_speed, 0);
    }

    #[test]
    fn test_invalid_bytes_ignored_but_rearmed() {
        let mut f = Fixture::new();
        let _ = f.send(b'1');
        for byte in [b'6', b'a', 0x00, 0xFF, b'\n'] {
            // Every byte yields a re-arm token
            let _token: Rearm = f.send(byte);
        }
        assert_eq!(f.cmd.ignored(), 5);
        assert_eq!(f.motion.state().target_direction, Direction::Forward);
    }

    #[test]
    fn test_connection_announced_once() {
        let mut f = Fixture::new();
        let mut lines = Vec::new();
        f.cmd.announce(&mut lines);
        assert!(lines.is_empty());

        // Even an ignored byte latches the link
        let _ = f.send(b'x');
        assert!(f.cmd.is_connected());
        f.cmd.announce(&mut lines);
        f.cmd.announce(&mut lines);
        let _ = f.send(b'1');
        f.cmd.announce(&mut lines);
        assert_eq!(lines, vec![TelemetryLine::Connected]);
    }
}
