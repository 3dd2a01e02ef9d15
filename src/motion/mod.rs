// Motion subsystem for the differential base
//
// Provides:
// - Wheel speed estimation from wrapping pulse counters
// - Per-wheel speed PID
// - Direction/speed state machine (only writer of motor duties)
// - Gyro-integrated turn maneuvers
// - Single-byte command interpreter

pub mod command;
pub mod controller;
pub mod encoder;
pub mod pid;
pub mod turn;

pub use command::CommandInterpreter;
pub use controller::{MotionController, MotionState};
pub use encoder::WheelSpeedEstimator;
pub use pid::PidController;
pub use turn::{TurnKind, TurnManeuver, TurnManeuverTracker};
