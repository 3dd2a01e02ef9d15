// Heading-based turn maneuvers
//
// Two independent integrators of the gyroscope z rate: a 90 degree angle turn
// (direction-signed completion) and a 180 degree U-turn (magnitude
// completion). There is no bias or drift correction; a biased gyro shifts
// the completion point. That is an accepted limitation of dead-reckoned
// heading, not something to filter away here.

use tracing::info;

use crate::config::{ANGLE_TURN_TARGET, U_TURN_TARGET};
use crate::hw::TelemetrySink;
use crate::messages::{Direction, TelemetryLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    AngleTurn,
    UTurn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnManeuver {
    pub kind: TurnKind,
    pub active: bool,
    /// Integrated heading in degrees, counter-clockwise positive
    pub accumulated_heading: f32,
    /// Left or Right for angle turns
    pub turn_direction: Option<Direction>,
}

impl TurnManeuver {
    fn new(kind: TurnKind) -> Self {
        Self {
            kind,
            active: false,
            accumulated_heading: 0.0,
            turn_direction: None,
        }
    }

    fn start(&mut self, direction: Option<Direction>) {
        self.active = true;
        self.accumulated_heading = 0.0;
        self.turn_direction = direction;
    }

    fn clear(&mut self) {
        self.active = false;
        self.accumulated_heading = 0.0;
    }

    fn is_complete(&self) -> bool {
        match self.kind {
            TurnKind::AngleTurn => match self.turn_direction {
                Some(Direction::Left) => self.accumulated_heading >= ANGLE_TURN_TARGET,
                Some(Direction::Right) => self.accumulated_heading <= -ANGLE_TURN_TARGET,
                _ => false,
            },
            TurnKind::UTurn => self.accumulated_heading.abs() >= U_TURN_TARGET,
        }
    }
}

pub struct TurnManeuverTracker {
    angle: TurnManeuver,
    u_turn: TurnManeuver,
}

impl TurnManeuverTracker {
    pub fn new() -> Self {
        Self {
            angle: TurnManeuver::new(TurnKind::AngleTurn),
            u_turn: TurnManeuver::new(TurnKind::UTurn),
        }
    }

    pub fn angle_turn(&self) -> &TurnManeuver {
        &self.angle
    }

    pub fn u_turn(&self) -> &TurnManeuver {
        &self.u_turn
    }

    /// Begin a 90 degree turn toward `direction` (Left or Right)
    pub fn start_angle_turn(&mut self, direction: Direction) {
        self.u_turn.clear();
        self.angle.start(Some(direction));
    }

    pub fn start_u_turn(&mut self) {
        self.angle.clear();
        self.u_turn.start(None);
    }

    pub fn clear(&mut self) {
        self.angle.clear();
        self.u_turn.clear();
    }

    pub fn is_active(&self) -> bool {
        self.angle.active || self.u_turn.active
    }

    /// Integrate one gyro sample (deg/s) over `dt_ms` into every active maneuver
    ///
    /// Emits progress telemetry for each active maneuver and returns the kind
    /// of the maneuver that completed on this sample, if any. A completed
    /// maneuver is deactivated and its accumulator reset.
    pub fn update<S: TelemetrySink>(
        &mut self,
        gyro_z: f32,
        dt_ms: u32,
        telemetry: &mut S,
    ) -> Option<TurnKind> {
        let step = gyro_z * dt_ms as f32 / 1000.0;
        let mut completed = None;

        if self.angle.active {
            self.angle.accumulated_heading += step;
            telemetry.emit(TelemetryLine::TurnAngle(self.angle.accumulated_heading));
            if self.angle.is_complete() {
                info!("Angle turn complete at {:.2} deg", self.angle.accumulated_heading);
                self.angle.clear();
                completed = Some(TurnKind::AngleTurn);
            }
        }

        if self.u_turn.active {
            self.u_turn.accumulated_heading += step;
            telemetry.emit(TelemetryLine::UTurnAngle(self.u_turn.accumulated_heading));
            if self.u_turn.is_complete() {
                info!("U-turn complete at {:.2} deg", self.u_turn.accumulated_heading);
                self.u_turn.clear();
                completed = Some(TurnKind::UTurn);
            }
        }

        completed
    }
}

impl Default for TurnManeuverTracker {
    fn default() -> Self {
        Self::new()
    }
}
