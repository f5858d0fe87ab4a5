// THEORY:
// Steering is a pure function of where the object sits horizontally. Two
// thresholds split the frame into three bands; the band between them is the
// dead-band where no correction is needed. Each frame is decided on its own:
// there is no smoothing or hysteresis, so an object parked on a threshold can
// flip between zones from one frame to the next.
//
// The car is driven by a small HTTP firmware. Every command it understands is
// a path fragment plus a hold-duration telling it how long to act:
//   move?command=<forward|backward|left|right>[&mode2=1]&duration=<ms>
//   speed?speed=<0..1023>&duration=<ms>

use std::fmt;

/// Which band of the frame the tracked object is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SteeringZone {
    /// Left of the dead-band.
    Left,
    /// Right of the dead-band.
    Right,
    /// Inside the dead-band (boundaries included).
    Straight,
    /// Nothing was detected this frame.
    None,
}

/// Decides the zone from the object's horizontal position.
pub fn decide(centroid_x: i32, left_range: i32, right_range: i32) -> SteeringZone {
    if centroid_x > right_range {
        SteeringZone::Right
    } else if centroid_x < left_range {
        SteeringZone::Left
    } else {
        SteeringZone::Straight
    }
}

/// Drive directions understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// What the actuator is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Drive in a direction. `tracking` selects the firmware's secondary turn mode,
    /// which is what turns issued by the tracker use.
    Move { direction: Direction, tracking: bool },
    /// Set motor speed (PWM duty, 0..=1023).
    Speed(u16),
}

/// A command and how long the actuator should act on it before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActuatorCommand {
    pub kind: CommandKind,
    /// Hold-duration in milliseconds.
    pub duration_ms: u32,
}

impl ActuatorCommand {
    pub fn manual(direction: Direction, duration_ms: u32) -> Self {
        Self {
            kind: CommandKind::Move {
                direction,
                tracking: false,
            },
            duration_ms,
        }
    }

    pub fn speed(speed: u16, duration_ms: u32) -> Self {
        Self {
            kind: CommandKind::Speed(speed),
            duration_ms,
        }
    }

    /// The correction for a zone. The tracked object drifting to one side of the
    /// view is answered by turning the car the other way; the dead-band drives
    /// straight on. `None` yields no command.
    pub fn for_zone(zone: SteeringZone, duration_ms: u32) -> Option<Self> {
        let kind = match zone {
            SteeringZone::Right => CommandKind::Move {
                direction: Direction::Left,
                tracking: true,
            },
            SteeringZone::Left => CommandKind::Move {
                direction: Direction::Right,
                tracking: true,
            },
            SteeringZone::Straight => CommandKind::Move {
                direction: Direction::Forward,
                tracking: false,
            },
            SteeringZone::None => return None,
        };
        Some(Self { kind, duration_ms })
    }

    /// Path and query relative to the actuator base URL, including the duration.
    pub fn path(&self) -> String {
        let command = match self.kind {
            CommandKind::Move {
                direction,
                tracking: true,
            } => format!("move?command={}&mode2=1", direction.as_str()),
            CommandKind::Move {
                direction,
                tracking: false,
            } => format!("move?command={}", direction.as_str()),
            CommandKind::Speed(speed) => format!("speed?speed={speed}"),
        };
        format!("{command}&duration={}", self.duration_ms)
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_matches_threshold_rules() {
        let (left, right) = (240, 400);
        for x in 0..=640 {
            let expected = if x < left {
                SteeringZone::Left
            } else if x > right {
                SteeringZone::Right
            } else {
                SteeringZone::Straight
            };
            assert_eq!(decide(x, left, right), expected, "x = {x}");
        }
    }

    #[test]
    fn dead_band_edges_are_straight() {
        assert_eq!(decide(240, 240, 400), SteeringZone::Straight);
        assert_eq!(decide(400, 240, 400), SteeringZone::Straight);
        assert_eq!(decide(239, 240, 400), SteeringZone::Left);
        assert_eq!(decide(401, 240, 400), SteeringZone::Right);
    }

    #[test]
    fn zone_commands_counter_steer() {
        let for_zone = ActuatorCommand::for_zone;
        let right = for_zone(SteeringZone::Right, 40).unwrap();
        assert_eq!(right.path(), "move?command=left&mode2=1&duration=40");
        let left = for_zone(SteeringZone::Left, 40).unwrap();
        assert_eq!(left.path(), "move?command=right&mode2=1&duration=40");
        let straight = for_zone(SteeringZone::Straight, 55).unwrap();
        assert_eq!(straight.path(), "move?command=forward&duration=55");
        assert!(for_zone(SteeringZone::None, 40).is_none());
    }

    #[test]
    fn manual_and_speed_paths() {
        assert_eq!(
            ActuatorCommand::manual(Direction::Backward, 40).path(),
            "move?command=backward&duration=40"
        );
        assert_eq!(
            ActuatorCommand::speed(700, 20).path(),
            "speed?speed=700&duration=20"
        );
    }
}
