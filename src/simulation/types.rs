//! Core types for the platoon simulation
//!
//! Identifiers, tags and small geometric helpers shared by every component.

use std::fmt;

/// A unique identifier for a vehicle
/// Index into the world's flat vehicle collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub usize);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lane index on the roadway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId(pub usize);

/// Which control law a vehicle applied on the last tick
///
/// Diagnostic only: the tag never feeds back into control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMode {
    Lead,
    Acc,
    Bcc,
    Integrated,
    Stopped,
}

impl ControlMode {
    /// One-letter label used by the text summary
    pub fn label(&self) -> &'static str {
        match self {
            ControlMode::Lead => "L",
            ControlMode::Acc => "A",
            ControlMode::Bcc => "B",
            ControlMode::Integrated => "I",
            ControlMode::Stopped => "S",
        }
    }
}

/// Fixed role assigned at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleRole {
    /// First vehicle of a lane, tracks the desired velocity or a profile
    Lead,
    /// Any vehicle between the lead and the tail
    Follower,
    /// Last vehicle of a lane, always follows with ACC
    Tail,
}

/// Acceleration of gravity in m/s^2
pub const GRAVITY: f64 = 9.8;

/// Joules per kilowatt-hour
pub const JOULES_PER_KWH: f64 = 3.6e6;

/// Wrap a position into [0, road_length)
///
/// `rem_euclid` can round a tiny negative value up to exactly `road_length`,
/// which is folded back to zero.
pub fn wrap_position(position: f64, road_length: f64) -> f64 {
    let wrapped = position.rem_euclid(road_length);
    if wrapped >= road_length {
        0.0
    } else {
        wrapped
    }
}

/// Circular distance from `from` to `to`, in [0, road_length)
pub fn circular_distance(from: f64, to: f64, road_length: f64) -> f64 {
    wrap_position(to - from, road_length)
}
