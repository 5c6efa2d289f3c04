//! Standalone platoon simulation module
//!
//! This module contains the longitudinal control laws, the circular multi-lane
//! roadway and the fixed-step world that drives them. It runs headless and is
//! exercised entirely through `SimWorld`.

mod blend;
mod collision;
mod config;
mod lane_change;
mod policy;
mod profile;
mod roadway;
mod stats;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
pub use blend::{
    mode_for_factor, rear_braking_indicator, required_front_gap, required_gap, required_rear_gap,
    safety_envelope, smooth, BlendDiagnostic, BlendInputs, BlendSignals,
};
pub use collision::{resolve_collisions, restitution_velocities, CollisionEvent};
pub use config::{BlendTuning, ConfigError, ControlLaw, SimConfig};
pub use lane_change::LaneChangeRecord;
pub use policy::{
    acc_acceleration, acc_gap, back_gap, bcc_acceleration, decide, front_gap, limit_jerk,
    stop_acceleration, track_desired, Decision, PolicyContext, LONG_RANGE_FACTOR, LONG_RANGE_MIN,
};
pub use profile::{ProfileError, VelocityProfile};
pub use roadway::{LaneOrder, Neighbors, SimRoadway};
pub use stats::GapStats;
pub use types::{
    circular_distance, wrap_position, ControlMode, LaneId, VehicleId, VehicleRole, GRAVITY,
    JOULES_PER_KWH,
};
pub use vehicle::{energy_increment, SimVehicle, VehicleHistory, VehicleSnapshot};
pub use world::{SimError, SimWorld};
