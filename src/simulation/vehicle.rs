//! Vehicle kinematics and energy accounting
//!
//! Standalone point-mass model; no knowledge of neighbors or control laws.

use super::config::SimConfig;
use super::types::{
    wrap_position, ControlMode, LaneId, VehicleId, VehicleRole, GRAVITY, JOULES_PER_KWH,
};

/// Time series recorded for plotting collaborators
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleHistory {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

impl VehicleHistory {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Read-only copy of a vehicle's observable state
///
/// Policies read these from the pre-tick snapshot; collaborators read them as
/// per-tick output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub lane: LaneId,
    pub role: VehicleRole,
    pub length: f64,
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub mode: ControlMode,
    pub integration_factor: f64,
    pub collided: bool,
    pub energy_used: f64,
}

/// A vehicle in the platoon simulation
///
/// Every field is present from creation and explicitly assigned every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub lane: LaneId,
    pub role: VehicleRole,
    pub length: f64,
    /// Position on the loop, in [0, road_length); progress decreases it
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub mode: ControlMode,
    /// Blended-policy integration factor, zero under other laws
    pub integration_factor: f64,
    /// Cosmetic collision indicator
    pub collided: bool,
    /// Ticks left before `collided` reverts
    pub collision_cooldown: u32,
    /// Cumulative traction energy, kWh
    pub energy_used: f64,
    pub history: Option<VehicleHistory>,
}

impl SimVehicle {
    pub fn new(
        id: VehicleId,
        lane: LaneId,
        role: VehicleRole,
        length: f64,
        position: f64,
        velocity: f64,
        record_history: bool,
    ) -> Self {
        Self {
            id,
            lane,
            role,
            length,
            position,
            velocity,
            acceleration: 0.0,
            mode: match role {
                VehicleRole::Lead => ControlMode::Lead,
                _ => ControlMode::Acc,
            },
            integration_factor: 0.0,
            collided: false,
            collision_cooldown: 0,
            energy_used: 0.0,
            history: record_history.then(VehicleHistory::default),
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            lane: self.lane,
            role: self.role,
            length: self.length,
            position: self.position,
            velocity: self.velocity,
            acceleration: self.acceleration,
            mode: self.mode,
            integration_factor: self.integration_factor,
            collided: self.collided,
            energy_used: self.energy_used,
        }
    }

    /// Advance kinematics and energy by one step of `dt`
    ///
    /// Position moves by `v*dt - 0.5*a*dt^2` in the decreasing direction and
    /// wraps both ways. Velocity is floored at zero here; the caller applies
    /// the configured velocity bounds afterwards.
    pub fn integrate(&mut self, dt: f64, config: &SimConfig) {
        let displacement = self.velocity * dt - 0.5 * self.acceleration * dt * dt;
        self.position = wrap_position(self.position - displacement, config.road_length);

        self.velocity = (self.velocity + self.acceleration * dt).max(0.0);

        let increment = energy_increment(self.acceleration, self.velocity, dt, config);
        // Regenerative (negative) power is discarded
        if increment > 0.0 {
            self.energy_used += increment;
        }
    }

    /// Count down the collision indicator
    pub fn tick_cooldown(&mut self) {
        if self.collision_cooldown > 0 {
            self.collision_cooldown -= 1;
            if self.collision_cooldown == 0 {
                self.collided = false;
            }
        }
    }

    /// Set the collision indicator for `ticks` ticks
    pub fn mark_collision(&mut self, ticks: u32) {
        self.collided = ticks > 0;
        self.collision_cooldown = ticks;
    }

    pub fn record(&mut self) {
        if let Some(history) = &mut self.history {
            history.positions.push(self.position);
            history.velocities.push(self.velocity);
            history.accelerations.push(self.acceleration);
        }
    }
}

/// Traction energy in kWh over `dt` for a lumped point mass
pub fn energy_increment(acceleration: f64, velocity: f64, dt: f64, config: &SimConfig) -> f64 {
    let inertia = config.mass * acceleration;
    let rolling = config.rolling_coefficient * config.mass * GRAVITY;
    let drag = 0.5
        * config.drag_coefficient
        * config.air_density
        * config.frontal_area
        * velocity
        * velocity;
    let power = (inertia + rolling + drag) * velocity;
    power * dt / JOULES_PER_KWH
}
