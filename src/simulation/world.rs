//! Main simulation world that ties everything together
//!
//! Owns the vehicles, the roadway and the run configuration, and drives one
//! fixed-Δt tick at a time: evaluate every policy against a pre-tick snapshot,
//! integrate every vehicle, count down collision indicators, resolve overlaps
//! and advance the step counter.

use log::{info, trace, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::blend::BlendDiagnostic;
use super::collision::resolve_collisions;
use super::config::{ConfigError, SimConfig};
use super::lane_change::{self, LaneChangeRecord};
use super::policy::{self, Decision, PolicyContext};
use super::profile::VelocityProfile;
use super::roadway::{LaneOrder, SimRoadway};
use super::stats::GapStats;
use super::types::{wrap_position, LaneId, VehicleId, VehicleRole};
use super::vehicle::{SimVehicle, VehicleSnapshot};

/// Errors raised by the world
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("vehicle {0} does not exist")]
    UnknownVehicle(VehicleId),
    #[error("lane {0} does not exist")]
    UnknownLane(usize),
    #[error("vehicle {0} has a non-finite state")]
    NonFiniteState(VehicleId),
}

type BlendHook = Box<dyn FnMut(&BlendDiagnostic)>;

/// The main simulation world
pub struct SimWorld {
    /// Validated, read-only run parameters
    config: SimConfig,

    /// Lane membership on the closed loop
    roadway: SimRoadway,

    /// All vehicles, indexed by `VehicleId`
    vehicles: Vec<SimVehicle>,

    /// Active velocity profiles
    profiles: HashMap<VehicleId, VelocityProfile>,

    /// Vehicles whose stop flag is asserted
    stopped: HashSet<VehicleId>,

    /// Ticks completed
    step: u64,

    gap_stats: GapStats,

    lane_change_log: Vec<LaneChangeRecord>,

    collision_count: usize,

    blend_hook: Option<BlendHook>,
}

impl SimWorld {
    /// Validate `config` and lay out the initial arrangement
    ///
    /// Vehicle `i` joins lane `i % lane_count` at slot `i / lane_count`, one
    /// slot spacing apart. The first vehicle of each lane leads it and the
    /// last one (when there are at least two) is its tail.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let lane_count = config.lane_count;
        let mut roadway = SimRoadway::new(config.road_length, lane_count);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let spacing = config.slot_spacing();

        let lane_sizes: Vec<usize> = (0..lane_count)
            .map(|lane| (config.vehicle_count + lane_count - 1 - lane) / lane_count)
            .collect();

        let mut vehicles = Vec::with_capacity(config.vehicle_count);
        for i in 0..config.vehicle_count {
            let id = VehicleId(i);
            let lane = LaneId(i % lane_count);
            let slot = i / lane_count;
            let lane_size = lane_sizes[lane.0];

            let role = if slot == 0 {
                VehicleRole::Lead
            } else if slot + 1 == lane_size {
                VehicleRole::Tail
            } else {
                VehicleRole::Follower
            };

            let mut velocity = config.initial_velocity;
            if config.initial_speed_jitter > 0.0 {
                let jitter = config.initial_speed_jitter;
                velocity += rng.random_range(-jitter..=jitter);
            }

            let position = wrap_position(slot as f64 * spacing, config.road_length);
            roadway.enter_lane(lane, id);
            vehicles.push(SimVehicle::new(
                id,
                lane,
                role,
                config.vehicle_length,
                position,
                config.clamp_velocity(velocity),
                config.record_history,
            ));
        }

        info!(
            "Initialized {} vehicles in {} lane(s) on a {:.0} m loop under {}",
            vehicles.len(),
            lane_count,
            config.road_length,
            config.law
        );

        Ok(Self {
            config,
            roadway,
            vehicles,
            profiles: HashMap::new(),
            stopped: HashSet::new(),
            step: 0,
            gap_stats: GapStats::new(),
            lane_change_log: Vec::new(),
            collision_count: 0,
            blend_hook: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn roadway(&self) -> &SimRoadway {
        &self.roadway
    }

    /// Ticks completed so far
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Simulated time, rounded to the millisecond
    pub fn time(&self) -> f64 {
        (self.step as f64 * self.config.dt * 1000.0).round() / 1000.0
    }

    pub fn vehicles(&self) -> &[SimVehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.get(id.0)
    }

    /// Observable state of every vehicle, indexed by `VehicleId`
    pub fn snapshot(&self) -> Vec<VehicleSnapshot> {
        self.vehicles.iter().map(SimVehicle::snapshot).collect()
    }

    /// Lead vehicle of every non-empty lane
    pub fn lead_ids(&self) -> Vec<VehicleId> {
        self.vehicles
            .iter()
            .filter(|v| v.role == VehicleRole::Lead)
            .map(|v| v.id)
            .collect()
    }

    pub fn gap_stats(&self) -> &GapStats {
        &self.gap_stats
    }

    pub fn lane_change_log(&self) -> &[LaneChangeRecord] {
        &self.lane_change_log
    }

    /// Overlaps resolved since initialization
    pub fn collision_count(&self) -> usize {
        self.collision_count
    }

    /// Energy used by the whole fleet, kWh
    pub fn total_energy_kwh(&self) -> f64 {
        self.vehicles.iter().map(|v| v.energy_used).sum()
    }

    fn check_vehicle(&self, id: VehicleId) -> Result<(), SimError> {
        if id.0 < self.vehicles.len() {
            Ok(())
        } else {
            Err(SimError::UnknownVehicle(id))
        }
    }

    /// Install a velocity profile on a vehicle
    ///
    /// A malformed profile is not fatal: it is logged, any previous profile is
    /// dropped, and the vehicle falls back to its control law. Returns whether
    /// the profile was accepted.
    pub fn set_velocity_profile(
        &mut self,
        id: VehicleId,
        points: Vec<(f64, f64)>,
    ) -> Result<bool, SimError> {
        self.check_vehicle(id)?;
        match VelocityProfile::new(points) {
            Ok(profile) => {
                self.profiles.insert(id, profile);
                Ok(true)
            }
            Err(e) => {
                warn!("Ignoring velocity profile for vehicle {}: {}", id, e);
                self.profiles.remove(&id);
                Ok(false)
            }
        }
    }

    pub fn clear_velocity_profile(&mut self, id: VehicleId) -> Result<(), SimError> {
        self.check_vehicle(id)?;
        self.profiles.remove(&id);
        Ok(())
    }

    /// Assert or release the stop flag of a vehicle
    pub fn set_stop(&mut self, id: VehicleId, stop: bool) -> Result<(), SimError> {
        self.check_vehicle(id)?;
        if stop {
            self.stopped.insert(id);
        } else {
            self.stopped.remove(&id);
        }
        Ok(())
    }

    /// Assert or release the stop flag of every lane's lead
    pub fn set_lead_stop(&mut self, stop: bool) {
        for id in self.lead_ids() {
            if stop {
                self.stopped.insert(id);
            } else {
                self.stopped.remove(&id);
            }
        }
    }

    pub fn is_stopped(&self, id: VehicleId) -> bool {
        self.stopped.contains(&id)
    }

    /// Receive every blended-policy diagnostic as it is produced
    pub fn set_blend_hook(&mut self, hook: impl FnMut(&BlendDiagnostic) + 'static) {
        self.blend_hook = Some(Box::new(hook));
    }

    pub fn clear_blend_hook(&mut self) {
        self.blend_hook = None;
    }

    /// Evaluate whether a vehicle could move into `target` right now
    ///
    /// The record is appended to the lane-change log; the vehicle stays put.
    pub fn evaluate_lane_change(
        &mut self,
        id: VehicleId,
        target: LaneId,
    ) -> Result<LaneChangeRecord, SimError> {
        self.check_vehicle(id)?;
        if target.0 >= self.roadway.lane_count() {
            return Err(SimError::UnknownLane(target.0));
        }
        let snapshots = self.snapshot();
        let order = self.lane_order();
        let record = lane_change::evaluate(
            &snapshots[id.0],
            target,
            &snapshots,
            &order,
            self.step,
            &self.config,
        );
        self.lane_change_log.push(record);
        Ok(record)
    }

    fn lane_order(&self) -> LaneOrder {
        let positions: Vec<f64> = self.vehicles.iter().map(|v| v.position).collect();
        self.roadway.order(&positions)
    }

    /// Advance the simulation by one tick of `config.dt`
    ///
    /// Fails without touching any state if a vehicle's state is not finite.
    pub fn tick(&mut self) -> Result<(), SimError> {
        if let Some(bad) = self
            .vehicles
            .iter()
            .find(|v| {
                !(v.position.is_finite() && v.velocity.is_finite() && v.acceleration.is_finite())
            })
        {
            return Err(SimError::NonFiniteState(bad.id));
        }

        // Policies only ever see this snapshot
        let snapshots = self.snapshot();
        let order = self.lane_order();
        let decisions = self.decide_all(&snapshots, &order);

        for (vehicle, decision) in self.vehicles.iter_mut().zip(&decisions) {
            vehicle.acceleration = decision.acceleration;
            vehicle.mode = decision.mode;
            vehicle.integration_factor = decision.integration_factor;
        }
        for diagnostic in decisions.iter().filter_map(|d| d.diagnostic.as_ref()) {
            trace!("Blend diagnostic: {:?}", diagnostic);
            if let Some(hook) = &mut self.blend_hook {
                hook(diagnostic);
            }
        }

        let dt = self.config.dt;
        for vehicle in &mut self.vehicles {
            vehicle.integrate(dt, &self.config);
            vehicle.velocity = self.config.clamp_velocity(vehicle.velocity);
        }

        for vehicle in &mut self.vehicles {
            vehicle.tick_cooldown();
        }

        let order = self.lane_order();
        let lane_count = self.roadway.lane_count();
        let events = resolve_collisions(&mut self.vehicles, &order, lane_count, &self.config);
        self.collision_count += events.len();

        self.step += 1;

        for vehicle in &mut self.vehicles {
            vehicle.record();
        }
        self.record_gaps();

        Ok(())
    }

    /// Run `ticks` ticks, stopping at the first error
    pub fn run(&mut self, ticks: u64) -> Result<(), SimError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    fn decide_all(&self, snapshots: &[VehicleSnapshot], order: &LaneOrder) -> Vec<Decision> {
        let time = self.time();
        snapshots
            .iter()
            .map(|vehicle| {
                let neighbors = order.neighbors(vehicle.lane, vehicle.id, vehicle.position);
                let ctx = PolicyContext {
                    vehicle,
                    front: neighbors.front.map(|id| &snapshots[id.0]),
                    back: neighbors.back.map(|id| &snapshots[id.0]),
                    profile: self.profiles.get(&vehicle.id),
                    stopped: self.stopped.contains(&vehicle.id),
                    time,
                    step: self.step,
                };
                policy::decide(&ctx, &self.config)
            })
            .collect()
    }

    /// One gap sample per following vehicle, using the ACC gap
    fn record_gaps(&mut self) {
        let snapshots = self.snapshot();
        let order = self.lane_order();
        for vehicle in snapshots.iter().filter(|v| v.role != VehicleRole::Lead) {
            let neighbors = order.neighbors(vehicle.lane, vehicle.id, vehicle.position);
            if let Some(front) = neighbors.front {
                let gap = policy::acc_gap(vehicle, &snapshots[front.0], &self.config);
                self.gap_stats.record(gap);
            }
        }
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Platoon Simulation Summary ({}) ===", self.config.law);
        println!("Time: {:.2}s (step {})", self.time(), self.step);
        println!(
            "Vehicles: {}, Lanes: {}, Road: {:.0} m",
            self.vehicles.len(),
            self.roadway.lane_count(),
            self.roadway.road_length()
        );
        println!("Total energy: {:.4} kWh", self.total_energy_kwh());
        println!("Collisions resolved: {}", self.collision_count);
        match (self.gap_stats.min(), self.gap_stats.max(), self.gap_stats.mean()) {
            (Some(min), Some(max), Some(mean)) => {
                println!("Gaps: min={:.2} max={:.2} mean={:.2} m", min, max, mean)
            }
            _ => println!("Gaps: no samples"),
        }

        println!("--- Vehicles ---");
        for vehicle in &self.vehicles {
            println!(
                "  Vehicle {} lane {} [{}]: pos={:.1} v={:.2} a={:.2} iF={:.2} E={:.4} kWh{}",
                vehicle.id,
                vehicle.lane.0,
                vehicle.mode.label(),
                vehicle.position,
                vehicle.velocity,
                vehicle.acceleration,
                vehicle.integration_factor,
                vehicle.energy_used,
                if vehicle.collided { " (collided)" } else { "" }
            );
        }
    }
}
