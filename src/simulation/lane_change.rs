//! Lane-change feasibility evaluation
//!
//! Evaluation only: the record is a diagnostic side-channel and the vehicle
//! keeps its lane.

use super::blend::{required_front_gap, required_rear_gap};
use super::config::SimConfig;
use super::roadway::LaneOrder;
use super::types::{wrap_position, LaneId, VehicleId};
use super::vehicle::VehicleSnapshot;

/// One feasibility evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneChangeRecord {
    pub vehicle: VehicleId,
    pub from_lane: LaneId,
    pub to_lane: LaneId,
    pub step: u64,
    pub required_front_gap: f64,
    pub required_rear_gap: f64,
    /// Front requirement + own length + rear requirement
    pub required_total_gap: f64,
    /// Infinite when the target lane has no vehicle ahead
    pub available_front_gap: f64,
    /// Infinite when the target lane has no vehicle behind
    pub available_rear_gap: f64,
    pub feasible: bool,
}

/// Check whether `vehicle` could slot into `target` at its current position
///
/// `snapshots` is indexed by `VehicleId`; `order` is the current lane order.
pub fn evaluate(
    vehicle: &VehicleSnapshot,
    target: LaneId,
    snapshots: &[VehicleSnapshot],
    order: &LaneOrder,
    step: u64,
    config: &SimConfig,
) -> LaneChangeRecord {
    let road_length = config.road_length;
    let mut front: Option<(f64, &VehicleSnapshot)> = None;
    let mut back: Option<(f64, &VehicleSnapshot)> = None;
    for other in order.lane(target).map(|id| &snapshots[id.0]) {
        if other.id == vehicle.id {
            continue;
        }
        // Signed bumper gaps; negative means the bodies already overlap
        let ahead_by = wrap_position(vehicle.position - other.position, road_length);
        if ahead_by <= road_length / 2.0 {
            let gap = ahead_by - other.length;
            if front.map_or(true, |(best, _)| gap < best) {
                front = Some((gap, other));
            }
        } else {
            let gap = road_length - ahead_by - vehicle.length;
            if back.map_or(true, |(best, _)| gap < best) {
                back = Some((gap, other));
            }
        }
    }

    let required_front = front.map_or(0.0, |(_, f)| {
        required_front_gap(vehicle.velocity, f.velocity, config)
    });
    let required_rear = back.map_or(0.0, |(_, b)| {
        required_rear_gap(b.velocity, vehicle.velocity, config)
    });
    let available_front = front.map_or(f64::INFINITY, |(gap, _)| gap);
    let available_rear = back.map_or(f64::INFINITY, |(gap, _)| gap);

    LaneChangeRecord {
        vehicle: vehicle.id,
        from_lane: vehicle.lane,
        to_lane: target,
        step,
        required_front_gap: required_front,
        required_rear_gap: required_rear,
        required_total_gap: required_front + vehicle.length + required_rear,
        available_front_gap: available_front,
        available_rear_gap: available_rear,
        feasible: available_front >= required_front && available_rear >= required_rear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::roadway::SimRoadway;
    use crate::simulation::types::{ControlMode, VehicleRole};

    fn snapshot(id: usize, lane: usize, position: f64, velocity: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            id: VehicleId(id),
            lane: LaneId(lane),
            role: VehicleRole::Lead,
            length: 5.0,
            position,
            velocity,
            acceleration: 0.0,
            mode: ControlMode::Lead,
            integration_factor: 0.0,
            collided: false,
            energy_used: 0.0,
        }
    }

    fn setup(snapshots: &[VehicleSnapshot]) -> LaneOrder {
        let mut roadway = SimRoadway::new(1000.0, 2);
        for s in snapshots {
            roadway.enter_lane(s.lane, s.id);
        }
        let positions: Vec<f64> = snapshots.iter().map(|s| s.position).collect();
        roadway.order(&positions)
    }

    #[test]
    fn empty_target_lane_is_feasible() {
        let config = SimConfig::default();
        let snapshots = [snapshot(0, 0, 100.0, 10.0)];
        let order = setup(&snapshots);
        let record = evaluate(&snapshots[0], LaneId(1), &snapshots, &order, 0, &config);
        assert!(record.feasible);
        assert!(record.available_front_gap.is_infinite());
        assert!(record.available_rear_gap.is_infinite());
        assert_eq!(record.required_total_gap, 5.0);
    }

    #[test]
    fn wide_gap_is_feasible() {
        let config = SimConfig::default();
        let snapshots = [
            snapshot(0, 0, 100.0, 10.0),
            snapshot(1, 1, 50.0, 10.0),
            snapshot(2, 1, 150.0, 10.0),
        ];
        let order = setup(&snapshots);
        let record = evaluate(&snapshots[0], LaneId(1), &snapshots, &order, 3, &config);
        assert_eq!(record.available_front_gap, 45.0);
        assert_eq!(record.available_rear_gap, 45.0);
        // 10 * 0.8 + 6 on both sides
        assert_eq!(record.required_front_gap, 14.0);
        assert_eq!(record.required_rear_gap, 14.0);
        assert_eq!(record.required_total_gap, 33.0);
        assert_eq!(record.step, 3);
        assert!(record.feasible);
    }

    #[test]
    fn overlapping_slot_is_infeasible() {
        let config = SimConfig::default();
        let snapshots = [snapshot(0, 0, 100.0, 10.0), snapshot(1, 1, 102.0, 10.0)];
        let order = setup(&snapshots);
        let record = evaluate(&snapshots[0], LaneId(1), &snapshots, &order, 0, &config);
        assert!(record.available_rear_gap < 0.0);
        assert!(!record.feasible);
    }
}
