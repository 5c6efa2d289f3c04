//! Closed-loop roadway and neighbor lookup
//!
//! The roadway only records lane membership. Position order is derived from a
//! snapshot every tick, so vehicles never hold references to each other.

use ordered_float::OrderedFloat;
use sorted_vec::SortedVec;

use super::types::{wrap_position, LaneId, VehicleId};

/// Front and back lane-mates of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors {
    pub front: Option<VehicleId>,
    pub back: Option<VehicleId>,
}

/// A closed-loop road split into lanes
#[derive(Debug, Clone)]
pub struct SimRoadway {
    road_length: f64,
    /// Unordered membership per lane
    lanes: Vec<Vec<VehicleId>>,
}

impl SimRoadway {
    pub fn new(road_length: f64, lane_count: usize) -> Self {
        Self {
            road_length,
            lanes: vec![Vec::new(); lane_count],
        }
    }

    pub fn road_length(&self) -> f64 {
        self.road_length
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Register a vehicle in a lane
    pub fn enter_lane(&mut self, lane: LaneId, vehicle: VehicleId) {
        if let Some(members) = self.lanes.get_mut(lane.0) {
            if !members.contains(&vehicle) {
                members.push(vehicle);
            }
        }
    }

    pub fn members(&self, lane: LaneId) -> &[VehicleId] {
        self.lanes.get(lane.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Build the position-ordered view of every lane from `positions`
    ///
    /// `positions` is indexed by `VehicleId`.
    pub fn order(&self, positions: &[f64]) -> LaneOrder {
        let lanes = self
            .lanes
            .iter()
            .map(|members| {
                SortedVec::from_unsorted(
                    members
                        .iter()
                        .map(|id| (OrderedFloat(positions[id.0]), *id))
                        .collect(),
                )
            })
            .collect();

        LaneOrder {
            road_length: self.road_length,
            lanes,
        }
    }
}

/// Per-lane vehicles sorted by ascending position
#[derive(Debug, Clone)]
pub struct LaneOrder {
    road_length: f64,
    lanes: Vec<SortedVec<(OrderedFloat<f64>, VehicleId)>>,
}

impl LaneOrder {
    /// Vehicle ids of a lane in ascending position order
    pub fn lane(&self, lane: LaneId) -> impl Iterator<Item = VehicleId> + '_ {
        self.lanes
            .get(lane.0)
            .into_iter()
            .flat_map(|sorted| sorted.iter().map(|(_, id)| *id))
    }

    pub fn lane_len(&self, lane: LaneId) -> usize {
        self.lanes.get(lane.0).map_or(0, |sorted| sorted.len())
    }

    /// Front and back neighbors of a vehicle at `position` in `lane`
    ///
    /// The front neighbor minimizes the strictly positive circular gap
    /// `(position - other) mod L`; the back neighbor minimizes
    /// `(other - position) mod L`. Lane-mates at the same position are never
    /// selected. A lane with fewer than two members yields no neighbors.
    pub fn neighbors(&self, lane: LaneId, id: VehicleId, position: f64) -> Neighbors {
        let Some(sorted) = self.lanes.get(lane.0) else {
            return Neighbors::default();
        };
        if sorted.len() < 2 {
            return Neighbors::default();
        }

        let mut front: Option<(f64, VehicleId)> = None;
        let mut back: Option<(f64, VehicleId)> = None;

        // Closest strictly lower position, or the highest one when wrapping
        let below = sorted.partition_point(|(p, _)| p.0 < position);
        let front_candidates = sorted[..below].iter().rev().chain(sorted[below..].iter().rev());
        for (other_position, other_id) in front_candidates {
            if *other_id == id {
                continue;
            }
            let gap = self.positive_gap(position, other_position.0);
            if gap.is_finite() {
                front = Some((gap, *other_id));
                break;
            }
        }

        // Closest strictly higher position, or the lowest one when wrapping
        let above = sorted.partition_point(|(p, _)| p.0 <= position);
        let back_candidates = sorted[above..].iter().chain(sorted[..above].iter());
        for (other_position, other_id) in back_candidates {
            if *other_id == id {
                continue;
            }
            let gap = self.positive_gap(other_position.0, position);
            if gap.is_finite() {
                back = Some((gap, *other_id));
                break;
            }
        }

        Neighbors {
            front: front.map(|(_, id)| id),
            back: back.map(|(_, id)| id),
        }
    }

    /// `(from - to) mod L`, with non-positive values mapped to infinity
    fn positive_gap(&self, from: f64, to: f64) -> f64 {
        let gap = wrap_position(from - to, self.road_length);
        if gap > 0.0 {
            gap
        } else {
            f64::INFINITY
        }
    }
}
