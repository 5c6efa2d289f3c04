//! Post-integration overlap detection and resolution
//!
//! Pairs are walked sequentially in position order, so a relocation can
//! change the gap the next pair sees within the same tick. A relocation that
//! carries a vehicle past its lane-mates is followed until the lane is clear.

use log::debug;

use super::config::SimConfig;
use super::roadway::LaneOrder;
use super::types::{circular_distance, wrap_position, LaneId, VehicleId};
use super::vehicle::SimVehicle;

/// One resolved overlap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub lane: LaneId,
    pub leader: VehicleId,
    pub follower: VehicleId,
    /// Circular gap from leader to follower before resolution
    pub gap: f64,
}

/// Post-collision velocities under a 1-D restitution law
///
/// Returns `(leader, follower)`.
pub fn restitution_velocities(leader: f64, follower: f64, restitution: f64) -> (f64, f64) {
    let e = restitution;
    (
        ((1.0 - e) * leader + (1.0 + e) * follower) / 2.0,
        ((1.0 - e) * follower + (1.0 + e) * leader) / 2.0,
    )
}

/// Resolve every overlap in every lane
///
/// `order` supplies lane membership; `vehicles` is indexed by `VehicleId`.
/// Within a lane, consecutive pairs (the last wrapping to the first) overlap
/// when the circular gap from leader to follower is shorter than the
/// follower. The follower is moved to `leader + leader.length + min_gap` and
/// both velocities are exchanged. Passes repeat until a lane is clear.
pub fn resolve_collisions(
    vehicles: &mut [SimVehicle],
    order: &LaneOrder,
    lane_count: usize,
    config: &SimConfig,
) -> Vec<CollisionEvent> {
    let mut events = Vec::new();

    for lane in (0..lane_count).map(LaneId) {
        let mut ids: Vec<VehicleId> = order.lane(lane).collect();
        if ids.len() < 2 {
            continue;
        }

        // Bounded: a lane too crowded for min_gap never clears
        for _ in 0..=ids.len() {
            ids.sort_by(|a, b| vehicles[a.0].position.total_cmp(&vehicles[b.0].position));
            let before = events.len();
            resolve_lane_pass(vehicles, &mut ids, lane, config, &mut events);
            if events.len() == before {
                break;
            }
        }
    }

    events
}

/// One sequential walk over a lane, `ids` sorted by position
///
/// After a relocation the vehicles still to be visited are re-ordered by
/// their distance behind the current leader, and the leader is checked again
/// against whichever vehicle is now directly behind it.
fn resolve_lane_pass(
    vehicles: &mut [SimVehicle],
    ids: &mut [VehicleId],
    lane: LaneId,
    config: &SimConfig,
    events: &mut Vec<CollisionEvent>,
) {
    let count = ids.len();
    let mut i = 0;
    let mut budget = count * count;
    while i < count && budget > 0 {
        budget -= 1;
        let leader_id = ids[i];
        let follower_id = ids[(i + 1) % count];

        let leader = &vehicles[leader_id.0];
        let follower = &vehicles[follower_id.0];
        let gap = circular_distance(leader.position, follower.position, config.road_length);
        if gap >= follower.length {
            i += 1;
            continue;
        }

        let leader_position = leader.position;
        let new_position = wrap_position(
            leader.position + leader.length + config.min_gap,
            config.road_length,
        );
        let (leader_velocity, follower_velocity) =
            restitution_velocities(leader.velocity, follower.velocity, config.restitution);

        debug!(
            "Collision in lane {}: leader {} follower {} gap {:.3}, velocities -> {:.3}/{:.3}",
            lane.0, leader_id, follower_id, gap, leader_velocity, follower_velocity
        );

        let leader = &mut vehicles[leader_id.0];
        leader.velocity = config.clamp_velocity(leader_velocity);
        leader.mark_collision(config.collision_cooldown_ticks);

        let follower = &mut vehicles[follower_id.0];
        follower.position = new_position;
        follower.velocity = config.clamp_velocity(follower_velocity);
        follower.mark_collision(config.collision_cooldown_ticks);

        events.push(CollisionEvent {
            lane,
            leader: leader_id,
            follower: follower_id,
            gap,
        });

        // The seam relocates the first vehicle; the next pass re-sorts
        if i + 1 == count {
            break;
        }

        let road_length = config.road_length;
        ids[i + 1..].sort_by(|a, b| {
            let da = circular_distance(leader_position, vehicles[a.0].position, road_length);
            let db = circular_distance(leader_position, vehicles[b.0].position, road_length);
            da.total_cmp(&db)
        });
        if ids[i + 1] == follower_id {
            i += 1;
        }
    }
}
