//! Control-law evaluation
//!
//! Pure functions from a vehicle, its neighbors (all taken from the same
//! pre-tick snapshot) and the run configuration to an acceleration command.
//! Nothing here mutates simulation state.

use super::blend::{self, BlendDiagnostic, BlendInputs, BlendSignals};
use super::config::{ControlLaw, SimConfig};
use super::profile::VelocityProfile;
use super::types::{wrap_position, ControlMode, VehicleRole};
use super::vehicle::VehicleSnapshot;

/// Gap beyond which the far-field fallback applies is at least this long
pub const LONG_RANGE_MIN: f64 = 50.0;

/// Multiple of the desired gap that triggers the far-field fallback
pub const LONG_RANGE_FACTOR: f64 = 4.0;

/// Everything one evaluation may read
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub vehicle: &'a VehicleSnapshot,
    pub front: Option<&'a VehicleSnapshot>,
    pub back: Option<&'a VehicleSnapshot>,
    pub profile: Option<&'a VelocityProfile>,
    pub stopped: bool,
    /// Simulated time at the start of the tick
    pub time: f64,
    pub step: u64,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub acceleration: f64,
    pub mode: ControlMode,
    pub integration_factor: f64,
    pub diagnostic: Option<BlendDiagnostic>,
}

/// Evaluate the control law for one vehicle
///
/// The result is clamped to [min_a, max_a] and, when configured, jerk limited
/// against the vehicle's previous command.
pub fn decide(ctx: &PolicyContext<'_>, config: &SimConfig) -> Decision {
    let decision = raw_decision(ctx, config);
    let clamped = config.clamp_acceleration(decision.acceleration);
    let limited = limit_jerk(ctx.vehicle.acceleration, clamped, config);
    Decision {
        acceleration: config.clamp_acceleration(limited),
        ..decision
    }
}

fn raw_decision(ctx: &PolicyContext<'_>, config: &SimConfig) -> Decision {
    let vehicle = ctx.vehicle;

    if ctx.stopped {
        let acceleration = stop_acceleration(vehicle.velocity, config);
        return simple(acceleration, ControlMode::Stopped, ctx, config);
    }

    if let Some(profile) = ctx.profile {
        let target = profile.target_velocity(ctx.time);
        let acceleration = (target - vehicle.velocity) / config.dt;
        return simple(acceleration, ControlMode::Lead, ctx, config);
    }

    let front = match (vehicle.role, ctx.front) {
        (VehicleRole::Lead, _) | (_, None) => {
            let acceleration = track_desired(vehicle.velocity, config);
            return simple(acceleration, ControlMode::Lead, ctx, config);
        }
        (_, Some(front)) => front,
    };

    // The tail has no back neighbor of its own to react to
    let back = match (vehicle.role, ctx.back) {
        (VehicleRole::Tail, _) | (_, None) => None,
        (_, Some(back)) => Some(back),
    };

    match (config.law, back) {
        (ControlLaw::Acc, _) | (_, None) => {
            simple(acc_acceleration(vehicle, front, config), ControlMode::Acc, ctx, config)
        }
        (ControlLaw::Bcc, Some(back)) => {
            simple(bcc_acceleration(vehicle, front, back, config), ControlMode::Bcc, ctx, config)
        }
        (ControlLaw::Blended, Some(back)) => blended_decision(ctx, front, back, config),
    }
}

/// Decision for every branch that does not compute its own integration factor
fn simple(
    acceleration: f64,
    mode: ControlMode,
    ctx: &PolicyContext<'_>,
    config: &SimConfig,
) -> Decision {
    let integration_factor = match config.law {
        ControlLaw::Blended => {
            blend::smooth(ctx.vehicle.integration_factor, 0.0, config.blend.smoothing)
        }
        _ => 0.0,
    };
    Decision {
        acceleration,
        mode,
        integration_factor,
        diagnostic: None,
    }
}

/// Desired-velocity tracking: `kc * (v_des - v)`
pub fn track_desired(velocity: f64, config: &SimConfig) -> f64 {
    config.kc * (config.v_des - velocity)
}

/// Brake at min_a, easing off so velocity lands exactly on zero
pub fn stop_acceleration(velocity: f64, config: &SimConfig) -> f64 {
    (-velocity / config.dt).max(config.min_a)
}

/// Gap used by ACC: `(pos - front.pos - own length) mod L`
pub fn acc_gap(vehicle: &VehicleSnapshot, front: &VehicleSnapshot, config: &SimConfig) -> f64 {
    wrap_position(vehicle.position - front.position - vehicle.length, config.road_length)
}

/// Bumper gap to the front neighbor: `(pos - front.pos - front.length) mod L`
pub fn front_gap(vehicle: &VehicleSnapshot, front: &VehicleSnapshot, config: &SimConfig) -> f64 {
    wrap_position(vehicle.position - front.position - front.length, config.road_length)
}

/// Bumper gap to the back neighbor: `(back.pos - pos - own length) mod L`
pub fn back_gap(vehicle: &VehicleSnapshot, back: &VehicleSnapshot, config: &SimConfig) -> f64 {
    wrap_position(back.position - vehicle.position - vehicle.length, config.road_length)
}

fn is_far_field(gap: f64, desired_gap: f64) -> bool {
    gap > (LONG_RANGE_FACTOR * desired_gap).max(LONG_RANGE_MIN)
}

pub fn acc_acceleration(
    vehicle: &VehicleSnapshot,
    front: &VehicleSnapshot,
    config: &SimConfig,
) -> f64 {
    let gap = acc_gap(vehicle, front, config);
    let desired_gap = config.desired_gap(vehicle.velocity);
    if is_far_field(gap, desired_gap) {
        return track_desired(vehicle.velocity, config);
    }
    let rel_v = front.velocity - vehicle.velocity;
    config.kd * (gap - desired_gap) + config.kv * rel_v
}

pub fn bcc_acceleration(
    vehicle: &VehicleSnapshot,
    front: &VehicleSnapshot,
    back: &VehicleSnapshot,
    config: &SimConfig,
) -> f64 {
    let front_gap = front_gap(vehicle, front, config);
    let back_gap = back_gap(vehicle, back, config);
    let desired_gap = config.desired_gap(vehicle.velocity);
    if is_far_field(front_gap, desired_gap) {
        return track_desired(vehicle.velocity, config);
    }
    let gap_term = (front_gap - desired_gap) - (desired_gap - back_gap);
    let velocity_term = (front.velocity - vehicle.velocity) + (back.velocity - vehicle.velocity);
    config.kd * gap_term + config.kv * velocity_term
}

fn blended_decision(
    ctx: &PolicyContext<'_>,
    front: &VehicleSnapshot,
    back: &VehicleSnapshot,
    config: &SimConfig,
) -> Decision {
    let vehicle = ctx.vehicle;
    let front_gap = front_gap(vehicle, front, config);
    let back_gap = back_gap(vehicle, back, config);

    let inputs = BlendInputs {
        length: vehicle.length,
        velocity: vehicle.velocity,
        front_gap,
        front_velocity: front.velocity,
        back_gap,
        back_velocity: back.velocity,
        back_acceleration: back.acceleration,
    };
    let (signals, required_front_gap, required_rear_gap, envelope) =
        BlendSignals::compute(&inputs, config);
    let raw_factor = signals.raw_factor(&config.blend);
    let factor = blend::smooth(vehicle.integration_factor, raw_factor, config.blend.smoothing);

    let desired_gap = config.desired_gap(vehicle.velocity);
    let acceleration = if is_far_field(front_gap, desired_gap) {
        track_desired(vehicle.velocity, config)
    } else {
        config.kd * (front_gap - desired_gap)
            + factor * config.kd * (desired_gap - back_gap)
            + config.kv * (front.velocity - vehicle.velocity)
            + factor * config.kv * (back.velocity - vehicle.velocity)
    };

    Decision {
        acceleration,
        mode: blend::mode_for_factor(factor),
        integration_factor: factor,
        diagnostic: Some(BlendDiagnostic {
            vehicle: vehicle.id,
            step: ctx.step,
            required_front_gap,
            required_rear_gap,
            envelope,
            signals,
            raw_factor,
            integration_factor: factor,
        }),
    }
}

/// Bound the change from `previous` to `next` by `max_jerk * dt`
pub fn limit_jerk(previous: f64, next: f64, config: &SimConfig) -> f64 {
    match config.max_jerk {
        Some(max_jerk) => {
            let max_step = max_jerk * config.dt;
            previous + (next - previous).clamp(-max_step, max_step)
        }
        None => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::BlendTuning;
    use crate::simulation::types::{LaneId, VehicleId};
    use approx::assert_abs_diff_eq;

    fn snapshot(id: usize, role: VehicleRole, position: f64, velocity: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            id: VehicleId(id),
            lane: LaneId(0),
            role,
            length: 5.0,
            position,
            velocity,
            acceleration: 0.0,
            mode: ControlMode::Acc,
            integration_factor: 0.0,
            collided: false,
            energy_used: 0.0,
        }
    }

    fn context<'a>(
        vehicle: &'a VehicleSnapshot,
        front: Option<&'a VehicleSnapshot>,
        back: Option<&'a VehicleSnapshot>,
    ) -> PolicyContext<'a> {
        PolicyContext {
            vehicle,
            front,
            back,
            profile: None,
            stopped: false,
            time: 0.0,
            step: 0,
        }
    }

    #[test]
    fn lone_vehicle_tracks_desired_velocity() {
        let config = SimConfig {
            max_a: 10.0,
            ..SimConfig::default()
        };
        let me = snapshot(0, VehicleRole::Lead, 0.0, 0.0);
        let decision = decide(&context(&me, None, None), &config);
        assert_abs_diff_eq!(decision.acceleration, 6.0);
        assert_eq!(decision.mode, ControlMode::Lead);

        let capped = decide(&context(&me, None, None), &SimConfig::default());
        assert_abs_diff_eq!(capped.acceleration, 3.0);
    }

    #[test]
    fn follower_without_front_falls_back_to_desired_velocity() {
        let config = SimConfig::default();
        let me = snapshot(1, VehicleRole::Follower, 10.0, 15.0);
        let decision = decide(&context(&me, None, None), &config);
        assert_abs_diff_eq!(decision.acceleration, 0.0);
    }

    #[test]
    fn acc_brakes_when_closing_inside_desired_gap() {
        let config = SimConfig::default();
        let front = snapshot(0, VehicleRole::Lead, 100.0, 8.0);
        // gap = 108 - 100 - 5 = 3, desired = 6 + 10 * 0.8 = 14
        let me = snapshot(1, VehicleRole::Follower, 108.0, 10.0);
        let decision = decide(&context(&me, Some(&front), None), &config);
        let expected = 0.8 * (3.0 - 14.0) + 0.4 * (8.0 - 10.0);
        assert!(expected < config.min_a);
        assert_abs_diff_eq!(decision.acceleration, config.min_a);
        assert_eq!(decision.mode, ControlMode::Acc);
    }

    #[test]
    fn acc_small_deficit_is_proportional() {
        let config = SimConfig::default();
        let front = snapshot(0, VehicleRole::Lead, 100.0, 9.5);
        // gap = 118 - 100 - 5 = 13, desired 14
        let me = snapshot(1, VehicleRole::Follower, 118.0, 10.0);
        let decision = decide(&context(&me, Some(&front), None), &config);
        assert_abs_diff_eq!(decision.acceleration, 0.8 * -1.0 + 0.4 * -0.5, epsilon = 1e-12);
        assert!(decision.acceleration < 0.0);
    }

    #[test]
    fn acc_gap_wraps_around_the_loop() {
        let config = SimConfig::default();
        let front = snapshot(0, VehicleRole::Lead, 995.0, 0.0);
        let me = snapshot(1, VehicleRole::Follower, 10.0, 0.0);
        assert_abs_diff_eq!(acc_gap(&me, &front, &config), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn far_field_gap_tracks_desired_velocity() {
        let config = SimConfig::default();
        let front = snapshot(0, VehicleRole::Lead, 0.0, 0.0);
        let me = snapshot(1, VehicleRole::Follower, 300.0, 10.0);
        let decision = decide(&context(&me, Some(&front), None), &config);
        assert_abs_diff_eq!(decision.acceleration, 0.4 * (15.0 - 10.0));
    }

    #[test]
    fn bcc_balances_front_and_back() {
        let config = SimConfig::default();
        let front = snapshot(0, VehicleRole::Lead, 0.0, 10.0);
        let me = snapshot(1, VehicleRole::Follower, 20.0, 10.0);
        let back = snapshot(2, VehicleRole::Tail, 35.0, 10.0);
        let config = SimConfig {
            law: ControlLaw::Bcc,
            ..config
        };
        // front gap 15, back gap 10, desired 14
        let decision = decide(&context(&me, Some(&front), Some(&back)), &config);
        let expected = 0.8 * ((15.0 - 14.0) - (14.0 - 10.0));
        assert_abs_diff_eq!(decision.acceleration, expected, epsilon = 1e-12);
        assert_eq!(decision.mode, ControlMode::Bcc);
    }

    #[test]
    fn tail_uses_acc_under_bcc() {
        let config = SimConfig {
            law: ControlLaw::Bcc,
            ..SimConfig::default()
        };
        let front = snapshot(1, VehicleRole::Follower, 100.0, 10.0);
        let me = snapshot(2, VehicleRole::Tail, 115.0, 10.0);
        let wrapped_lead = snapshot(0, VehicleRole::Lead, 80.0, 10.0);
        let decision = decide(&context(&me, Some(&front), Some(&wrapped_lead)), &config);
        assert_eq!(decision.mode, ControlMode::Acc);
        assert_abs_diff_eq!(decision.acceleration, acc_acceleration(&me, &front, &config));
    }

    #[test]
    fn blended_factor_moves_by_at_most_the_smoothing_step() {
        let config = SimConfig {
            law: ControlLaw::Blended,
            ..SimConfig::default()
        };
        let front = snapshot(0, VehicleRole::Lead, 0.0, 10.0);
        let mut me = snapshot(1, VehicleRole::Follower, 20.0, 10.0);
        me.integration_factor = 0.5;
        let mut back = snapshot(2, VehicleRole::Tail, 26.0, 20.0);
        back.acceleration = -4.0;
        let decision = decide(&context(&me, Some(&front), Some(&back)), &config);
        assert!((0.0..=1.0).contains(&decision.integration_factor));
        assert!((decision.integration_factor - 0.5).abs() <= config.blend.smoothing + 1e-12);
        let diagnostic = decision.diagnostic.unwrap();
        assert_eq!(diagnostic.vehicle, VehicleId(1));
        assert_eq!(diagnostic.integration_factor, decision.integration_factor);
        assert!(diagnostic.envelope > 0.0);
    }

    #[test]
    fn blended_with_zero_factor_matches_acc_on_bumper_gap() {
        let config = SimConfig {
            law: ControlLaw::Blended,
            blend: BlendTuning {
                smoothing: 1.0,
                w_rear_deficit: 0.0,
                w_front_headway: 0.0,
                w_rear_braking: 0.0,
                w_front_closing: 0.0,
                w_rear_closing: 0.0,
                w_density: 0.0,
                ..Default::default()
            },
            ..SimConfig::default()
        };
        let front = snapshot(0, VehicleRole::Lead, 0.0, 12.0);
        let me = snapshot(1, VehicleRole::Follower, 20.0, 10.0);
        let back = snapshot(2, VehicleRole::Tail, 30.0, 11.0);
        let decision = decide(&context(&me, Some(&front), Some(&back)), &config);
        assert_eq!(decision.integration_factor, 0.0);
        assert_eq!(decision.mode, ControlMode::Acc);
        let expected = 0.8 * (15.0 - 14.0) + 0.4 * 2.0;
        assert_abs_diff_eq!(decision.acceleration, expected, epsilon = 1e-12);
    }

    #[test]
    fn stop_flag_brakes_to_standstill() {
        let config = SimConfig::default();
        let me = snapshot(0, VehicleRole::Lead, 0.0, 15.0);
        let mut ctx = context(&me, None, None);
        ctx.stopped = true;
        let decision = decide(&ctx, &config);
        assert_eq!(decision.mode, ControlMode::Stopped);
        assert_abs_diff_eq!(decision.acceleration, config.min_a);

        let slow = snapshot(0, VehicleRole::Lead, 0.0, 0.2);
        let mut ctx = context(&slow, None, None);
        ctx.stopped = true;
        assert_abs_diff_eq!(decide(&ctx, &config).acceleration, -2.0, epsilon = 1e-12);

        let parked = snapshot(0, VehicleRole::Lead, 0.0, 0.0);
        let mut ctx = context(&parked, None, None);
        ctx.stopped = true;
        assert_abs_diff_eq!(decide(&ctx, &config).acceleration, 0.0);
    }

    #[test]
    fn profile_drives_acceleration() {
        let config = SimConfig::default();
        let profile = VelocityProfile::new(vec![(0.0, 0.0), (10.0, 1.0)]).unwrap();
        let me = snapshot(0, VehicleRole::Lead, 0.0, 0.4);
        let mut ctx = context(&me, None, None);
        ctx.profile = Some(&profile);
        ctx.time = 5.0;
        // target 0.5, (0.5 - 0.4) / 0.1 = 1.0
        let decision = decide(&ctx, &config);
        assert_abs_diff_eq!(decision.acceleration, 1.0, epsilon = 1e-9);
        assert_eq!(decision.mode, ControlMode::Lead);
    }

    #[test]
    fn stop_flag_overrides_profile() {
        let config = SimConfig::default();
        let profile = VelocityProfile::new(vec![(0.0, 20.0)]).unwrap();
        let me = snapshot(0, VehicleRole::Lead, 0.0, 10.0);
        let mut ctx = context(&me, None, None);
        ctx.profile = Some(&profile);
        ctx.stopped = true;
        assert_eq!(decide(&ctx, &config).mode, ControlMode::Stopped);
    }

    #[test]
    fn jerk_limit_bounds_the_step() {
        let config = SimConfig {
            max_jerk: Some(10.0),
            ..SimConfig::default()
        };
        let mut me = snapshot(0, VehicleRole::Lead, 0.0, 15.0);
        me.acceleration = 2.0;
        let mut ctx = context(&me, None, None);
        ctx.stopped = true;
        // Wants -5, may only move 1.0 per tick
        assert_abs_diff_eq!(decide(&ctx, &config).acceleration, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn jerk_limit_is_inactive_by_default() {
        let config = SimConfig::default();
        assert_eq!(limit_jerk(2.0, -5.0, &config), -5.0);
    }
}
