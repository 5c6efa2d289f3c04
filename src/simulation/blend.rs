//! Safety envelope and integration factor of the blended (ACC+BCC) policy
//!
//! The integration factor weighs how much the rear neighbor influences a
//! vehicle. It is a weighted mean of six normalized signals, clamped to
//! [0, 1] and low-pass filtered across ticks.

use super::config::{BlendTuning, SimConfig};
use super::types::{ControlMode, VehicleId};

/// Smallest length used as a denominator
pub const LENGTH_FLOOR: f64 = 0.1;

/// Smallest speed used as a denominator
pub const SPEED_FLOOR: f64 = 0.1;

/// Smallest assumed deceleration
const DECEL_FLOOR: f64 = 0.1;

/// Gap a follower needs behind a leader to stop safely
///
/// `follower_speed * reaction_time + closing^2 / (2 * decel) + buffer`, where
/// closing is the non-negative speed difference.
pub fn required_gap(follower_speed: f64, leader_speed: f64, decel: f64, config: &SimConfig) -> f64 {
    let closing = (follower_speed - leader_speed).max(0.0);
    let decel = decel.max(DECEL_FLOOR);
    follower_speed * config.reaction_time + closing * closing / (2.0 * decel) + config.min_dis
}

/// Gap this vehicle needs to its front neighbor, braking at |min_a|
pub fn required_front_gap(own_speed: f64, front_speed: f64, config: &SimConfig) -> f64 {
    required_gap(own_speed, front_speed, config.min_a.abs(), config)
}

/// Gap the rear neighbor needs to this vehicle, braking at a fraction of |min_a|
pub fn required_rear_gap(back_speed: f64, own_speed: f64, config: &SimConfig) -> f64 {
    let decel = config.min_a.abs() * config.blend.rear_decel_fraction;
    required_gap(back_speed, own_speed, decel, config)
}

/// Front requirement + own length + rear requirement, bottomed at a floor
pub fn safety_envelope(required_front: f64, length: f64, required_rear: f64) -> f64 {
    (required_front + length + required_rear).max(LENGTH_FLOOR)
}

/// Kinematic inputs of one blended evaluation, all from the pre-tick snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendInputs {
    pub length: f64,
    pub velocity: f64,
    pub front_gap: f64,
    pub front_velocity: f64,
    pub back_gap: f64,
    pub back_velocity: f64,
    /// Last commanded acceleration of the rear neighbor
    pub back_acceleration: f64,
}

/// Normalized signals, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendSignals {
    pub rear_deficit: f64,
    pub front_headway: f64,
    pub rear_braking: f64,
    pub front_closing: f64,
    pub rear_closing: f64,
    pub density: f64,
}

/// Structured record of one blended evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendDiagnostic {
    pub vehicle: VehicleId,
    pub step: u64,
    pub required_front_gap: f64,
    pub required_rear_gap: f64,
    pub envelope: f64,
    pub signals: BlendSignals,
    /// Weighted mean before smoothing
    pub raw_factor: f64,
    /// Value after the low-pass filter
    pub integration_factor: f64,
}

impl BlendSignals {
    pub fn compute(inputs: &BlendInputs, config: &SimConfig) -> (Self, f64, f64, f64) {
        let tuning = &config.blend;
        let required_front = required_front_gap(inputs.velocity, inputs.front_velocity, config);
        let required_rear = required_rear_gap(inputs.back_velocity, inputs.velocity, config);
        let envelope = safety_envelope(required_front, inputs.length, required_rear);

        let rear_deficit =
            ((required_rear - inputs.back_gap) / required_rear.max(LENGTH_FLOOR)).clamp(0.0, 1.0);

        let target_headway =
            (config.min_dis + inputs.velocity * config.headway_time).max(LENGTH_FLOOR);
        let deviation = (inputs.front_gap - target_headway) / target_headway;
        let front_headway =
            (-(deviation * deviation) / (2.0 * tuning.headway_sigma * tuning.headway_sigma)).exp();

        let rear_braking = rear_braking_indicator(inputs.back_acceleration, tuning);

        let front_closing = ((inputs.velocity - inputs.front_velocity).max(0.0)
            / inputs.velocity.max(SPEED_FLOOR))
        .clamp(0.0, 1.0);
        let rear_closing = ((inputs.back_velocity - inputs.velocity).max(0.0)
            / inputs.back_velocity.max(SPEED_FLOOR))
        .clamp(0.0, 1.0);

        let occupied = (inputs.front_gap + inputs.length + inputs.back_gap).max(LENGTH_FLOOR);
        let density = (envelope / occupied).clamp(0.0, 1.0);

        let signals = Self {
            rear_deficit,
            front_headway,
            rear_braking,
            front_closing,
            rear_closing,
            density,
        };
        (signals, required_front, required_rear, envelope)
    }

    /// Weighted mean over the active weights, clamped to [0, 1]
    pub fn raw_factor(&self, tuning: &BlendTuning) -> f64 {
        let total = tuning.active_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = [
            (tuning.w_rear_deficit, self.rear_deficit),
            (tuning.w_front_headway, self.front_headway),
            (tuning.w_rear_braking, self.rear_braking),
            (tuning.w_front_closing, self.front_closing),
            (tuning.w_rear_closing, self.rear_closing),
            (tuning.w_density, self.density),
        ]
        .iter()
        .filter(|(w, _)| *w > 0.0)
        .map(|(w, s)| w * s)
        .sum::<f64>();
        (weighted / total).clamp(0.0, 1.0)
    }
}

/// 1 when the rear brakes harder than the comfort threshold, decaying
/// exponentially as its deceleration falls below it
pub fn rear_braking_indicator(back_acceleration: f64, tuning: &BlendTuning) -> f64 {
    let decel = -back_acceleration;
    if decel >= tuning.comfort_decel {
        1.0
    } else {
        (-(tuning.comfort_decel - decel) / tuning.brake_decay).exp()
    }
}

/// Single-pole low-pass step from `previous` towards `target`
pub fn smooth(previous: f64, target: f64, coefficient: f64) -> f64 {
    (previous + coefficient * (target - previous)).clamp(0.0, 1.0)
}

/// Diagnostic mode tag for an integration factor
pub fn mode_for_factor(factor: f64) -> ControlMode {
    if factor < 0.1 {
        ControlMode::Acc
    } else if factor > 0.8 {
        ControlMode::Bcc
    } else {
        ControlMode::Integrated
    }
}
