//! Run configuration for the platoon simulation
//!
//! A `SimConfig` is built once, validated once when the world is created,
//! and read-only afterwards. Re-initialization means building a new world.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Control law applied to every non-lead vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ControlLaw {
    /// Forward tracking only
    #[serde(rename = "ACC", alias = "acc")]
    Acc,
    /// Symmetric front/back tracking
    #[serde(rename = "BCC", alias = "bcc")]
    Bcc,
    /// ACC blended with BCC through a smoothed integration factor
    #[serde(rename = "ACC+BCC", alias = "blended")]
    Blended,
}

impl ControlLaw {
    pub const ALL: [ControlLaw; 3] = [ControlLaw::Acc, ControlLaw::Bcc, ControlLaw::Blended];
}

impl fmt::Display for ControlLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlLaw::Acc => "ACC",
            ControlLaw::Bcc => "BCC",
            ControlLaw::Blended => "ACC+BCC",
        };
        f.write_str(name)
    }
}

impl FromStr for ControlLaw {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACC" => Ok(ControlLaw::Acc),
            "BCC" => Ok(ControlLaw::Bcc),
            "ACC+BCC" | "BLENDED" => Ok(ControlLaw::Blended),
            _ => Err(ConfigError::UnknownLaw(s.to_string())),
        }
    }
}

/// Tuning of the blended (ACC+BCC) policy
///
/// Weights are relative; only strictly positive weights count towards the
/// normalizing total.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlendTuning {
    /// Fraction of |min_a| assumed for the rear vehicle's guaranteed braking
    pub rear_decel_fraction: f64,
    /// Low-pass blend coefficient applied to the integration factor each tick
    pub smoothing: f64,
    /// Rear deceleration (positive, m/s^2) above which the rear is "hard braking"
    pub comfort_decel: f64,
    /// Decay scale (m/s^2) of the rear braking indicator below the threshold
    pub brake_decay: f64,
    /// Width of the Gaussian applied to the relative front headway deviation
    pub headway_sigma: f64,
    pub w_rear_deficit: f64,
    pub w_front_headway: f64,
    pub w_rear_braking: f64,
    pub w_front_closing: f64,
    pub w_rear_closing: f64,
    pub w_density: f64,
}

impl Default for BlendTuning {
    fn default() -> Self {
        Self {
            rear_decel_fraction: 0.6,
            smoothing: 0.1,
            comfort_decel: 2.0,
            brake_decay: 1.0,
            headway_sigma: 0.5,
            w_rear_deficit: 0.30,
            w_front_headway: 0.15,
            w_rear_braking: 0.15,
            w_front_closing: 0.10,
            w_rear_closing: 0.20,
            w_density: 0.10,
        }
    }
}

impl BlendTuning {
    /// Sum of the strictly positive weights
    pub fn active_weight(&self) -> f64 {
        [
            self.w_rear_deficit,
            self.w_front_headway,
            self.w_rear_braking,
            self.w_front_closing,
            self.w_rear_closing,
            self.w_density,
        ]
        .iter()
        .filter(|w| **w > 0.0)
        .sum()
    }
}

/// Immutable per-run parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of vehicles created at initialization
    pub vehicle_count: usize,
    /// Gap gain
    pub kd: f64,
    /// Relative velocity gain
    pub kv: f64,
    /// Desired velocity gain
    pub kc: f64,
    pub v_des: f64,
    pub max_v: f64,
    pub min_v: f64,
    /// Buffer distance in the desired gap
    pub min_dis: f64,
    pub reaction_time: f64,
    /// Target time headway used by the blended policy's front-gap signal
    pub headway_time: f64,
    pub max_a: f64,
    pub min_a: f64,
    /// Clearance restored by the collision resolver
    pub min_gap: f64,
    /// Tick length in seconds
    pub dt: f64,
    pub law: ControlLaw,
    /// Optional jerk limit in m/s^3
    pub max_jerk: Option<f64>,

    pub road_length: f64,
    pub lane_count: usize,
    pub vehicle_length: f64,
    pub initial_velocity: f64,
    /// Half-width of the seeded uniform perturbation applied to initial velocities
    pub initial_speed_jitter: f64,
    pub seed: u64,

    pub mass: f64,
    pub frontal_area: f64,
    /// Rolling resistance coefficient
    pub rolling_coefficient: f64,
    /// Aerodynamic drag coefficient
    pub drag_coefficient: f64,
    pub air_density: f64,

    /// Coefficient of restitution used on collision
    pub restitution: f64,
    /// Ticks a collision indicator stays set
    pub collision_cooldown_ticks: u32,

    /// Keep per-vehicle position/velocity/acceleration time series
    pub record_history: bool,

    pub blend: BlendTuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            vehicle_count: 3,
            kd: 0.8,
            kv: 0.4,
            kc: 0.4,
            v_des: 15.0,
            max_v: 30.0,
            min_v: 0.0,
            min_dis: 6.0,
            reaction_time: 0.8,
            headway_time: 1.0,
            max_a: 3.0,
            min_a: -5.0,
            min_gap: 2.0,
            dt: 0.1,
            law: ControlLaw::Acc,
            max_jerk: None,
            road_length: 1000.0,
            lane_count: 1,
            vehicle_length: 5.0,
            initial_velocity: 0.0,
            initial_speed_jitter: 0.0,
            seed: 0,
            mass: 1800.0,
            frontal_area: 2.2,
            rolling_coefficient: 0.015,
            drag_coefficient: 0.29,
            air_density: 1.225,
            restitution: 0.2,
            collision_cooldown_ticks: 40,
            record_history: true,
            blend: BlendTuning::default(),
        }
    }
}

/// Reasons a configuration is rejected before the first tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown control law `{0}`")]
    UnknownLaw(String),
    #[error("parameter `{0}` must be finite")]
    NotFinite(&'static str),
    #[error("min_v ({min}) must not exceed max_v ({max})")]
    VelocityBounds { min: f64, max: f64 },
    #[error("min_a ({min}) must not exceed max_a ({max})")]
    AccelerationBounds { min: f64, max: f64 },
    #[error("parameter `{0}` must not be negative")]
    Negative(&'static str),
    #[error("parameter `{0}` must be strictly positive")]
    NotPositive(&'static str),
    #[error("restitution ({0}) must lie in [0, 1]")]
    Restitution(f64),
    #[error("blend smoothing ({0}) must lie in (0, 1]")]
    Smoothing(f64),
    #[error("{per_lane} vehicles of length {length} do not fit on a {road_length} road")]
    DoesNotFit {
        per_lane: usize,
        length: f64,
        road_length: f64,
    },
}

impl SimConfig {
    /// Check every invariant the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("kd", self.kd),
            ("kv", self.kv),
            ("kc", self.kc),
            ("v_des", self.v_des),
            ("max_v", self.max_v),
            ("min_v", self.min_v),
            ("min_dis", self.min_dis),
            ("reaction_time", self.reaction_time),
            ("headway_time", self.headway_time),
            ("max_a", self.max_a),
            ("min_a", self.min_a),
            ("min_gap", self.min_gap),
            ("dt", self.dt),
            ("road_length", self.road_length),
            ("vehicle_length", self.vehicle_length),
            ("initial_velocity", self.initial_velocity),
            ("initial_speed_jitter", self.initial_speed_jitter),
            ("mass", self.mass),
            ("frontal_area", self.frontal_area),
            ("rolling_coefficient", self.rolling_coefficient),
            ("drag_coefficient", self.drag_coefficient),
            ("air_density", self.air_density),
            ("restitution", self.restitution),
            ("blend.rear_decel_fraction", self.blend.rear_decel_fraction),
            ("blend.smoothing", self.blend.smoothing),
            ("blend.comfort_decel", self.blend.comfort_decel),
            ("blend.brake_decay", self.blend.brake_decay),
            ("blend.headway_sigma", self.blend.headway_sigma),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }

        if self.min_v > self.max_v {
            return Err(ConfigError::VelocityBounds {
                min: self.min_v,
                max: self.max_v,
            });
        }
        if self.min_a > self.max_a {
            return Err(ConfigError::AccelerationBounds {
                min: self.min_a,
                max: self.max_a,
            });
        }

        let non_negative = [
            ("min_dis", self.min_dis),
            ("min_gap", self.min_gap),
            ("reaction_time", self.reaction_time),
            ("headway_time", self.headway_time),
            ("initial_speed_jitter", self.initial_speed_jitter),
            ("mass", self.mass),
            ("frontal_area", self.frontal_area),
            ("rolling_coefficient", self.rolling_coefficient),
            ("drag_coefficient", self.drag_coefficient),
            ("air_density", self.air_density),
        ];
        for (name, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::Negative(name));
            }
        }

        let positive = [
            ("dt", self.dt),
            ("road_length", self.road_length),
            ("vehicle_length", self.vehicle_length),
            ("blend.rear_decel_fraction", self.blend.rear_decel_fraction),
            ("blend.brake_decay", self.blend.brake_decay),
            ("blend.headway_sigma", self.blend.headway_sigma),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.lane_count == 0 {
            return Err(ConfigError::NotPositive("lane_count"));
        }
        if let Some(max_jerk) = self.max_jerk {
            if !max_jerk.is_finite() {
                return Err(ConfigError::NotFinite("max_jerk"));
            }
            if max_jerk <= 0.0 {
                return Err(ConfigError::NotPositive("max_jerk"));
            }
        }

        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(ConfigError::Restitution(self.restitution));
        }
        if self.blend.smoothing <= 0.0 || self.blend.smoothing > 1.0 {
            return Err(ConfigError::Smoothing(self.blend.smoothing));
        }

        let per_lane = self.vehicle_count.div_ceil(self.lane_count);
        if per_lane as f64 * self.slot_spacing() > self.road_length {
            return Err(ConfigError::DoesNotFit {
                per_lane,
                length: self.vehicle_length,
                road_length: self.road_length,
            });
        }

        Ok(())
    }

    /// Distance between consecutive vehicles of a lane at initialization
    pub fn slot_spacing(&self) -> f64 {
        self.vehicle_length + self.min_dis + self.initial_velocity * self.reaction_time
    }

    /// Clamp an acceleration into [min_a, max_a]
    pub fn clamp_acceleration(&self, acceleration: f64) -> f64 {
        acceleration.clamp(self.min_a, self.max_a)
    }

    /// Clamp a velocity into [min_v, max_v]
    pub fn clamp_velocity(&self, velocity: f64) -> f64 {
        velocity.clamp(self.min_v, self.max_v)
    }

    /// Desired gap at a given speed
    pub fn desired_gap(&self, velocity: f64) -> f64 {
        self.min_dis + velocity * self.reaction_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_velocity_bounds() {
        let config = SimConfig {
            min_v: 10.0,
            max_v: 5.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VelocityBounds { .. })
        ));
    }

    #[test]
    fn rejects_inverted_acceleration_bounds() {
        let config = SimConfig {
            min_a: 2.0,
            max_a: -2.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AccelerationBounds { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_dt() {
        let config = SimConfig {
            dt: 0.0,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NotPositive("dt")));
    }

    #[test]
    fn rejects_negative_gap() {
        let config = SimConfig {
            min_gap: -1.0,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Negative("min_gap")));
    }

    #[test]
    fn rejects_nan() {
        let config = SimConfig {
            kd: f64::NAN,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NotFinite("kd")));
    }

    #[test]
    fn rejects_overfull_lane() {
        let config = SimConfig {
            vehicle_count: 200,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DoesNotFit { .. })
        ));
    }

    #[test]
    fn parses_law_names_from_toml() {
        let config: SimConfig = toml::from_str(
            r#"
            vehicle_count = 5
            law = "ACC+BCC"
            max_jerk = 2.5

            [blend]
            smoothing = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.vehicle_count, 5);
        assert_eq!(config.law, ControlLaw::Blended);
        assert_eq!(config.max_jerk, Some(2.5));
        assert_eq!(config.blend.smoothing, 0.2);
        assert_eq!(config.blend.w_rear_deficit, BlendTuning::default().w_rear_deficit);
        assert_eq!(config.kd, SimConfig::default().kd);
    }

    #[test]
    fn parses_law_names_from_cli_strings() {
        assert_eq!("acc".parse::<ControlLaw>(), Ok(ControlLaw::Acc));
        assert_eq!("BCC".parse::<ControlLaw>(), Ok(ControlLaw::Bcc));
        assert_eq!("acc+bcc".parse::<ControlLaw>(), Ok(ControlLaw::Blended));
        assert_eq!(
            "idm".parse::<ControlLaw>(),
            Err(ConfigError::UnknownLaw("idm".to_string()))
        );
    }
}
