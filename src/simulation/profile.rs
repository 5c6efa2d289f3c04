//! Externally supplied target-velocity profiles
//!
//! A profile is an ordered list of (time, velocity) waypoints with strictly
//! increasing time, interpolated piecewise-linearly.

use thiserror::Error;

/// Reasons a profile is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile has no waypoints")]
    Empty,
    #[error("waypoint {0} is not finite")]
    NotFinite(usize),
    #[error("waypoint {index} at t={time} does not come after t={previous}")]
    NotIncreasing { index: usize, time: f64, previous: f64 },
}

/// A validated velocity profile
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityProfile {
    points: Vec<(f64, f64)>,
}

impl VelocityProfile {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, ProfileError> {
        if points.is_empty() {
            return Err(ProfileError::Empty);
        }
        for (index, (time, velocity)) in points.iter().enumerate() {
            if !time.is_finite() || !velocity.is_finite() {
                return Err(ProfileError::NotFinite(index));
            }
        }
        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].0 <= pair[0].0 {
                return Err(ProfileError::NotIncreasing {
                    index: index + 1,
                    time: pair[1].0,
                    previous: pair[0].0,
                });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Target velocity at simulated `time`
    ///
    /// Holds the first waypoint's velocity before the profile starts and the
    /// last one's after it ends.
    pub fn target_velocity(&self, time: f64) -> f64 {
        // new() guarantees at least one point
        let (first_time, first_velocity) = self.points[0];
        if time <= first_time {
            return first_velocity;
        }

        // Index of the first waypoint strictly after `time`
        let upper = self.points.partition_point(|(t, _)| *t <= time);
        if upper >= self.points.len() {
            return self.points[self.points.len() - 1].1;
        }

        let (t1, v1) = self.points[upper - 1];
        let (t2, v2) = self.points[upper];
        let alpha = (time - t1) / (t2 - t1);
        v1 + alpha * (v2 - v1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn profile() -> VelocityProfile {
        VelocityProfile::new(vec![(0.0, 0.0), (10.0, 20.0), (20.0, 10.0)]).unwrap()
    }

    #[test]
    fn interpolates_between_waypoints() {
        let p = profile();
        assert_abs_diff_eq!(p.target_velocity(5.0), 10.0);
        assert_abs_diff_eq!(p.target_velocity(15.0), 15.0);
        assert_abs_diff_eq!(p.target_velocity(10.0), 20.0);
    }

    #[test]
    fn holds_last_velocity_after_end() {
        assert_abs_diff_eq!(profile().target_velocity(100.0), 10.0);
    }

    #[test]
    fn holds_first_velocity_before_start() {
        let p = VelocityProfile::new(vec![(5.0, 8.0), (6.0, 9.0)]).unwrap();
        assert_abs_diff_eq!(p.target_velocity(0.0), 8.0);
    }

    #[test]
    fn single_waypoint_is_constant() {
        let p = VelocityProfile::new(vec![(3.0, 12.0)]).unwrap();
        assert_abs_diff_eq!(p.target_velocity(0.0), 12.0);
        assert_abs_diff_eq!(p.target_velocity(50.0), 12.0);
    }

    #[test]
    fn rejects_malformed_profiles() {
        assert_eq!(VelocityProfile::new(vec![]), Err(ProfileError::Empty));
        assert_eq!(
            VelocityProfile::new(vec![(0.0, 1.0), (f64::NAN, 2.0)]),
            Err(ProfileError::NotFinite(1))
        );
        assert!(matches!(
            VelocityProfile::new(vec![(0.0, 1.0), (0.0, 2.0)]),
            Err(ProfileError::NotIncreasing { index: 1, .. })
        ));
    }
}
