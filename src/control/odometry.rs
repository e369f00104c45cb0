// Dead-reckoned chassis pose from measured wheel speeds

use serde::Serialize;
use std::f32::consts::PI;

use crate::config::{ODOMETRY_MAX_DT, ODOMETRY_NOMINAL_DT};
use crate::motor::CarState;

/// Pose in the frame the chassis started (or was last reset) in
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Odometer {
    /// m
    pub x: f32,
    /// m
    pub y: f32,
    /// rad, within (-π, π]
    pub theta: f32,
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

impl Odometer {
    /// Advance by `dt` seconds at the velocity in `state`
    ///
    /// A `dt` that is not positive or longer than [`ODOMETRY_MAX_DT`] means the
    /// clock jumped or the loop stalled; the nominal step is used instead.
    pub fn integrate(&mut self, state: &CarState, dt: f32) {
        let dt = if dt > 0.0 && dt <= ODOMETRY_MAX_DT {
            dt
        } else {
            ODOMETRY_NOMINAL_DT
        };

        self.vx = state.vx;
        self.vy = state.vy;
        self.omega = state.omega;

        let dtheta = self.omega * dt;
        self.theta = wrap_angle(self.theta + dtheta);

        // Midpoint heading over the step
        let heading = self.theta - dtheta / 2.0;
        self.x += self.vx * heading.cos() * dt;
        self.y += self.vx * heading.sin() * dt;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Wrap into (-π, π]
pub fn wrap_angle(mut theta: f32) -> f32 {
    while theta > PI {
        theta -= 2.0 * PI;
    }
    while theta <= -PI {
        theta += 2.0 * PI;
    }
    theta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(vx: f32, omega: f32) -> CarState {
        CarState {
            vx,
            vy: 0.0,
            omega,
            wheel_speeds: [0; 4],
        }
    }

    #[test]
    fn test_straight_line() {
        let mut odom = Odometer::default();
        for _ in 0..100 {
            odom.integrate(&moving(0.5, 0.0), 0.01);
        }
        assert!((odom.x - 0.5).abs() < 1e-4);
        assert!(odom.y.abs() < 1e-6);
        assert_eq!(odom.theta, 0.0);
        assert_eq!(odom.vx, 0.5);
    }

    #[test]
    fn test_theta_stays_wrapped() {
        let mut odom = Odometer::default();
        for _ in 0..100_000 {
            odom.integrate(&moving(0.2, 3.0), 0.05);
            assert!(odom.theta > -PI && odom.theta <= PI, "theta {}", odom.theta);
        }

        let mut odom = Odometer::default();
        for _ in 0..10_000 {
            odom.integrate(&moving(0.0, -2.5), 0.01);
            assert!(odom.theta > -PI && odom.theta <= PI, "theta {}", odom.theta);
        }
    }

    #[test]
    fn test_wrap_angle_bounds() {
        assert_eq!(wrap_angle(PI), PI);
        assert_eq!(wrap_angle(-PI), PI);
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-6);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_midpoint_heading() {
        // A quarter turn in one step moves along the 45° chord direction
        let mut odom = Odometer::default();
        odom.integrate(&moving(1.0, PI / 2.0 / 0.5), 0.5);
        assert!((odom.theta - PI / 2.0).abs() < 1e-6);
        let expected = 0.5 * (PI / 4.0).cos();
        assert!((odom.x - expected).abs() < 1e-6);
        assert!((odom.y - expected).abs() < 1e-6);
    }

    #[test]
    fn test_bad_dt_uses_nominal_step() {
        let state = moving(0.7, 0.4);
        let mut nominal = Odometer::default();
        nominal.integrate(&state, ODOMETRY_NOMINAL_DT);

        for dt in [-0.2, 0.0, 0.51, 10.0] {
            let mut odom = Odometer::default();
            odom.integrate(&state, dt);
            assert_eq!(odom, nominal, "dt = {}", dt);
        }
    }

    #[test]
    fn test_reset() {
        let mut odom = Odometer::default();
        odom.integrate(&moving(0.5, 0.3), 0.1);
        odom.reset();
        assert_eq!(odom, Odometer::default());
    }
}
