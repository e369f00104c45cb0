// Chassis kinematics for the four-wheel stepper base
// Converts chassis-frame velocity and displacement into per-wheel RPM and
// pulse commands, and wheel speed feedback back into chassis velocity.
//
// Wheel order everywhere: [RF, RR, LR, LF]

use std::f32::consts::PI;

/// Full steps per motor revolution (1.8° motor)
pub const FULL_STEPS_PER_REV: f32 = 200.0;

/// Physical parameters shared by every wheel layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    /// meters
    pub wheel_radius: f32,
    /// meters between left and right wheel contact lines
    pub track_width: f32,
    /// motor turns per wheel turn
    pub reduction_ratio: f32,
}

impl WheelGeometry {
    pub fn circumference(&self) -> f32 {
        2.0 * PI * self.wheel_radius
    }
}

/// Chassis velocity: m/s forward and left, rad/s counter-clockwise
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisVelocity {
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

/// Differential drive with two wheels per side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalWheel {
    geometry: WheelGeometry,
}

impl NormalWheel {
    pub fn new(geometry: WheelGeometry) -> Self {
        Self { geometry }
    }

    // Right-side motors are mounted mirrored, so their forward sense is negative
    fn speed_commands(&self, vx: f32, _vy: f32, omega: f32) -> [i16; 4] {
        let g = &self.geometry;
        let c = g.circumference();
        let half_track = g.track_width / 2.0;

        let right_rpm = (vx + half_track * omega) * 60.0 / c;
        let left_rpm = (vx - half_track * omega) * 60.0 / c;

        let right = (-right_rpm * g.reduction_ratio) as i16;
        let left = (left_rpm * g.reduction_ratio) as i16;
        [right, right, left, left]
    }

    fn position_commands(&self, dx: f32, _dy: f32, dtheta: f32, subdivision: u16) -> [i32; 4] {
        let g = &self.geometry;
        let c = g.circumference();
        let pulses_per_rotation = FULL_STEPS_PER_REV * subdivision as f32;

        let forward = dx / c * pulses_per_rotation;
        let rotation = (g.track_width / 2.0) * dtheta / c * pulses_per_rotation;

        let right = (-(forward + rotation).round() * g.reduction_ratio) as i32;
        let left = ((forward - rotation).round() * g.reduction_ratio) as i32;
        [right, right, left, left]
    }

    // Only RF and LR are read back; RR and LF mirror them on a rigid chassis
    fn wheel_speeds_to_chassis(&self, speeds: [i16; 4]) -> ChassisVelocity {
        let g = &self.geometry;
        let to_linear = g.circumference() / (60.0 * g.reduction_ratio);

        let right = -(speeds[0] as f32) * to_linear;
        let left = speeds[2] as f32 * to_linear;

        ChassisVelocity {
            vx: (right + left) / 2.0,
            vy: 0.0,
            omega: (right - left) / g.track_width,
        }
    }
}

/// Not implemented for this base: every command maps to zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mecanum {
    pub geometry: WheelGeometry,
}

/// Not implemented for this base: every command maps to zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Omnidirectional {
    pub geometry: WheelGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KinematicsModel {
    NormalWheel(NormalWheel),
    Mecanum(Mecanum),
    Omnidirectional(Omnidirectional),
}

impl KinematicsModel {
    pub fn normal_wheel(geometry: WheelGeometry) -> Self {
        KinematicsModel::NormalWheel(NormalWheel::new(geometry))
    }

    /// Signed motor RPM per wheel for a chassis velocity
    ///
    /// # Arguments
    /// * `vx` - Forward velocity in m/s
    /// * `vy` - Lateral velocity in m/s (no effect on a differential base)
    /// * `omega` - Rotational velocity in rad/s (positive = counter-clockwise)
    pub fn speed_commands(&self, vx: f32, vy: f32, omega: f32) -> [i16; 4] {
        match self {
            KinematicsModel::NormalWheel(model) => model.speed_commands(vx, vy, omega),
            KinematicsModel::Mecanum(_) | KinematicsModel::Omnidirectional(_) => [0; 4],
        }
    }

    /// Signed pulse count per wheel for a chassis displacement
    pub fn position_commands(&self, dx: f32, dy: f32, dtheta: f32, subdivision: u16) -> [i32; 4] {
        match self {
            KinematicsModel::NormalWheel(model) => {
                model.position_commands(dx, dy, dtheta, subdivision)
            }
            KinematicsModel::Mecanum(_) | KinematicsModel::Omnidirectional(_) => [0; 4],
        }
    }

    /// Chassis velocity from measured motor RPM
    pub fn wheel_speeds_to_chassis(&self, speeds: [i16; 4]) -> ChassisVelocity {
        match self {
            KinematicsModel::NormalWheel(model) => model.wheel_speeds_to_chassis(speeds),
            KinematicsModel::Mecanum(_) | KinematicsModel::Omnidirectional(_) => {
                ChassisVelocity::default()
            }
        }
    }
}
