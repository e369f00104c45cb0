// Chassis-level motor control for the four-wheel stepper base
//
// Combines the kinematics model with the stepper protocol: every chassis
// command fans out to the four wheel controllers and is started with a
// single sync trigger.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::kinematics::KinematicsModel;
use super::link::MotorLink;
use super::stepper::{self, Direction, StepperMotor};

/// Travel speed for position moves when the caller gives no multiplier (motor RPM)
pub const PLACEHOLDER_TRAVEL_RPM: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    RightFront,
    RightRear,
    LeftRear,
    LeftFront,
}

impl Wheel {
    /// Wheel order used by every per-wheel array
    pub const ALL: [Wheel; 4] = [
        Wheel::RightFront,
        Wheel::RightRear,
        Wheel::LeftRear,
        Wheel::LeftFront,
    ];
}

/// One or more wheels did not accept a fanned-out command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command failed on {failed:?}")]
pub struct FanoutError {
    pub failed: Vec<Wheel>,
}

/// Last measured chassis state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarState {
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
    /// Motor RPM per wheel, [RF, RR, LR, LF]
    pub wheel_speeds: [i16; 4],
}

/// Owns the bus and every motor on it
pub struct CarController {
    link: MotorLink,
    wheels: [StepperMotor; 4],
    /// Addressed for stop; all synchronized motors halt on one frame
    control: StepperMotor,
    kinematics: KinematicsModel,
    state: CarState,
}

impl CarController {
    /// `wheels` in [RF, RR, LR, LF] order
    pub fn new(
        link: MotorLink,
        wheels: [StepperMotor; 4],
        control: StepperMotor,
        kinematics: KinematicsModel,
    ) -> Self {
        Self {
            link,
            wheels,
            control,
            kinematics,
            state: CarState::default(),
        }
    }

    /// Enable every wheel motor
    ///
    /// This must be called before sending motion commands.
    pub fn initialize(&mut self) -> Result<(), FanoutError> {
        info!(
            "Enabling wheel motors {:?}",
            self.wheels.map(|m| m.address())
        );
        self.fan_out(|motor, link, _| motor.enable(link, true, false))?;
        info!("Motors enabled");
        Ok(())
    }

    /// Drive at a chassis velocity (m/s, m/s, rad/s)
    ///
    /// Every wheel is commanded even if an earlier one fails; returns false
    /// if any wheel or the sync trigger failed.
    pub fn set_speed(&mut self, vx: f32, vy: f32, omega: f32, acceleration: f32) -> bool {
        let rpm = self.kinematics.speed_commands(vx, vy, omega);
        let acceleration = to_acceleration(acceleration);
        debug!(
            "Setting chassis speed vx={} vy={} omega={} -> rpm {:?}",
            vx, vy, omega, rpm
        );

        let wheels = self.fan_out(|motor, link, i| {
            let value = rpm[i] as i32;
            motor.set_speed_mode(
                link,
                Direction::of(value),
                value.unsigned_abs() as u16,
                acceleration,
                false,
            )
        });
        let synced = self.trigger_sync();
        report(wheels, "speed") && synced
    }

    /// Move by a chassis displacement (m, m, rad)
    ///
    /// `speed` scales the placeholder travel speed; `None` runs at
    /// [`PLACEHOLDER_TRAVEL_RPM`].
    pub fn move_distance(
        &mut self,
        dx: f32,
        dy: f32,
        dtheta: f32,
        acceleration: f32,
        subdivision: u16,
        speed: Option<f32>,
    ) -> bool {
        let pulses = self.kinematics.position_commands(dx, dy, dtheta, subdivision);
        let acceleration = to_acceleration(acceleration);
        let rpm = (PLACEHOLDER_TRAVEL_RPM * speed.unwrap_or(1.0)).clamp(0.0, u16::MAX as f32) as u16;
        debug!(
            "Moving chassis dx={} dy={} dtheta={} -> pulses {:?} at {} rpm",
            dx, dy, dtheta, pulses, rpm
        );

        let wheels = self.fan_out(|motor, link, i| {
            motor.set_position_mode(
                link,
                Direction::of(pulses[i]),
                rpm,
                acceleration,
                pulses[i].unsigned_abs(),
                false,
                false,
            )
        });
        let synced = self.trigger_sync();
        report(wheels, "move") && synced
    }

    /// Stop all motors immediately
    pub fn stop(&mut self) -> bool {
        info!("Stopping all motors");
        match self.control.stop(&mut self.link, false) {
            Ok(()) => true,
            Err(e) => {
                warn!("Stop failed: {}", e);
                false
            }
        }
    }

    /// Read every wheel speed and refresh the chassis state
    ///
    /// A wheel that cannot be read counts as stopped.
    pub fn car_state(&mut self) -> CarState {
        let mut speeds = [0i16; 4];
        for (i, motor) in self.wheels.iter().enumerate() {
            speeds[i] = match motor.read_speed(&mut self.link) {
                Ok(rpm) => rpm,
                Err(e) => {
                    debug!("{:?} speed read failed: {}", Wheel::ALL[i], e);
                    0
                }
            };
        }

        let v = self.kinematics.wheel_speeds_to_chassis(speeds);
        self.state = CarState {
            vx: v.vx,
            vy: v.vy,
            omega: v.omega,
            wheel_speeds: speeds,
        };
        self.state
    }

    /// State from the most recent `car_state` call
    pub fn last_state(&self) -> CarState {
        self.state
    }

    // Sync is addressed to the first wheel
    fn trigger_sync(&mut self) -> bool {
        match self.wheels[0].sync_move(&mut self.link) {
            Ok(()) => true,
            Err(e) => {
                warn!("Sync trigger failed: {}", e);
                false
            }
        }
    }

    /// Run `op` on every wheel without stopping at the first failure
    fn fan_out<F>(&mut self, mut op: F) -> Result<(), FanoutError>
    where
        F: FnMut(&StepperMotor, &mut MotorLink, usize) -> stepper::Result<()>,
    {
        let mut failed = Vec::new();
        for (i, motor) in self.wheels.iter().enumerate() {
            if let Err(e) = op(motor, &mut self.link, i) {
                warn!("{:?}: {}", Wheel::ALL[i], e);
                failed.push(Wheel::ALL[i]);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(FanoutError { failed })
        }
    }
}

impl Drop for CarController {
    fn drop(&mut self) {
        // Try to stop motors when the controller goes away
        if !self.stop() {
            warn!("Failed to stop motors on drop");
        }
    }
}

fn report(result: Result<(), FanoutError>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Partial {} fan-out: {}", what, e);
            false
        }
    }
}

fn to_acceleration(acceleration: f32) -> u8 {
    acceleration.clamp(0.0, u8::MAX as f32) as u8
}
