// Motor control module for the four-wheel stepper base
//
// Provides:
// - Frame checksums and framing for the stepper controller protocol
// - A single-owner request/response link over the serial bus
// - The per-motor command and readout surface
// - Chassis kinematics and the high-level car controller

pub mod checksum;
mod driver;
pub mod frame;
pub mod kinematics;
pub mod link;
#[cfg(test)]
pub(crate) mod mock;
pub mod stepper;

pub use checksum::ChecksumScheme;
pub use driver::{CarController, CarState, FanoutError, Wheel, PLACEHOLDER_TRAVEL_RPM};
pub use kinematics::{ChassisVelocity, KinematicsModel, WheelGeometry};
pub use link::{LinkError, MotorChannel, MotorLink};
pub use stepper::{MotorAddress, MotorError, StepperMotor};
