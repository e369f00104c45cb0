// The motion surface the coordinator drives

use crate::motor::{CarController, CarState};

/// Blocking chassis operations, called only from the coordinator's worker
pub trait Chassis: Send + 'static {
    fn set_speed(&mut self, vx: f32, vy: f32, omega: f32, acceleration: f32) -> bool;

    fn move_distance(
        &mut self,
        dx: f32,
        dy: f32,
        dtheta: f32,
        acceleration: f32,
        subdivision: u16,
        speed: Option<f32>,
    ) -> bool;

    fn stop(&mut self) -> bool;

    fn car_state(&mut self) -> CarState;
}

impl Chassis for CarController {
    fn set_speed(&mut self, vx: f32, vy: f32, omega: f32, acceleration: f32) -> bool {
        CarController::set_speed(self, vx, vy, omega, acceleration)
    }

    fn move_distance(
        &mut self,
        dx: f32,
        dy: f32,
        dtheta: f32,
        acceleration: f32,
        subdivision: u16,
        speed: Option<f32>,
    ) -> bool {
        CarController::move_distance(self, dx, dy, dtheta, acceleration, subdivision, speed)
    }

    fn stop(&mut self) -> bool {
        CarController::stop(self)
    }

    fn car_state(&mut self) -> CarState {
        CarController::car_state(self)
    }
}
