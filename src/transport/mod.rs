// Transports that feed the coordinator
//
// Every adapter decodes JSON into a `ControlRequest` and hands it to
// `dispatch`; none of them touches the motor bus.

pub mod line;
pub mod pubsub;

use tracing::debug;

use crate::config::{DEFAULT_ACCELERATION, DEFAULT_SPEED_DURATION_MS};
use crate::control::ControlManager;
use crate::messages::{ControlRequest, Reply, Twist};

/// What the adapter should do after a request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Reply(Reply),
    /// Status auto-publish period in ms, 0 disables
    AutoInterval(u64),
}

pub fn parse_request(payload: &[u8]) -> Result<ControlRequest, serde_json::Error> {
    serde_json::from_slice(payload)
}

pub async fn dispatch(manager: &ControlManager, request: ControlRequest) -> Outcome {
    debug!("Request: {:?}", request);
    match request {
        ControlRequest::Speed {
            vx,
            vy,
            omega,
            acceleration,
            duration_ms,
        } => manager.speed(vx, vy, omega, acceleration, duration_ms),
        ControlRequest::Move {
            dx,
            dy,
            dtheta,
            acceleration,
            speed,
            subdivision,
        } => manager.move_distance(dx, dy, dtheta, acceleration, Some(speed), subdivision),
        ControlRequest::Stop => manager.stop(),
        ControlRequest::GetStatus => {
            // Answer from the cache and have the next tick read fresh speeds
            manager.request_status();
            return Outcome::Reply(Reply::Status(manager.car_state().await));
        }
        ControlRequest::GetOdometry => {
            return Outcome::Reply(Reply::Odometry(manager.odometer().await));
        }
        ControlRequest::ResetOdometer => manager.reset_odometer().await,
        ControlRequest::SetStatusInterval { interval_ms } => {
            manager.set_status_interval(interval_ms)
        }
        ControlRequest::Auto { interval } => return Outcome::AutoInterval(interval),
    }
    Outcome::Done
}

/// `cmd_vel` maps onto a timed speed request at the default acceleration.
/// The chassis cannot strafe, so `linear.y` is dropped.
pub fn dispatch_twist(manager: &ControlManager, twist: &Twist) {
    manager.speed(
        twist.linear.x,
        0.0,
        twist.angular.z,
        DEFAULT_ACCELERATION,
        DEFAULT_SPEED_DURATION_MS,
    );
}
