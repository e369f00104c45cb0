// Define message types exchanged with the transports

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_ACCELERATION, DEFAULT_SPEED, DEFAULT_SPEED_DURATION_MS, DEFAULT_SUBDIVISION,
};
use crate::control::Odometer;
use crate::motor::CarState;

// Request from a host, script or teleop -> runtime
// The "command" field selects the variant; missing numbers take the defaults below
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    Speed {
        #[serde(default)]
        vx: f32,
        #[serde(default)]
        vy: f32,
        #[serde(default)]
        omega: f32,
        #[serde(default = "default_acceleration")]
        acceleration: f32,
        /// Stop after this many ms, 0 keeps driving until told otherwise
        #[serde(rename = "duration", default = "default_duration")]
        duration_ms: u64,
    },
    Move {
        #[serde(default)]
        dx: f32,
        #[serde(default)]
        dy: f32,
        #[serde(default)]
        dtheta: f32,
        #[serde(default = "default_acceleration")]
        acceleration: f32,
        #[serde(default = "default_speed")]
        speed: f32,
        #[serde(default = "default_subdivision")]
        subdivision: u16,
    },
    Stop,
    #[serde(alias = "status")]
    GetStatus,
    #[serde(alias = "odometry")]
    GetOdometry,
    ResetOdometer,
    SetStatusInterval {
        interval_ms: u64,
    },
    // Periodic status on the line transport, 0 disables
    Auto {
        #[serde(default)]
        interval: u64,
    },
}

fn default_acceleration() -> f32 {
    DEFAULT_ACCELERATION
}

fn default_duration() -> u64 {
    DEFAULT_SPEED_DURATION_MS
}

fn default_speed() -> f32 {
    DEFAULT_SPEED
}

fn default_subdivision() -> u16 {
    DEFAULT_SUBDIVISION
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// ROS-style velocity command: linear in m/s, angular in rad/s
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    #[serde(default)]
    pub linear: Vector3,
    #[serde(default)]
    pub angular: Vector3,
}

/// Runtime -> host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Status(CarState),
    Odometry(Odometer),
    Error { error: String },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ControlRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_speed_defaults() {
        assert_eq!(
            parse(r#"{"command":"speed","vx":0.5}"#),
            ControlRequest::Speed {
                vx: 0.5,
                vy: 0.0,
                omega: 0.0,
                acceleration: 10.0,
                duration_ms: 1000
            }
        );
    }

    #[test]
    fn test_speed_duration() {
        assert!(matches!(
            parse(r#"{"command":"speed","vx":0.2,"duration":200}"#),
            ControlRequest::Speed { duration_ms: 200, .. }
        ));
        assert!(matches!(
            parse(r#"{"command":"speed","vx":0.2,"duration":0}"#),
            ControlRequest::Speed { duration_ms: 0, .. }
        ));
    }

    #[test]
    fn test_move_defaults() {
        assert_eq!(
            parse(r#"{"command":"move","dx":1.0,"dtheta":0.5}"#),
            ControlRequest::Move {
                dx: 1.0,
                dy: 0.0,
                dtheta: 0.5,
                acceleration: 10.0,
                speed: 1.0,
                subdivision: 256
            }
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        assert!(matches!(
            parse(r#"{"command":"speed","vx":0.2,"mode":"fast"}"#),
            ControlRequest::Speed { .. }
        ));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse(r#"{"command":"stop"}"#), ControlRequest::Stop);
        assert_eq!(parse(r#"{"command":"status"}"#), ControlRequest::GetStatus);
        assert_eq!(parse(r#"{"command":"get_status"}"#), ControlRequest::GetStatus);
        assert_eq!(parse(r#"{"command":"odometry"}"#), ControlRequest::GetOdometry);
        assert_eq!(
            parse(r#"{"command":"reset_odometer"}"#),
            ControlRequest::ResetOdometer
        );
        assert_eq!(
            parse(r#"{"command":"set_status_interval","interval_ms":20}"#),
            ControlRequest::SetStatusInterval { interval_ms: 20 }
        );
        assert_eq!(
            parse(r#"{"command":"auto"}"#),
            ControlRequest::Auto { interval: 0 }
        );
    }

    #[test]
    fn test_rejects_unknown_or_missing_command() {
        assert!(serde_json::from_str::<ControlRequest>(r#"{"command":"fly"}"#).is_err());
        assert!(serde_json::from_str::<ControlRequest>(r#"{"vx":1.0}"#).is_err());
    }

    #[test]
    fn test_twist_partial() {
        let twist: Twist = serde_json::from_str(r#"{"linear":{"x":0.3},"angular":{"z":-0.5}}"#).unwrap();
        assert_eq!(twist.linear.x, 0.3);
        assert_eq!(twist.linear.y, 0.0);
        assert_eq!(twist.angular.z, -0.5);
    }

    #[test]
    fn test_reply_shapes() {
        let status = Reply::Status(CarState {
            vx: 0.5,
            vy: 0.0,
            omega: 0.0,
            wheel_speeds: [-358, -358, 358, 358],
        });
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"vx":0.5,"vy":0.0,"omega":0.0,"wheelSpeeds":[-358,-358,358,358]}"#
        );
        assert_eq!(
            serde_json::to_string(&Reply::error("bad")).unwrap(),
            r#"{"error":"bad"}"#
        );
    }
}
