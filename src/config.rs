// Defaults for the serial bus, chassis geometry, coordinator timing and topics,
// plus the command line that overrides the hardware-facing ones
use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::motor::stepper::BROADCAST_ADDRESS;
use crate::motor::ChecksumScheme;

// Serial bus
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";
pub const MOTOR_BAUDRATE: u32 = 115_200;
// Reply window for a single motor exchange
pub const MOTOR_TIMEOUT_MS: u64 = 1000;
pub const MOTOR_SETTLE: Duration = Duration::from_millis(10);

// Motor addresses; the control address halts every synchronized motor
pub const ADDRESS_RIGHT_FRONT: u8 = 1;
pub const ADDRESS_RIGHT_REAR: u8 = 2;
pub const ADDRESS_LEFT_REAR: u8 = 3;
pub const ADDRESS_LEFT_FRONT: u8 = 4;
pub const ADDRESS_CONTROL: u8 = BROADCAST_ADDRESS;
pub const WHEEL_ADDRESSES: [u8; 4] = [
    ADDRESS_RIGHT_FRONT,
    ADDRESS_RIGHT_REAR,
    ADDRESS_LEFT_REAR,
    ADDRESS_LEFT_FRONT,
];

// Chassis geometry
pub const WHEEL_RADIUS: f32 = 0.08; // meters
pub const TRACK_WIDTH: f32 = 0.6; // meters
pub const REDUCTION_RATIO: f32 = 6.0;

// Coordinator timing
pub const COORDINATOR_TICK: Duration = Duration::from_millis(5);
pub const ODOMETRY_INTERVAL: Duration = Duration::from_millis(10);
pub const STATUS_INTERVAL_MS: u64 = 50;
pub const LOCK_WAIT: Duration = Duration::from_millis(100);

// Odometry steps outside (0, MAX] are replaced with the nominal step (seconds)
pub const ODOMETRY_MAX_DT: f32 = 0.5;
pub const ODOMETRY_NOMINAL_DT: f32 = 0.01;

// Request defaults
pub const DEFAULT_ACCELERATION: f32 = 10.0;
pub const DEFAULT_SUBDIVISION: u16 = 256;
pub const DEFAULT_SPEED: f32 = 1.0;
// Speed requests stop on their own after this long, 0 runs until stopped
pub const DEFAULT_SPEED_DURATION_MS: u64 = 1000;

// Zenoh topics
pub const TOPIC_COMMAND: &str = "chassis/{id}/cmd"; // JSON control requests
pub const TOPIC_CMD_VEL: &str = "chassis/{id}/cmd_vel"; // Twist
pub const TOPIC_STATUS: &str = "chassis/{id}/status"; // status reports
pub const TOPIC_ODOMETRY: &str = "chassis/{id}/odom"; // odometer
pub const DEVICE_ID: &str = "base";

// Zenoh publish period for status and odometry
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Replace the `{id}` placeholder in a topic
pub fn topic(template: &str, device_id: &str) -> String {
    template.replace("{id}", device_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChecksumArg {
    Fixed,
    Xor,
    Crc8,
}

impl From<ChecksumArg> for ChecksumScheme {
    fn from(arg: ChecksumArg) -> Self {
        match arg {
            ChecksumArg::Fixed => ChecksumScheme::Fixed,
            ChecksumArg::Xor => ChecksumScheme::Xor,
            ChecksumArg::Crc8 => ChecksumScheme::Crc8,
        }
    }
}

/// Four-wheel stepper chassis runtime
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    /// Serial port of the motor bus
    #[arg(long, default_value = MOTOR_PORT)]
    pub port: String,

    #[arg(long, default_value_t = MOTOR_BAUDRATE)]
    pub baud: u32,

    /// Reply window per motor exchange
    #[arg(long, default_value_t = MOTOR_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Frame checksum configured on the motors
    #[arg(long, value_enum, default_value_t = ChecksumArg::Fixed)]
    pub checksum: ChecksumArg,

    /// Wheel radius in meters
    #[arg(long, default_value_t = WHEEL_RADIUS)]
    pub wheel_radius: f32,

    /// Track width in meters
    #[arg(long, default_value_t = TRACK_WIDTH)]
    pub track_width: f32,

    #[arg(long, default_value_t = REDUCTION_RATIO)]
    pub reduction_ratio: f32,

    /// How often the coordinator refreshes wheel speeds
    #[arg(long, default_value_t = STATUS_INTERVAL_MS)]
    pub status_interval_ms: u64,

    /// Do not serve JSON lines on stdin/stdout
    #[arg(long)]
    pub no_stdio: bool,

    /// Do not open a zenoh session
    #[arg(long)]
    pub no_zenoh: bool,

    /// Device id substituted into the zenoh topics
    #[arg(long, default_value = DEVICE_ID)]
    pub device_id: String,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
