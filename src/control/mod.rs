// Command coordination for the chassis
//
// Provides:
// - A coalescing command queue with Stop priority
// - Odometry integration from measured chassis velocity
// - The coordinator task that owns the chassis and its shared handle

mod chassis;
mod manager;
pub mod odometry;
pub mod queue;

pub use chassis::Chassis;
pub use manager::{ControlError, ControlManager, Coordinator, ManagerConfig};
pub use odometry::Odometer;
pub use queue::{CommandKind, MotionCommand};
