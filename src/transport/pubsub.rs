// Zenoh adapter: JSON requests and ROS-style cmd_vel in, status and odometry out

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{dispatch, dispatch_twist, parse_request, Outcome};
use crate::config::{topic, TOPIC_CMD_VEL, TOPIC_COMMAND, TOPIC_ODOMETRY, TOPIC_STATUS};
use crate::control::ControlManager;
use crate::messages::{Reply, Twist};
use crate::runtime::BoxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub cmd_vel: String,
    pub status: String,
    pub odometry: String,
}

impl Topics {
    pub fn for_device(device_id: &str) -> Self {
        Self {
            command: topic(TOPIC_COMMAND, device_id),
            cmd_vel: topic(TOPIC_CMD_VEL, device_id),
            status: topic(TOPIC_STATUS, device_id),
            odometry: topic(TOPIC_ODOMETRY, device_id),
        }
    }
}

pub async fn serve(
    session: &zenoh::Session,
    manager: ControlManager,
    topics: Topics,
    period: Duration,
) -> Result<(), BoxError> {
    info!("Setting up publishers and subscribers...");
    let commands = session.declare_subscriber(topics.command.clone()).await?;
    let cmd_vel = session.declare_subscriber(topics.cmd_vel.clone()).await?;
    let pub_status = session.declare_publisher(topics.status.clone()).await?;
    let pub_odometry = session.declare_publisher(topics.odometry.clone()).await?;

    info!("Subscribed to: {}, {}", topics.command, topics.cmd_vel);
    info!("Publishing to: {}, {}", topics.status, topics.odometry);

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            sample = commands.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                let request = match parse_request(&payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Failed to parse command: {}", e);
                        continue;
                    }
                };
                match dispatch(&manager, request).await {
                    Outcome::Reply(reply @ Reply::Odometry(_)) => {
                        pub_odometry.put(serde_json::to_string(&reply)?).await?;
                    }
                    Outcome::Reply(reply) => {
                        pub_status.put(serde_json::to_string(&reply)?).await?;
                    }
                    Outcome::AutoInterval(_) => {
                        debug!("Ignoring auto request; status is published every {:?}", period);
                    }
                    Outcome::Done => {}
                }
            }
            sample = cmd_vel.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<Twist>(&payload) {
                    Ok(twist) => dispatch_twist(&manager, &twist),
                    Err(e) => warn!("Failed to parse cmd_vel: {}", e),
                }
            }
            _ = tick.tick() => {
                let status = Reply::Status(manager.car_state().await);
                pub_status.put(serde_json::to_string(&status)?).await?;

                let odometry = Reply::Odometry(manager.odometer().await);
                pub_odometry.put(serde_json::to_string(&odometry)?).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_for_device() {
        let topics = Topics::for_device("base");
        assert_eq!(topics.command, "chassis/base/cmd");
        assert_eq!(topics.cmd_vel, "chassis/base/cmd_vel");
        assert_eq!(topics.status, "chassis/base/status");
        assert_eq!(topics.odometry, "chassis/base/odom");
    }
}
