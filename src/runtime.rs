// Wiring: motor bus -> car controller -> coordinator <- transports
// Ctrl-C stops the chassis before the process exits.

use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::config::{
    Args, ADDRESS_CONTROL, MOTOR_SETTLE, PUBLISH_INTERVAL, WHEEL_ADDRESSES,
};
use crate::control::{ControlManager, ManagerConfig};
use crate::motor::{
    CarController, ChecksumScheme, KinematicsModel, MotorLink, StepperMotor, WheelGeometry,
};
use crate::transport::{line, pubsub};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Open the bus and build the controller for the configured chassis
pub fn build_car(args: &Args) -> Result<CarController, BoxError> {
    info!("Opening motor bus on {} at {} baud", args.port, args.baud);
    let link = MotorLink::open_with_baudrate(&args.port, args.baud)?.with_settle(MOTOR_SETTLE);

    let scheme = ChecksumScheme::from(args.checksum);
    let timeout = args.timeout();
    let motor = |address| StepperMotor::new(address, scheme, timeout);

    let geometry = WheelGeometry {
        wheel_radius: args.wheel_radius,
        track_width: args.track_width,
        reduction_ratio: args.reduction_ratio,
    };
    info!(
        "Chassis: wheel radius {} m, track width {} m, reduction {}:1, checksum {:?}",
        geometry.wheel_radius, geometry.track_width, geometry.reduction_ratio, scheme
    );

    Ok(CarController::new(
        link,
        WHEEL_ADDRESSES.map(motor),
        motor(ADDRESS_CONTROL),
        KinematicsModel::normal_wheel(geometry),
    ))
}

pub async fn run(args: Args) -> Result<(), BoxError> {
    let mut car = build_car(&args)?;
    let car = tokio::task::spawn_blocking(move || {
        if let Err(e) = car.initialize() {
            warn!("Continuing with motors not enabled: {}", e);
        }
        car
    })
    .await?;

    let config = ManagerConfig {
        status_interval: Duration::from_millis(args.status_interval_ms),
        ..ManagerConfig::default()
    };
    let (manager, coordinator) = ControlManager::new(car, config);
    let coordinator = tokio::spawn(coordinator.run());

    if !args.no_stdio {
        let manager = manager.clone();
        tokio::spawn(async move {
            info!("Serving JSON lines on stdin/stdout");
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = line::serve_lines(manager, stdin, tokio::io::stdout()).await {
                error!("Line transport failed: {}", e);
            }
        });
    }

    // Keep the session alive until shutdown
    let _session = if !args.no_zenoh {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let topics = pubsub::Topics::for_device(&args.device_id);
        let manager = manager.clone();
        let task_session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = pubsub::serve(&task_session, manager, topics, PUBLISH_INTERVAL).await {
                error!("Zenoh transport failed: {}", e);
            }
        });
        Some(session)
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // The coordinator stops the chassis on its way out
    manager.shutdown();
    match coordinator.await {
        Ok(Ok(())) => info!("Chassis stopped"),
        Ok(Err(e)) => error!("Coordinator failed: {}", e),
        Err(e) => error!("Coordinator task failed: {}", e),
    }
    Ok(())
}
