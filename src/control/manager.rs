// Command coordinator
//
// Transports hold a cloneable `ControlManager` handle and only ever touch the
// queue and the cached snapshots. The `Coordinator` task is the single owner
// of the chassis: it executes one queued command per tick, refreshes the
// cached state and integrates odometry. Motor calls block, so they run on the
// blocking pool with the chassis moved in and back out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::chassis::Chassis;
use super::odometry::Odometer;
use super::queue::{CommandKind, CommandQueue, MotionCommand, QueuedCommand};
use crate::config::{COORDINATOR_TICK, LOCK_WAIT, ODOMETRY_INTERVAL, STATUS_INTERVAL_MS};
use crate::motor::CarState;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("{resource} lock not acquired within {waited:?}")]
    LockTimeout {
        resource: &'static str,
        waited: Duration,
    },

    #[error("chassis worker panicked; the chassis is gone")]
    ChassisLost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerConfig {
    pub tick: Duration,
    pub odometry_interval: Duration,
    pub status_interval: Duration,
    /// Bound on every state/odometer lock
    pub lock_wait: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick: COORDINATOR_TICK,
            odometry_interval: ODOMETRY_INTERVAL,
            status_interval: Duration::from_millis(STATUS_INTERVAL_MS),
            lock_wait: LOCK_WAIT,
        }
    }
}

struct Shared {
    queue: Mutex<CommandQueue>,
    wake: Notify,
    state: AsyncMutex<CarState>,
    odometer: AsyncMutex<Odometer>,
    status_interval_ms: AtomicU64,
    shutdown: AtomicBool,
    lock_wait: Duration,
}

impl Shared {
    // Never held across an await
    fn queue(&self) -> std::sync::MutexGuard<'_, CommandQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock<'a, T>(
        &self,
        mutex: &'a AsyncMutex<T>,
        resource: &'static str,
    ) -> Result<MutexGuard<'a, T>, ControlError> {
        tokio::time::timeout(self.lock_wait, mutex.lock())
            .await
            .map_err(|_| ControlError::LockTimeout {
                resource,
                waited: self.lock_wait,
            })
    }

    fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.load(Ordering::Relaxed))
    }
}

/// Handle used by every transport
#[derive(Clone)]
pub struct ControlManager {
    shared: Arc<Shared>,
}

impl ControlManager {
    /// Build the coordinator around `chassis` and the handle that feeds it
    pub fn new<C: Chassis>(chassis: C, config: ManagerConfig) -> (Self, Coordinator<C>) {
        let shared = Arc::new(Shared {
            queue: Mutex::new(CommandQueue::new()),
            wake: Notify::new(),
            state: AsyncMutex::new(CarState::default()),
            odometer: AsyncMutex::new(Odometer::default()),
            status_interval_ms: AtomicU64::new(config.status_interval.as_millis() as u64),
            shutdown: AtomicBool::new(false),
            lock_wait: config.lock_wait,
        });

        let now = Instant::now();
        let coordinator = Coordinator {
            shared: Arc::clone(&shared),
            chassis: Some(chassis),
            state: CarState::default(),
            tick: config.tick,
            odometry_interval: config.odometry_interval,
            last_state_refresh: now,
            last_odometry: now,
            speed_deadline: None,
        };
        (Self { shared }, coordinator)
    }

    /// Queue a command; Stop also wakes the coordinator immediately
    pub fn submit(&self, command: MotionCommand) {
        let kind = command.kind();
        self.shared.queue().push(QueuedCommand::now(command));
        debug!("Queued {:?}", kind);

        if kind == CommandKind::Stop {
            self.shared.wake.notify_one();
        }
    }

    /// A speed of all zeros is a stop. The chassis stops by itself
    /// `duration_ms` after the command runs unless that is 0.
    pub fn speed(&self, vx: f32, vy: f32, omega: f32, acceleration: f32, duration_ms: u64) {
        if vx == 0.0 && vy == 0.0 && omega == 0.0 {
            self.stop();
            return;
        }
        self.submit(MotionCommand::Speed {
            vx,
            vy,
            omega,
            acceleration,
            duration: (duration_ms > 0).then(|| Duration::from_millis(duration_ms)),
        });
    }

    pub fn move_distance(
        &self,
        dx: f32,
        dy: f32,
        dtheta: f32,
        acceleration: f32,
        speed: Option<f32>,
        subdivision: u16,
    ) {
        self.submit(MotionCommand::Move {
            dx,
            dy,
            dtheta,
            acceleration,
            speed,
            subdivision,
        });
    }

    /// Clear the queue and halt ahead of anything else
    pub fn stop(&self) {
        info!("Stop requested");
        self.submit(MotionCommand::Stop);
    }

    /// Force a state refresh on the next tick
    pub fn request_status(&self) {
        self.submit(MotionCommand::GetStatus);
    }

    /// Zero the odometer now and once more when the queued reset runs
    pub async fn reset_odometer(&self) {
        self.submit(MotionCommand::ResetOdometer);
        match self.shared.lock(&self.shared.odometer, "odometer").await {
            Ok(mut odometer) => {
                odometer.reset();
                debug!("Odometer reset");
            }
            Err(e) => warn!("Odometer reset deferred: {}", e),
        }
    }

    pub async fn try_car_state(&self) -> Result<CarState, ControlError> {
        Ok(*self.shared.lock(&self.shared.state, "state").await?)
    }

    /// Cached state, or the default if the lock is not acquired in time
    pub async fn car_state(&self) -> CarState {
        self.try_car_state().await.unwrap_or_else(|e| {
            warn!("{}", e);
            CarState::default()
        })
    }

    pub async fn try_odometer(&self) -> Result<Odometer, ControlError> {
        Ok(*self.shared.lock(&self.shared.odometer, "odometer").await?)
    }

    /// Current odometer, or the default if the lock is not acquired in time
    pub async fn odometer(&self) -> Odometer {
        self.try_odometer().await.unwrap_or_else(|e| {
            warn!("{}", e);
            Odometer::default()
        })
    }

    pub fn set_status_interval(&self, interval_ms: u64) {
        debug!("Status refresh interval set to {} ms", interval_ms);
        self.shared
            .status_interval_ms
            .store(interval_ms, Ordering::Relaxed);
    }

    pub fn status_interval(&self) -> Duration {
        self.shared.status_interval()
    }

    /// Pending command kinds in execution order
    pub fn pending(&self) -> Vec<CommandKind> {
        self.shared.queue().kinds()
    }

    /// Ask the coordinator to stop the chassis and exit
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

pub struct Coordinator<C: Chassis> {
    shared: Arc<Shared>,
    /// `None` only while a blocking call holds it
    chassis: Option<C>,
    /// Latest state read by this task; readers see the locked copy
    state: CarState,
    tick: Duration,
    odometry_interval: Duration,
    last_state_refresh: Instant,
    last_odometry: Instant,
    /// When the running timed speed command has to stop
    speed_deadline: Option<Instant>,
}

impl<C: Chassis> Coordinator<C> {
    /// Tick until shutdown, then stop the chassis
    pub async fn run(mut self) -> Result<(), ControlError> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Coordinator started: {:?} tick, {:?} odometry, {:?} status refresh",
            self.tick,
            self.odometry_interval,
            self.shared.status_interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shared.wake.notified() => {}
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.tick().await?;
        }

        info!("Coordinator shutting down");
        if !self.with_chassis(|chassis| chassis.stop()).await? {
            warn!("Final stop failed");
        }
        // The chassis may block on drop
        if let Some(chassis) = self.chassis.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || drop(chassis)).await {
                error!("Chassis release failed: {}", e);
            }
        }
        Ok(())
    }

    /// One coordinator cycle
    pub async fn tick(&mut self) -> Result<(), ControlError> {
        if self.speed_expired() {
            self.speed_deadline = None;
            info!("Speed duration elapsed, stopping");
            if !self.with_chassis(|c| c.stop()).await? {
                warn!("Timed stop failed");
            }
        } else {
            let next = self.shared.queue().pop();
            if let Some(queued) = next {
                self.execute(queued).await?;
            } else if self.last_state_refresh.elapsed() >= self.shared.status_interval() {
                self.refresh_state().await?;
            }
        }

        if self.last_odometry.elapsed() >= self.odometry_interval {
            self.update_odometry().await;
        }
        Ok(())
    }

    async fn execute(&mut self, queued: QueuedCommand) -> Result<(), ControlError> {
        let command = queued.command;
        debug!(
            "Executing {:?} (queued {:?} ago)",
            command,
            queued.submitted_at.elapsed()
        );

        // Failed commands are dropped; transports resubmit if they care
        match command {
            MotionCommand::Speed {
                vx,
                vy,
                omega,
                acceleration,
                duration,
            } => {
                let ok = self
                    .with_chassis(move |c| c.set_speed(vx, vy, omega, acceleration))
                    .await?;
                if !ok {
                    warn!("Speed command failed");
                }
                // Armed even on failure, some wheels may be turning
                self.speed_deadline = duration.map(|d| Instant::now() + d);
            }
            MotionCommand::Move {
                dx,
                dy,
                dtheta,
                acceleration,
                speed,
                subdivision,
            } => {
                let ok = self
                    .with_chassis(move |c| {
                        c.move_distance(dx, dy, dtheta, acceleration, subdivision, speed)
                    })
                    .await?;
                if !ok {
                    warn!("Move command failed");
                }
                self.speed_deadline = None;
            }
            MotionCommand::Stop => {
                self.speed_deadline = None;
                if !self.with_chassis(|c| c.stop()).await? {
                    warn!("Stop command failed");
                }
            }
            MotionCommand::GetStatus => self.refresh_state().await?,
            MotionCommand::ResetOdometer => {
                match self.shared.lock(&self.shared.odometer, "odometer").await {
                    Ok(mut odometer) => odometer.reset(),
                    Err(e) => warn!("Odometer reset skipped: {}", e),
                }
            }
        }
        Ok(())
    }

    // A queued motion command replaces the timed stop
    fn speed_expired(&self) -> bool {
        let Some(deadline) = self.speed_deadline else {
            return false;
        };
        if Instant::now() < deadline {
            return false;
        }
        let queue = self.shared.queue();
        ![CommandKind::Speed, CommandKind::Move, CommandKind::Stop]
            .into_iter()
            .any(|kind| queue.contains(kind))
    }

    async fn refresh_state(&mut self) -> Result<(), ControlError> {
        let state = self.with_chassis(|c| c.car_state()).await?;
        self.state = state;
        self.last_state_refresh = Instant::now();

        match self.shared.lock(&self.shared.state, "state").await {
            Ok(mut cached) => *cached = state,
            Err(e) => warn!("State refresh not published: {}", e),
        }
        Ok(())
    }

    async fn update_odometry(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_odometry).as_secs_f32();
        self.last_odometry = now;

        match self.shared.lock(&self.shared.odometer, "odometer").await {
            Ok(mut odometer) => odometer.integrate(&self.state, dt),
            Err(e) => warn!("Odometry step skipped: {}", e),
        }
    }

    /// Run a blocking chassis call on the blocking pool
    async fn with_chassis<R, F>(&mut self, op: F) -> Result<R, ControlError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut chassis = self.chassis.take().ok_or(ControlError::ChassisLost)?;
        let worker = tokio::task::spawn_blocking(move || {
            let result = op(&mut chassis);
            (chassis, result)
        });

        match worker.await {
            Ok((chassis, result)) => {
                self.chassis = Some(chassis);
                Ok(result)
            }
            Err(e) => {
                error!("Chassis worker failed: {}", e);
                Err(ControlError::ChassisLost)
            }
        }
    }
}
