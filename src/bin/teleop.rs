// Keyboard teleop: W/S drive, A/D turn, R/F speed, space stop, Q quit
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::info;

use chassis_runtime::config::{topic, DEVICE_ID, TOPIC_COMMAND};

const SPEEDS: [f64; 3] = [0.1, 0.3, 0.6]; // m/s
const OMEGA_SPEEDS: [f64; 3] = [0.3, 0.8, 1.5]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 150; // Stop after this much time with no input

#[derive(Debug, Parser)]
#[command(about = "Drive the chassis from the keyboard over zenoh")]
struct Args {
    #[arg(long, default_value = DEVICE_ID)]
    device_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session
        .declare_publisher(topic(TOPIC_COMMAND, &args.device_id))
        .await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, SPACE=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Leave the chassis stopped whatever happened
    publisher.put(json!({ "command": "stop" }).to_string()).await?;
    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut vx = 0.0;
    let mut omega = 0.0;
    let mut last_movement_input = Instant::now();
    let mut moving = false;

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        vx = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        vx = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        omega = OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        omega = -OMEGA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char(' ') if pressed => {
                        vx = 0.0;
                        omega = 0.0;
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            vx = 0.0;
            omega = 0.0;
        }

        // Stream speed while moving, then a single stop
        if vx != 0.0 || omega != 0.0 {
            let cmd = json!({ "command": "speed", "vx": vx, "omega": omega });
            publisher.put(cmd.to_string()).await?;
            moving = true;
        } else if moving {
            publisher.put(json!({ "command": "stop" }).to_string()).await?;
            moving = false;
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
