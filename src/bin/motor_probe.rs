// Motor probe: READ-ONLY check of every motor on the bus
//
// Sends only read commands - nothing is written, nothing moves.
// Run this before the runtime when wiring or addresses change.
//
// Usage: cargo run --bin motor_probe -- --port /dev/ttyUSB0

use chassis_runtime::config::{ChecksumArg, MOTOR_BAUDRATE, MOTOR_PORT, WHEEL_ADDRESSES};
use chassis_runtime::motor::stepper::StepperMotor;
use chassis_runtime::motor::{ChecksumScheme, MotorLink};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const WHEEL_NAMES: [&str; 4] = ["Right front", "Right rear", "Left rear", "Left front"];

#[derive(Debug, Parser)]
#[command(about = "Read-only diagnostic for the stepper motor bus")]
struct Args {
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    #[arg(long, default_value_t = MOTOR_BAUDRATE)]
    baud: u32,

    #[arg(long, value_enum, default_value_t = ChecksumArg::Fixed)]
    checksum: ChecksumArg,

    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    /// Addresses to probe (defaults to the four wheels)
    #[arg(long, value_delimiter = ',')]
    address: Vec<u8>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let scheme = ChecksumScheme::from(args.checksum);
    let timeout = Duration::from_millis(args.timeout_ms);
    let addresses = if args.address.is_empty() {
        WHEEL_ADDRESSES.to_vec()
    } else {
        args.address.clone()
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Stepper Motor Probe (READ-ONLY)                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Serial port: {} @ {} baud, checksum {:?}", args.port, args.baud, scheme);
    println!("Addresses:   {:?}", addresses);
    println!();

    let mut link = match MotorLink::open_with_baudrate(&args.port, args.baud) {
        Ok(link) => {
            println!("  ✓ Serial port opened");
            link
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB-serial adapter is connected");
            println!("  - Check you have permission to open the device");
            return Err(e.into());
        }
    };
    println!();

    for &address in &addresses {
        let name = WHEEL_ADDRESSES
            .iter()
            .position(|&a| a == address)
            .map_or("Motor", |i| WHEEL_NAMES[i]);
        println!("  === {} (address {}) ===", name, address);
        probe(&mut link, StepperMotor::new(address, scheme, timeout));
        println!();
    }

    println!("Probe complete. Speeds should read 0 while the wheels are still.");
    Ok(())
}

fn probe(link: &mut MotorLink, motor: StepperMotor) {
    match motor.read_firmware_version(link) {
        Ok(v) => println!("    Firmware:        0x{:02X} (hardware 0x{:02X})", v.firmware, v.hardware),
        Err(e) => {
            // Nothing else will answer either
            println!("    Firmware:        ✗ {}", e);
            return;
        }
    }

    match motor.read_motor_status(link) {
        Ok(s) => println!(
            "    Status:          enabled={} in_position={} stalled={} stall_protected={}",
            s.enabled(),
            s.in_position(),
            s.stalled(),
            s.stall_protected()
        ),
        Err(e) => println!("    Status:          ✗ {}", e),
    }

    match motor.read_bus_voltage(link) {
        Ok(mv) => println!("    Bus voltage:     {:.2} V", mv as f32 / 1000.0),
        Err(e) => println!("    Bus voltage:     ✗ {}", e),
    }
    match motor.read_phase_current(link) {
        Ok(ma) => println!("    Phase current:   {} mA", ma),
        Err(e) => println!("    Phase current:   ✗ {}", e),
    }
    match motor.read_phase_params(link) {
        Ok(p) => println!("    Phase R / L:     {} mΩ / {} µH", p.resistance, p.inductance),
        Err(e) => println!("    Phase R / L:     ✗ {}", e),
    }
    match motor.read_pid(link) {
        Ok(p) => println!("    PID:             kp={} ki={} kd={}", p.kp, p.ki, p.kd),
        Err(e) => println!("    PID:             ✗ {}", e),
    }
    match motor.read_calibrated_encoder(link) {
        Ok(v) => println!("    Encoder:         {}", v),
        Err(e) => println!("    Encoder:         ✗ {}", e),
    }
    match motor.read_speed(link) {
        Ok(rpm) => println!("    Speed:           {} rpm", rpm),
        Err(e) => println!("    Speed:           ✗ {}", e),
    }
    match motor.read_position(link) {
        Ok(p) => println!("    Position:        {}", p),
        Err(e) => println!("    Position:        ✗ {}", e),
    }
    match motor.read_target_position(link) {
        Ok(p) => println!("    Target position: {}", p),
        Err(e) => println!("    Target position: ✗ {}", e),
    }
    match motor.read_position_error(link) {
        Ok(p) => println!("    Position error:  {}", p),
        Err(e) => println!("    Position error:  ✗ {}", e),
    }
    match motor.read_input_pulse(link) {
        Ok(p) => println!("    Input pulses:    {}", p),
        Err(e) => println!("    Input pulses:    ✗ {}", e),
    }

    match motor.read_driver_config(link) {
        Ok(c) => {
            println!(
                "    Config:          motor type {}, {} microsteps, id {}, stall protection {}",
                c.motor_type, c.subdivision, c.id, c.stall_protection
            );
            println!(
                "                     open-loop {} mA, closed-loop max {} mA, window {:.1}°",
                c.open_loop_current, c.closed_loop_max_current, c.position_window
            );
        }
        Err(e) => println!("    Config:          ✗ {}", e),
    }
    match motor.read_system_status(link) {
        Ok(s) => println!(
            "    System:          {} mV, {} mA, speed {} rpm, position {}, ready 0x{:02X}",
            s.bus_voltage, s.phase_current, s.speed, s.position, s.ready_flags
        ),
        Err(e) => println!("    System:          ✗ {}", e),
    }
}
