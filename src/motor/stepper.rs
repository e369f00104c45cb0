// Closed-loop stepper controller protocol (Emm42 V5 command set)
//
// Multi-byte fields are big-endian. Signed replies carry a separate sign byte
// (0x00 positive, 0x01 negative) followed by an unsigned magnitude.

use std::time::Duration;
use tracing::debug;

use super::checksum::ChecksumScheme;
use super::frame::Frame;
use super::link::{LinkError, MotorLink};

pub type MotorAddress = u8;

/// Address every controller listens to
pub const BROADCAST_ADDRESS: MotorAddress = 0;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Status byte of a positive acknowledgement
const ACK: u8 = 0x02;
/// Command understood but its preconditions were not met
const NACK_CONDITIONS: u8 = 0xE2;
/// Command not recognised; the controller answers with function code 0x00
const NACK_INVALID: u8 = 0xEE;

// Fixed payload bytes and "modify" sub-operations
const ENABLE_MARKER: u8 = 0xAB;
const STOP_MARKER: u8 = 0x98;
const SYNC_MARKER: u8 = 0x66;
const DRIVER_CONFIG_MARKER: u8 = 0x6C;
const SYSTEM_STATUS_MARKER: u8 = 0x7A;
const SUB_SUBDIVISION: u8 = 0x8A;
const SUB_ID: u8 = 0x4B;
const SUB_CONTROL_MODE: u8 = 0x69;
const SUB_OPEN_LOOP_CURRENT: u8 = 0x33;
const SUB_DRIVER_CONFIG: u8 = 0xD1;
const SUB_PID: u8 = 0xC3;
const SUB_SPEED_PARAMS: u8 = 0x1C;
const SUB_SPEED_SCALING: u8 = 0x71;

/// Function codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    // Motion
    Enable = 0xF3,
    SpeedMode = 0xF6,
    PositionMode = 0xFD,
    Stop = 0xFE,
    SyncMove = 0xFF,

    // Reads
    ReadVersion = 0x1F,
    ReadPhaseParams = 0x20,
    ReadPid = 0x21,
    ReadBusVoltage = 0x24,
    ReadPhaseCurrent = 0x27,
    ReadEncoder = 0x31,
    ReadInputPulse = 0x32,
    ReadTargetPosition = 0x33,
    ReadSpeed = 0x35,
    ReadPosition = 0x36,
    ReadPositionError = 0x37,
    ReadMotorStatus = 0x3A,
    ReadDriverConfig = 0x42,
    ReadSystemStatus = 0x43,

    // Parameter changes
    ModifySubdivision = 0x84,
    ModifyId = 0xAE,
    SwitchControlMode = 0x46,
    ModifyOpenLoopCurrent = 0x44,
    ModifyDriverConfig = 0x48,
    ModifyPid = 0x4A,
    StoreSpeedParams = 0xF7,
    ModifySpeedScaling = 0x4F,
}

/// Rotation sense of a speed or position command
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Cw = 0,
    Ccw = 1,
}

impl Direction {
    /// Non-negative values turn CCW, negative values CW
    pub fn of(value: i32) -> Self {
        if value >= 0 { Direction::Ccw } else { Direction::Cw }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    OpenLoop = 0x01,
    ClosedLoop = 0x02,
}

#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("motor {address}: {source}")]
    Link {
        address: MotorAddress,
        #[source]
        source: LinkError,
    },

    #[error("motor {address}: malformed reply to 0x{function:02X}: {reason}")]
    MalformedReply {
        address: MotorAddress,
        function: u8,
        reason: String,
    },

    #[error("motor {address} rejected 0x{function:02X} with status 0x{status:02X}")]
    Rejected {
        address: MotorAddress,
        function: u8,
        status: u8,
    },

    #[error("motor {address}: invalid sign byte 0x{sign:02X} in reply to 0x{function:02X}")]
    InvalidSign {
        address: MotorAddress,
        function: u8,
        sign: u8,
    },
}

pub type Result<T> = std::result::Result<T, MotorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub firmware: u8,
    pub hardware: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseParams {
    /// mΩ
    pub resistance: u16,
    /// µH
    pub inductance: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PidGains {
    pub kp: u32,
    pub ki: u32,
    pub kd: u32,
}

/// Motor status flag byte (0x3A)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorStatus(pub u8);

impl MotorStatus {
    pub fn enabled(self) -> bool {
        self.0 & 0x01 != 0
    }

    pub fn in_position(self) -> bool {
        self.0 & 0x02 != 0
    }

    pub fn stalled(self) -> bool {
        self.0 & 0x04 != 0
    }

    pub fn stall_protected(self) -> bool {
        self.0 & 0x08 != 0
    }
}

/// Driver configuration block (0x42)
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// 25 = 1.8° motor, 50 = 0.9° motor
    pub motor_type: u8,
    pub pulse_control_mode: u8,
    pub comm_port_mode: u8,
    pub en_pin_level: u8,
    pub dir_pin_direction: u8,
    /// Microsteps per full step (a raw 0 means 256)
    pub subdivision: u16,
    pub subdivision_interpolation: bool,
    pub auto_sleep: bool,
    /// mA
    pub open_loop_current: u16,
    /// mA
    pub closed_loop_max_current: u16,
    /// mV
    pub max_output_voltage: u16,
    pub serial_baud_code: u8,
    pub can_rate_code: u8,
    pub id: u8,
    pub comm_checksum: u8,
    pub cmd_response: u8,
    pub stall_protection: bool,
    /// RPM
    pub stall_threshold_speed: u16,
    /// mA
    pub stall_threshold_current: u16,
    /// ms
    pub stall_detection_time: u16,
    /// Degrees
    pub position_window: f32,
}

/// System status block (0x43)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStatus {
    /// mV
    pub bus_voltage: u16,
    /// mA
    pub phase_current: u16,
    pub calibrated_encoder: u16,
    pub target_position: i32,
    /// RPM
    pub speed: i16,
    pub position: i32,
    pub position_error: i32,
    pub ready_flags: u8,
    pub motor_status: MotorStatus,
}

const DRIVER_CONFIG_LEN: usize = 33;
const SYSTEM_STATUS_LEN: usize = 31;

/// One controller on the bus. Holds no bus handle: every call borrows the
/// shared link, so only its owner can talk to the motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperMotor {
    address: MotorAddress,
    scheme: ChecksumScheme,
    timeout: Duration,
}

impl StepperMotor {
    pub fn new(address: MotorAddress, scheme: ChecksumScheme, timeout: Duration) -> Self {
        Self {
            address,
            scheme,
            timeout,
        }
    }

    pub fn address(&self) -> MotorAddress {
        self.address
    }

    // === Motion ===

    pub fn enable(&self, link: &mut MotorLink, enable: bool, sync: bool) -> Result<()> {
        self.command(
            link,
            Function::Enable,
            &[ENABLE_MARKER, enable as u8, sync as u8],
        )
    }

    pub fn set_speed_mode(
        &self,
        link: &mut MotorLink,
        direction: Direction,
        rpm: u16,
        acceleration: u8,
        sync: bool,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(5);
        payload.push(direction as u8);
        payload.extend_from_slice(&rpm.to_be_bytes());
        payload.push(acceleration);
        payload.push(sync as u8);
        self.command(link, Function::SpeedMode, &payload)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_position_mode(
        &self,
        link: &mut MotorLink,
        direction: Direction,
        rpm: u16,
        acceleration: u8,
        pulses: u32,
        absolute: bool,
        sync: bool,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(10);
        payload.push(direction as u8);
        payload.extend_from_slice(&rpm.to_be_bytes());
        payload.push(acceleration);
        payload.extend_from_slice(&pulses.to_be_bytes());
        payload.push(absolute as u8);
        payload.push(sync as u8);
        self.command(link, Function::PositionMode, &payload)
    }

    pub fn stop(&self, link: &mut MotorLink, sync: bool) -> Result<()> {
        self.command(link, Function::Stop, &[STOP_MARKER, sync as u8])
    }

    /// Start every motor that was armed with `sync = true`
    pub fn sync_move(&self, link: &mut MotorLink) -> Result<()> {
        self.command(link, Function::SyncMove, &[SYNC_MARKER])
    }

    // === Reads ===

    pub fn read_firmware_version(&self, link: &mut MotorLink) -> Result<FirmwareVersion> {
        let r = self.query(link, Function::ReadVersion, &[], 5)?;
        Ok(FirmwareVersion {
            firmware: r[2],
            hardware: r[3],
        })
    }

    pub fn read_phase_params(&self, link: &mut MotorLink) -> Result<PhaseParams> {
        let r = self.query(link, Function::ReadPhaseParams, &[], 7)?;
        Ok(PhaseParams {
            resistance: be16(&r[2..]),
            inductance: be16(&r[4..]),
        })
    }

    pub fn read_pid(&self, link: &mut MotorLink) -> Result<PidGains> {
        let r = self.query(link, Function::ReadPid, &[], 15)?;
        Ok(PidGains {
            kp: be32(&r[2..]),
            ki: be32(&r[6..]),
            kd: be32(&r[10..]),
        })
    }

    /// mV
    pub fn read_bus_voltage(&self, link: &mut MotorLink) -> Result<u16> {
        let r = self.query(link, Function::ReadBusVoltage, &[], 5)?;
        Ok(be16(&r[2..]))
    }

    /// mA
    pub fn read_phase_current(&self, link: &mut MotorLink) -> Result<u16> {
        let r = self.query(link, Function::ReadPhaseCurrent, &[], 5)?;
        Ok(be16(&r[2..]))
    }

    pub fn read_calibrated_encoder(&self, link: &mut MotorLink) -> Result<u16> {
        let r = self.query(link, Function::ReadEncoder, &[], 5)?;
        Ok(be16(&r[2..]))
    }

    pub fn read_input_pulse(&self, link: &mut MotorLink) -> Result<i32> {
        self.read_signed32(link, Function::ReadInputPulse)
    }

    pub fn read_target_position(&self, link: &mut MotorLink) -> Result<i32> {
        self.read_signed32(link, Function::ReadTargetPosition)
    }

    /// RPM, signed by rotation sense
    pub fn read_speed(&self, link: &mut MotorLink) -> Result<i16> {
        let r = self.query(link, Function::ReadSpeed, &[], 6)?;
        self.signed16(Function::ReadSpeed, r[2], be16(&r[3..]))
    }

    pub fn read_position(&self, link: &mut MotorLink) -> Result<i32> {
        self.read_signed32(link, Function::ReadPosition)
    }

    pub fn read_position_error(&self, link: &mut MotorLink) -> Result<i32> {
        self.read_signed32(link, Function::ReadPositionError)
    }

    pub fn read_motor_status(&self, link: &mut MotorLink) -> Result<MotorStatus> {
        let r = self.query(link, Function::ReadMotorStatus, &[], 4)?;
        Ok(MotorStatus(r[2]))
    }

    pub fn read_driver_config(&self, link: &mut MotorLink) -> Result<DriverConfig> {
        let f = Function::ReadDriverConfig;
        let r = self.query(link, f, &[DRIVER_CONFIG_MARKER], DRIVER_CONFIG_LEN)?;
        self.check_block_header(f, &r)?;

        let subdivision = match r[9] {
            0 => 256,
            n => n as u16,
        };
        Ok(DriverConfig {
            motor_type: r[4],
            pulse_control_mode: r[5],
            comm_port_mode: r[6],
            en_pin_level: r[7],
            dir_pin_direction: r[8],
            subdivision,
            subdivision_interpolation: r[10] != 0,
            auto_sleep: r[11] != 0,
            open_loop_current: be16(&r[12..]),
            closed_loop_max_current: be16(&r[14..]),
            max_output_voltage: be16(&r[16..]),
            serial_baud_code: r[18],
            can_rate_code: r[19],
            id: r[20],
            comm_checksum: r[21],
            cmd_response: r[22],
            stall_protection: r[23] != 0,
            stall_threshold_speed: be16(&r[24..]),
            stall_threshold_current: be16(&r[26..]),
            stall_detection_time: be16(&r[28..]),
            position_window: be16(&r[30..]) as f32 * 0.1,
        })
    }

    pub fn read_system_status(&self, link: &mut MotorLink) -> Result<SystemStatus> {
        let f = Function::ReadSystemStatus;
        let r = self.query(link, f, &[SYSTEM_STATUS_MARKER], SYSTEM_STATUS_LEN)?;
        self.check_block_header(f, &r)?;

        Ok(SystemStatus {
            bus_voltage: be16(&r[4..]),
            phase_current: be16(&r[6..]),
            calibrated_encoder: be16(&r[8..]),
            target_position: self.signed32(f, r[10], be32(&r[11..]))?,
            speed: self.signed16(f, r[15], be16(&r[16..]))?,
            position: self.signed32(f, r[18], be32(&r[19..]))?,
            position_error: self.signed32(f, r[23], be32(&r[24..]))?,
            ready_flags: r[28],
            motor_status: MotorStatus(r[29]),
        })
    }

    // === Parameter changes ===
    // `store` persists the change across power cycles

    /// 0 selects 256 microsteps
    pub fn modify_subdivision(&self, link: &mut MotorLink, subdivision: u8, store: bool) -> Result<()> {
        self.command(
            link,
            Function::ModifySubdivision,
            &[SUB_SUBDIVISION, store as u8, subdivision],
        )
    }

    /// Re-address the controller; this handle follows it on success
    pub fn modify_id(&mut self, link: &mut MotorLink, new_id: MotorAddress, store: bool) -> Result<()> {
        self.command(link, Function::ModifyId, &[SUB_ID, store as u8, new_id])?;
        self.address = new_id;
        Ok(())
    }

    pub fn switch_control_mode(&self, link: &mut MotorLink, mode: ControlMode, store: bool) -> Result<()> {
        self.command(
            link,
            Function::SwitchControlMode,
            &[SUB_CONTROL_MODE, store as u8, mode as u8],
        )
    }

    /// mA
    pub fn modify_open_loop_current(&self, link: &mut MotorLink, current: u16, store: bool) -> Result<()> {
        let [hi, lo] = current.to_be_bytes();
        self.command(
            link,
            Function::ModifyOpenLoopCurrent,
            &[SUB_OPEN_LOOP_CURRENT, store as u8, hi, lo],
        )
    }

    /// `config` is the raw parameter block in device order
    pub fn modify_driver_config(&self, link: &mut MotorLink, config: &[u8], store: bool) -> Result<()> {
        let mut payload = Vec::with_capacity(config.len() + 2);
        payload.push(SUB_DRIVER_CONFIG);
        payload.push(store as u8);
        payload.extend_from_slice(config);
        self.command(link, Function::ModifyDriverConfig, &payload)
    }

    pub fn modify_pid(&self, link: &mut MotorLink, gains: PidGains, store: bool) -> Result<()> {
        let mut payload = Vec::with_capacity(14);
        payload.push(SUB_PID);
        payload.push(store as u8);
        payload.extend_from_slice(&gains.kp.to_be_bytes());
        payload.extend_from_slice(&gains.ki.to_be_bytes());
        payload.extend_from_slice(&gains.kd.to_be_bytes());
        self.command(link, Function::ModifyPid, &payload)
    }

    /// Speed-mode parameters run automatically at power-up
    pub fn store_speed_params(
        &self,
        link: &mut MotorLink,
        direction: Direction,
        rpm: u16,
        acceleration: u8,
        en_pin_control: bool,
        store: bool,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(7);
        payload.push(SUB_SPEED_PARAMS);
        payload.push(store as u8);
        payload.push(direction as u8);
        payload.extend_from_slice(&rpm.to_be_bytes());
        payload.push(acceleration);
        payload.push(en_pin_control as u8);
        self.command(link, Function::StoreSpeedParams, &payload)
    }

    /// When enabled, commanded speeds are interpreted in 0.1 RPM
    pub fn modify_speed_scaling(&self, link: &mut MotorLink, enable: bool, store: bool) -> Result<()> {
        self.command(
            link,
            Function::ModifySpeedScaling,
            &[SUB_SPEED_SCALING, store as u8, enable as u8],
        )
    }

    // === Plumbing ===

    fn request(&self, link: &mut MotorLink, function: Function, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = Frame::build(self.address, function as u8, payload, self.scheme);
        let reply = link
            .exchange(&frame, self.scheme, self.timeout)
            .map_err(|source| MotorError::Link {
                address: self.address,
                source,
            })?;

        // The link guarantees at least [addr, func, checksum]
        if reply[0] != self.address {
            return Err(self.malformed(function, format!("reply from address {}", reply[0])));
        }
        if reply[1] != function as u8 {
            if reply[1] == 0x00 && reply[2] == NACK_INVALID {
                return Err(MotorError::Rejected {
                    address: self.address,
                    function: function as u8,
                    status: NACK_INVALID,
                });
            }
            return Err(self.malformed(function, format!("function code 0x{:02X}", reply[1])));
        }
        Ok(reply)
    }

    /// Send a command that is answered with `[addr, func, status, checksum]`
    fn command(&self, link: &mut MotorLink, function: Function, payload: &[u8]) -> Result<()> {
        debug!("motor {}: {:?} {:02X?}", self.address, function, payload);
        let reply = self.request(link, function, payload)?;
        match reply.as_slice() {
            [_, _, ACK, _] => Ok(()),
            [_, _, status @ (NACK_CONDITIONS | NACK_INVALID), _] => Err(MotorError::Rejected {
                address: self.address,
                function: function as u8,
                status: *status,
            }),
            _ => Err(self.malformed(function, format!("unexpected acknowledgement {:02X?}", reply))),
        }
    }

    /// Send a read and require an exact reply length
    fn query(
        &self,
        link: &mut MotorLink,
        function: Function,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>> {
        let reply = self.request(link, function, payload)?;
        if reply.len() != expected_len {
            return Err(self.malformed(
                function,
                format!("expected {} bytes, got {}", expected_len, reply.len()),
            ));
        }
        Ok(reply)
    }

    fn read_signed32(&self, link: &mut MotorLink, function: Function) -> Result<i32> {
        let r = self.query(link, function, &[], 8)?;
        self.signed32(function, r[2], be32(&r[3..]))
    }

    // Byte count and parameter count lead the 0x42 / 0x43 blocks
    fn check_block_header(&self, function: Function, reply: &[u8]) -> Result<()> {
        if reply[2] as usize != reply.len() {
            return Err(self.malformed(
                function,
                format!("byte count {} for a {}-byte reply", reply[2], reply.len()),
            ));
        }
        Ok(())
    }

    fn signed16(&self, function: Function, sign: u8, magnitude: u16) -> Result<i16> {
        let value = self.apply_sign(function, sign, magnitude as i64)?;
        i16::try_from(value).map_err(|_| self.malformed(function, format!("{} out of range", value)))
    }

    fn signed32(&self, function: Function, sign: u8, magnitude: u32) -> Result<i32> {
        let value = self.apply_sign(function, sign, magnitude as i64)?;
        i32::try_from(value).map_err(|_| self.malformed(function, format!("{} out of range", value)))
    }

    fn apply_sign(&self, function: Function, sign: u8, magnitude: i64) -> Result<i64> {
        match sign {
            0x00 => Ok(magnitude),
            0x01 => Ok(-magnitude),
            _ => Err(MotorError::InvalidSign {
                address: self.address,
                function: function as u8,
                sign,
            }),
        }
    }

    fn malformed(&self, function: Function, reason: String) -> MotorError {
        MotorError::MalformedReply {
            address: self.address,
            function: function as u8,
            reason,
        }
    }
}

fn be16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
