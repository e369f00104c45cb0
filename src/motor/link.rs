// Request/response exchange over the shared motor bus
//
// Every motor sits on the same serial line and replies cannot be told apart,
// so a link is owned by exactly one task and `exchange` takes `&mut self`.

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::checksum::ChecksumScheme;
use super::frame::{self, Frame, FrameError};

/// Default serial configuration for the stepper controllers
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Pause after the first reply bytes arrive so a frame still streaming in is not truncated
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("reply was empty")]
    Empty,

    #[error("invalid reply frame: {0}")]
    Frame(#[from] FrameError),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Byte-level access to the bus, implemented by the serial port and by test doubles
pub trait MotorChannel: Send {
    /// Drop anything already queued for reading
    fn discard_input(&mut self) -> io::Result<()>;

    /// Write the whole frame and wait until it has left the buffer
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block until at least one byte is available or `timeout` elapses.
    /// Expiry is reported as `ErrorKind::TimedOut`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Append every byte that is currently available without blocking
    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()>;
}

impl MotorChannel for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.set_timeout(timeout).map_err(io::Error::from)?;
        self.read(buf)
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        loop {
            let pending = self.bytes_to_read().map_err(io::Error::from)? as usize;
            if pending == 0 {
                return Ok(());
            }
            let start = out.len();
            out.resize(start + pending, 0);
            let n = self.read(&mut out[start..])?;
            out.truncate(start + n);
            if n == 0 {
                return Ok(());
            }
        }
    }
}

/// One physical bus shared by every motor address
pub struct MotorLink {
    channel: Box<dyn MotorChannel>,
    settle: Duration,
}

impl MotorLink {
    /// Open the serial port at the default baudrate
    pub fn open(port_name: &str) -> Result<Self, LinkError> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, baudrate).open()?;
        Ok(Self::new(Box::new(port)))
    }

    pub fn new(channel: Box<dyn MotorChannel>) -> Self {
        Self {
            channel,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Send `frame` and return the validated reply (checksum byte included)
    pub fn exchange(
        &mut self,
        frame: &Frame,
        scheme: ChecksumScheme,
        timeout: Duration,
    ) -> Result<Vec<u8>, LinkError> {
        // Stale bytes from an abandoned exchange would be read as our reply
        self.channel.discard_input()?;

        debug!("tx {:02X?}", frame.as_bytes());
        self.channel.send(frame.as_bytes())?;

        let mut first = [0u8; 64];
        let n = match self.channel.recv(&mut first, timeout) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(LinkError::Timeout(timeout));
            }
            Err(e) => return Err(LinkError::Io(e)),
        };
        if n == 0 {
            return Err(LinkError::Empty);
        }

        let mut reply = first[..n].to_vec();
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        self.channel.drain(&mut reply)?;
        debug!("rx {:02X?}", reply);

        frame::parse_and_validate(&reply, scheme)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::mock::ScriptedChannel;

    fn link(channel: ScriptedChannel) -> MotorLink {
        MotorLink::new(Box::new(channel)).with_settle(Duration::ZERO)
    }

    #[test]
    fn test_exchange_returns_full_reply() {
        let channel = ScriptedChannel::new(|_| Some(vec![0x01, 0x35, 0x00, 0x01, 0x2C, 0x6B]));
        let sent = channel.sent();
        let mut link = link(channel);

        let frame = Frame::build(1, 0x35, &[], ChecksumScheme::Fixed);
        let reply = link
            .exchange(&frame, ChecksumScheme::Fixed, Duration::from_millis(100))
            .unwrap();

        // The double hands out two bytes per recv, so this also covers draining
        assert_eq!(reply, vec![0x01, 0x35, 0x00, 0x01, 0x2C, 0x6B]);
        assert_eq!(sent.lock().unwrap().as_slice(), &[vec![0x01, 0x35, 0x6B]]);
    }

    #[test]
    fn test_stale_input_is_discarded() {
        let channel = ScriptedChannel::new(|_| Some(vec![0x01, 0xF3, 0x02, 0x6B]))
            .with_stale(vec![0x09, 0x09, 0x09]);
        let mut link = link(channel);

        let frame = Frame::build(1, 0xF3, &[0xAB, 0x01, 0x00], ChecksumScheme::Fixed);
        let reply = link
            .exchange(&frame, ChecksumScheme::Fixed, Duration::from_millis(100))
            .unwrap();
        assert_eq!(reply, vec![0x01, 0xF3, 0x02, 0x6B]);
    }

    #[test]
    fn test_silent_device_times_out() {
        let mut link = link(ScriptedChannel::new(|_| None));
        let frame = Frame::build(4, 0x35, &[], ChecksumScheme::Fixed);
        let err = link
            .exchange(&frame, ChecksumScheme::Fixed, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout(t) if t == Duration::from_millis(50)));
    }

    #[test]
    fn test_empty_read() {
        let mut link = link(ScriptedChannel::new(|_| Some(Vec::new())));
        let frame = Frame::build(4, 0x35, &[], ChecksumScheme::Fixed);
        let err = link
            .exchange(&frame, ChecksumScheme::Fixed, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, LinkError::Empty));
    }

    #[test]
    fn test_bad_checksum_surfaces() {
        let mut link = link(ScriptedChannel::new(|_| Some(vec![0x01, 0xF3, 0x02, 0x00])));
        let frame = Frame::build(1, 0xF3, &[0xAB, 0x01, 0x00], ChecksumScheme::Xor);
        let err = link
            .exchange(&frame, ChecksumScheme::Xor, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::ChecksumMismatch { .. })
        ));
    }
}
