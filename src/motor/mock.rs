// Scripted bus double: records every frame written and answers through a responder

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::link::MotorChannel;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

pub(crate) struct ScriptedChannel {
    responder: Responder,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    pending: VecDeque<u8>,
    silent: bool,
}

impl ScriptedChannel {
    /// `responder` maps a written frame to the reply bytes, `None` for no reply
    pub(crate) fn new(responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            sent: Arc::new(Mutex::new(Vec::new())),
            pending: VecDeque::new(),
            silent: true,
        }
    }

    /// Bytes left over on the line before the first exchange
    pub(crate) fn with_stale(mut self, bytes: Vec<u8>) -> Self {
        self.pending.extend(bytes);
        self.silent = false;
        self
    }

    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }
}

impl MotorChannel for ScriptedChannel {
    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        match (self.responder)(bytes) {
            Some(reply) => {
                self.pending.extend(reply);
                self.silent = false;
            }
            None => self.silent = true,
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.silent {
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            return Ok(0);
        }
        // Hand out a partial reply so callers have to drain the rest
        let n = buf.len().min(2).min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend(self.pending.drain(..));
        Ok(())
    }
}

/// Positive acknowledgement `[addr, func, 0x02, 0x6B]` for any command frame
pub(crate) fn ack(frame: &[u8]) -> Vec<u8> {
    vec![frame[0], frame[1], 0x02, 0x6B]
}
