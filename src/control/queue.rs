// Coalescing command queue
//
// At most one pending command per kind. A newer command of a queued kind
// replaces it in place, Stop clears everything and runs first.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Speed,
    Move,
    Stop,
    GetStatus,
    ResetOdometer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    /// m/s, m/s, rad/s; `None` drives until the next command
    Speed {
        vx: f32,
        vy: f32,
        omega: f32,
        acceleration: f32,
        duration: Option<Duration>,
    },
    /// m, m, rad
    Move {
        dx: f32,
        dy: f32,
        dtheta: f32,
        acceleration: f32,
        speed: Option<f32>,
        subdivision: u16,
    },
    Stop,
    GetStatus,
    ResetOdometer,
}

impl MotionCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            MotionCommand::Speed { .. } => CommandKind::Speed,
            MotionCommand::Move { .. } => CommandKind::Move,
            MotionCommand::Stop => CommandKind::Stop,
            MotionCommand::GetStatus => CommandKind::GetStatus,
            MotionCommand::ResetOdometer => CommandKind::ResetOdometer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedCommand {
    pub command: MotionCommand,
    pub submitted_at: Instant,
}

impl QueuedCommand {
    pub fn now(command: MotionCommand) -> Self {
        Self {
            command,
            submitted_at: Instant::now(),
        }
    }
}

// Slot index per non-Stop kind
fn slot(kind: CommandKind) -> Option<usize> {
    match kind {
        CommandKind::Speed => Some(0),
        CommandKind::Move => Some(1),
        CommandKind::GetStatus => Some(2),
        CommandKind::ResetOdometer => Some(3),
        CommandKind::Stop => None,
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    stop: Option<QueuedCommand>,
    /// (arrival sequence, command); a replacement keeps the original sequence
    slots: [Option<(u64, QueuedCommand)>; 4],
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, queued: QueuedCommand) {
        let Some(index) = slot(queued.command.kind()) else {
            self.slots = Default::default();
            self.stop = Some(queued);
            return;
        };

        match &mut self.slots[index] {
            Some((_, pending)) => *pending = queued,
            empty @ None => {
                *empty = Some((self.next_seq, queued));
                self.next_seq += 1;
            }
        }
    }

    /// Stop first, then the oldest pending kind
    pub fn pop(&mut self) -> Option<QueuedCommand> {
        if let Some(stop) = self.stop.take() {
            return Some(stop);
        }

        let index = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|(seq, _)| (*seq, i)))
            .min()?
            .1;
        self.slots[index].take().map(|(_, queued)| queued)
    }

    pub fn contains(&self, kind: CommandKind) -> bool {
        match slot(kind) {
            Some(index) => self.slots[index].is_some(),
            None => self.stop.is_some(),
        }
    }

    /// Pending kinds in execution order
    pub fn kinds(&self) -> Vec<CommandKind> {
        let mut pending: Vec<(u64, CommandKind)> = self
            .slots
            .iter()
            .flatten()
            .map(|(seq, queued)| (*seq, queued.command.kind()))
            .collect();
        pending.sort_by_key(|(seq, _)| *seq);

        self.stop
            .iter()
            .map(|queued| queued.command.kind())
            .chain(pending.into_iter().map(|(_, kind)| kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stop.iter().count() + self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
