//! Execution substrate: an asynchronous command queue whose ordering comes
//! from buffer identity, not from the caller.
//!
//! Responsibilities:
//! - Track last writer / readers per buffer and derive dependencies
//! - Run commands on executor threads once their dependencies completed
//! - Keep per-command profiling (queue wait vs. execution)
//!
//! Non-responsibilities:
//! - What a command computes
//! - Pool sizing and reuse policy

pub mod arena;
pub mod device;
pub mod event;
pub mod queue;

use std::io;

use thiserror::Error;

use crate::telemetry::Stage;

pub use arena::{AccessMode, BufferArena, BufferHandle, BufferId};
pub use device::{default_executor_threads, Device, DeviceCaps};
pub use event::{Event, EventStatus, Profile};
pub use queue::{Accessors, CommandError, CommandGroup, Queue};

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("command #{event} ({stage:?}) failed: {reason}")]
    CommandFailed { event: u64, stage: Stage, reason: String },

    #[error("unknown or released buffer {0}")]
    UnknownBuffer(BufferId),

    #[error("command queue is closed")]
    QueueClosed,

    #[error("cannot start executor thread: {0}")]
    ExecutorSpawn(#[source] io::Error),
}
