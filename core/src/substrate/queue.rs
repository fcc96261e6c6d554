//! substrate/queue.rs
//! Non-blocking command submission onto a FIFO executor pool.
//!
//! `submit` only records dependencies and enqueues; it never waits. Executors
//! take commands in submission order, wait for the command's dependencies,
//! then run it. Because a command's dependencies were always submitted (and
//! therefore dequeued) before it, the oldest unfinished command can always
//! make progress, whatever the number of executor threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::backend::BackendError;
use crate::memory::Allocation;
use crate::substrate::arena::Grant;
use crate::substrate::{AccessMode, BufferArena, BufferId, Event, SubstrateError};
use crate::telemetry::{Stage, StageTimes};

/// Failure inside a running command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{id} accessed as {mode:?} but not declared by the command group")]
    UndeclaredAccess { id: BufferId, mode: AccessMode },

    #[error("{id} holds {capacity} bytes, command needs {needed}")]
    OutOfBounds { id: BufferId, needed: usize, capacity: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("command panicked: {0}")]
    Panicked(String),
}

/// Declared buffer accesses of one command.
#[derive(Debug, Clone)]
pub struct CommandGroup {
    stage: Stage,
    accesses: Vec<(BufferId, AccessMode)>,
}

impl CommandGroup {
    pub fn new(stage: Stage) -> Self {
        Self { stage, accesses: Vec::new() }
    }

    pub fn read(mut self, id: BufferId) -> Self {
        self.accesses.push((id, AccessMode::Read));
        self
    }

    pub fn write(mut self, id: BufferId) -> Self {
        self.accesses.push((id, AccessMode::Write));
        self
    }

    pub fn discard_write(mut self, id: BufferId) -> Self {
        self.accesses.push((id, AccessMode::DiscardWrite));
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Guarded access to the buffers a command declared.
pub struct Accessors {
    grants: Vec<Grant>,
}

impl Accessors {
    fn grant(&self, id: BufferId, write: bool) -> Result<&Grant, CommandError> {
        let mode = if write { AccessMode::Write } else { AccessMode::Read };
        self.grants
            .iter()
            .find(|g| g.id == id && (!write || g.mode.writes()))
            .ok_or(CommandError::UndeclaredAccess { id, mode })
    }

    pub fn read(&self, id: BufferId) -> Result<RwLockReadGuard<'_, Allocation>, CommandError> {
        let grant = self.grant(id, false)?;
        Ok(grant.handle.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn write(&self, id: BufferId) -> Result<RwLockWriteGuard<'_, Allocation>, CommandError> {
        let grant = self.grant(id, true)?;
        Ok(grant.handle.write().unwrap_or_else(PoisonError::into_inner))
    }
}

type Action = Box<dyn FnOnce(&Accessors) -> Result<StageTimes, CommandError> + Send>;

struct Task {
    event: Event,
    deps: Vec<Event>,
    accessors: Accessors,
    action: Action,
}

pub struct Queue {
    arena: Arc<BufferArena>,
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    next_event: AtomicU64,
}

impl Queue {
    /// Start `threads` executor threads (at least one).
    pub fn new(arena: Arc<BufferArena>, threads: usize) -> Result<Self, SubstrateError> {
        let (tx, rx) = unbounded::<Task>();
        let threads = threads.max(1);

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("accel-exec-{i}"))
                .spawn(move || run_executor(rx))
                .map_err(SubstrateError::ExecutorSpawn)?;
            workers.push(handle);
        }
        debug!("[QUEUE] started {} executor threads", threads);

        Ok(Self {
            arena,
            tx: Some(tx),
            workers,
            next_event: AtomicU64::new(0),
        })
    }

    pub fn executor_threads(&self) -> usize {
        self.workers.len()
    }

    pub fn arena(&self) -> &Arc<BufferArena> {
        &self.arena
    }

    /// Enqueue a command. Returns immediately with its completion handle.
    pub fn submit<F>(&self, group: CommandGroup, action: F) -> Result<Event, SubstrateError>
    where
        F: FnOnce(&Accessors) -> Result<StageTimes, CommandError> + Send + 'static,
    {
        let id = self.next_event.fetch_add(1, Ordering::Relaxed);
        let event = Event::new(id, group.stage);
        let (deps, grants) = self.arena.track(&group.accesses, &event)?;
        trace!("[QUEUE] submit #{} {:?} with {} deps", id, group.stage, deps.len());

        let task = Task {
            event: event.clone(),
            deps,
            accessors: Accessors { grants },
            action: Box::new(action),
        };
        let tx = self.tx.as_ref().ok_or(SubstrateError::QueueClosed)?;
        tx.send(task).map_err(|_| SubstrateError::QueueClosed)?;
        Ok(event)
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        // Closing the channel lets every executor drain and exit.
        drop(self.tx.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_executor(rx: Receiver<Task>) {
    while let Ok(task) = rx.recv() {
        execute(task);
    }
}

fn execute(task: Task) {
    let Task { event, deps, accessors, action } = task;

    for dep in &deps {
        if let Err(e) = dep.wait() {
            warn!("[QUEUE] #{} skipped: dependency #{} failed", event.id(), dep.id());
            event.fail(format!("dependency failed: {e}"));
            return;
        }
    }
    drop(deps);

    event.mark_running();
    let result = panic::catch_unwind(AssertUnwindSafe(|| action(&accessors)))
        .unwrap_or_else(|payload| Err(CommandError::Panicked(panic_message(&payload))));
    // Release buffer handles before signalling so a waiter that then frees
    // the pool really frees the memory.
    drop(accessors);

    match result {
        Ok(sub_stages) => event.complete(sub_stages),
        Err(e) => {
            warn!("[QUEUE] #{} {:?} failed: {}", event.id(), event.stage(), e);
            event.fail(e.to_string());
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
