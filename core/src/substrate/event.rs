//! Completion handles for submitted commands.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::substrate::SubstrateError;
use crate::telemetry::{Stage, StageTimes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Queued,
    Running,
    Complete,
    Failed(String),
}

impl EventStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, EventStatus::Complete | EventStatus::Failed(_))
    }
}

/// Execution profile of a finished command.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Submit to start: time spent waiting on dependencies and executors.
    pub queued: Duration,
    /// Start to end: time the command actually ran.
    pub exec: Duration,
    /// Breakdown reported by the command itself (compute sub-stages).
    pub sub_stages: StageTimes,
}

struct EventState {
    status: EventStatus,
    started: Option<Instant>,
    ended: Option<Instant>,
    sub_stages: StageTimes,
}

struct EventInner {
    id: u64,
    stage: Stage,
    submitted: Instant,
    state: Mutex<EventState>,
    done: Condvar,
}

/// Shared handle to one submitted command.
#[derive(Clone)]
pub struct Event(Arc<EventInner>);

fn lock(m: &Mutex<EventState>) -> MutexGuard<'_, EventState> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Event {
    pub(crate) fn new(id: u64, stage: Stage) -> Self {
        Event(Arc::new(EventInner {
            id,
            stage,
            submitted: Instant::now(),
            state: Mutex::new(EventState {
                status: EventStatus::Queued,
                started: None,
                ended: None,
                sub_stages: StageTimes::default(),
            }),
            done: Condvar::new(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn stage(&self) -> Stage {
        self.0.stage
    }

    pub fn status(&self) -> EventStatus {
        lock(&self.0.state).status.clone()
    }

    pub fn is_done(&self) -> bool {
        lock(&self.0.state).status.is_done()
    }

    /// Block until the command finished. Errors if it failed.
    pub fn wait(&self) -> Result<(), SubstrateError> {
        let mut state = lock(&self.0.state);
        while !state.status.is_done() {
            state = self.0.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        match &state.status {
            EventStatus::Failed(reason) => Err(SubstrateError::CommandFailed {
                event: self.0.id,
                stage: self.0.stage,
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Execution profile; blocks until the command finished.
    pub fn profile(&self) -> Result<Profile, SubstrateError> {
        self.wait()?;
        let state = lock(&self.0.state);
        let started = state.started.unwrap_or(self.0.submitted);
        let ended = state.ended.unwrap_or(started);
        Ok(Profile {
            queued: started.duration_since(self.0.submitted),
            exec: ended.duration_since(started),
            sub_stages: state.sub_stages.clone(),
        })
    }

    /// Pure execution time (end - start) of the command.
    pub fn exec_time(&self) -> Result<Duration, SubstrateError> {
        Ok(self.profile()?.exec)
    }

    pub(crate) fn mark_running(&self) {
        let mut state = lock(&self.0.state);
        state.status = EventStatus::Running;
        state.started = Some(Instant::now());
    }

    pub(crate) fn complete(&self, sub_stages: StageTimes) {
        let mut state = lock(&self.0.state);
        state.ended = Some(Instant::now());
        state.sub_stages = sub_stages;
        state.status = EventStatus::Complete;
        self.0.done.notify_all();
    }

    pub(crate) fn fail(&self, reason: String) {
        let mut state = lock(&self.0.state);
        let now = Instant::now();
        state.started.get_or_insert(now);
        state.ended = Some(now);
        state.status = EventStatus::Failed(reason);
        self.0.done.notify_all();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.0.id)
            .field("stage", &self.0.stage)
            .field("status", &self.status())
            .finish()
    }
}
