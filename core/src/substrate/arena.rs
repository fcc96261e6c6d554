//! substrate/arena.rs
//! Registry of device and host buffers with per-buffer dependency tracking.
//!
//! Each buffer remembers the last command that wrote it and every command
//! that read it since. A new command touching the buffer depends on:
//! - read: the last writer
//! - write: the last writer and every reader since that write
//!
//! This is what lets the driver submit iteration `i + 3` into the buffers of
//! iteration `i` without waiting on anything itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::trace;

use crate::memory::Allocation;
use crate::substrate::{Event, SubstrateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    /// Write without preserving previous contents. Same ordering as `Write`.
    DiscardWrite,
}

impl AccessMode {
    pub fn writes(self) -> bool {
        !matches!(self, AccessMode::Read)
    }
}

pub type BufferHandle = Arc<RwLock<Allocation>>;

struct ArenaEntry {
    label: &'static str,
    handle: BufferHandle,
    last_writer: Option<Event>,
    readers: Vec<Event>,
}

#[derive(Default)]
struct ArenaInner {
    entries: HashMap<BufferId, ArenaEntry>,
    next_id: u64,
}

/// Buffer access granted to one command.
#[derive(Clone)]
pub(crate) struct Grant {
    pub id: BufferId,
    pub mode: AccessMode,
    pub handle: BufferHandle,
}

#[derive(Default)]
pub struct BufferArena {
    inner: Mutex<ArenaInner>,
}

impl BufferArena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, ArenaInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of an allocation and hand back its identity.
    pub fn register(&self, alloc: Allocation, label: &'static str) -> BufferId {
        let mut inner = self.lock();
        let id = BufferId(inner.next_id);
        inner.next_id += 1;
        trace!("[ARENA] register {} ({}, {} bytes)", id, label, alloc.len());
        inner.entries.insert(
            id,
            ArenaEntry {
                label,
                handle: Arc::new(RwLock::new(alloc)),
                last_writer: None,
                readers: Vec::new(),
            },
        );
        id
    }

    /// Drop the arena's reference to a buffer. Returns false if unknown.
    pub fn release(&self, id: BufferId) -> bool {
        let removed = self.lock().entries.remove(&id);
        if let Some(entry) = &removed {
            trace!("[ARENA] release {} ({})", id, entry.label);
        }
        removed.is_some()
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct handle to a buffer, for host-side reads after completion.
    pub fn handle(&self, id: BufferId) -> Option<BufferHandle> {
        self.lock().entries.get(&id).map(|e| e.handle.clone())
    }

    /// Resolve a command's accesses, collect its dependencies and record it
    /// as the newest reader/writer of each buffer. Atomic per command.
    pub(crate) fn track(
        &self,
        accesses: &[(BufferId, AccessMode)],
        event: &Event,
    ) -> Result<(Vec<Event>, Vec<Grant>), SubstrateError> {
        let mut inner = self.lock();

        // Resolve first so an unknown id leaves tracking untouched.
        let mut grants: Vec<Grant> = Vec::with_capacity(accesses.len());
        for (id, mode) in accesses {
            let entry = inner.entries.get(id).ok_or(SubstrateError::UnknownBuffer(*id))?;
            match grants.iter_mut().find(|g| g.id == *id) {
                Some(g) if mode.writes() => g.mode = *mode,
                Some(_) => {}
                None => grants.push(Grant {
                    id: *id,
                    mode: *mode,
                    handle: entry.handle.clone(),
                }),
            }
        }

        let mut deps: Vec<Event> = Vec::new();
        let mut push_dep = |ev: &Event| {
            if !ev.is_done() && !deps.iter().any(|d| d.id() == ev.id()) {
                deps.push(ev.clone());
            }
        };

        for grant in &grants {
            let Some(entry) = inner.entries.get_mut(&grant.id) else {
                continue;
            };
            entry.readers.retain(|r| !r.is_done());

            if let Some(writer) = &entry.last_writer {
                push_dep(writer);
            }
            if grant.mode.writes() {
                for reader in &entry.readers {
                    push_dep(reader);
                }
                entry.readers.clear();
                entry.last_writer = Some(event.clone());
            } else {
                entry.readers.push(event.clone());
            }
        }

        Ok((deps, grants))
    }
}
