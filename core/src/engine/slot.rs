//! Per-slot bookkeeping: the four completion handles of one (engine,
//! iteration) chain and the host scalars its metadata transfer fills in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{GzipOutInfo, OutStatus};
use crate::memory::WorkSlot;
use crate::substrate::Event;

/// Host copy of a slot's device metadata, valid once the metadata transfer
/// completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotReadback {
    pub compressed_size: u64,
    pub status: u32,
    pub partial_crc: u32,
}

impl SlotReadback {
    pub fn from_device(info: GzipOutInfo, partial_crc: u32) -> Self {
        Self {
            compressed_size: info.compression_sz,
            status: info.status,
            partial_crc,
        }
    }

    pub fn status(&self) -> OutStatus {
        OutStatus::from_bits_truncate(self.status)
    }
}

/// Shared cell the metadata command writes and the validator reads.
#[derive(Debug, Clone, Default)]
pub struct ReadbackCell(Arc<Mutex<SlotReadback>>);

impl ReadbackCell {
    fn lock(&self) -> MutexGuard<'_, SlotReadback> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self, value: SlotReadback) {
        *self.lock() = value;
    }

    pub fn load(&self) -> SlotReadback {
        *self.lock()
    }
}

#[derive(Debug, Clone)]
pub struct SlotHandles {
    pub input: Event,
    pub compute: Event,
    pub output: Event,
    pub metadata: Event,
}

impl SlotHandles {
    /// Handles the completion barrier waits on. Input and compute are
    /// covered by data dependency.
    pub fn barrier(&self) -> [&Event; 2] {
        [&self.output, &self.metadata]
    }
}

#[derive(Debug, Clone)]
pub struct SlotSubmission {
    pub slot: WorkSlot,
    pub handles: SlotHandles,
    pub readback: ReadbackCell,
}

/// Flat table of submissions, indexed `engine * iterations + iteration`.
#[derive(Debug)]
pub struct SlotTable {
    engines: usize,
    iterations: usize,
    entries: Vec<Option<SlotSubmission>>,
}

impl SlotTable {
    pub fn new(engines: usize, iterations: usize) -> Self {
        Self {
            engines,
            iterations,
            entries: vec![None; engines * iterations],
        }
    }

    pub fn engines(&self) -> usize {
        self.engines
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn index(&self, engine: usize, iteration: usize) -> Option<usize> {
        (engine < self.engines && iteration < self.iterations)
            .then(|| engine * self.iterations + iteration)
    }

    pub fn insert(&mut self, submission: SlotSubmission) {
        if let Some(i) = self.index(submission.slot.engine, submission.slot.iteration) {
            self.entries[i] = Some(submission);
        }
    }

    /// Submissions of one engine in iteration order.
    pub fn engine(&self, engine: usize) -> impl Iterator<Item = &SlotSubmission> {
        let range = match self.index(engine, 0) {
            Some(start) => start..start + self.iterations,
            None => 0..0,
        };
        self.entries[range].iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotSubmission> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
