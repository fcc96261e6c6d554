//! memory/alloc.rs
//! Host and device allocations with a shared release ledger.
//!
//! Summary: every buffer the pipeline touches is an [`Allocation`]. Pinned
//! memory is a scarce resource that must be released explicitly, so each
//! allocation reports itself to an [`AllocationLedger`] on creation and on
//! drop. Tests read the ledger to prove buffers were released after a failure.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Where an allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryKind {
    /// Host memory registered for direct transfer by the accelerator.
    Pinned,
    /// Ordinary host memory.
    Pageable,
    /// Accelerator-resident memory.
    Device,
}

impl MemoryKind {
    const ALL: [MemoryKind; 3] = [MemoryKind::Pinned, MemoryKind::Pageable, MemoryKind::Device];

    fn slot(self) -> usize {
        match self {
            MemoryKind::Pinned => 0,
            MemoryKind::Pageable => 1,
            MemoryKind::Device => 2,
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryKind::Pinned => "pinned",
            MemoryKind::Pageable => "pageable",
            MemoryKind::Device => "device",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("cannot allocate {requested} bytes of {kind} memory")]
    OutOfMemory { kind: MemoryKind, requested: usize },

    #[error("cannot allocate {requested} bytes of {kind} memory: {available} of {limit} budget bytes left")]
    BudgetExhausted {
        kind: MemoryKind,
        requested: usize,
        available: usize,
        limit: usize,
    },
}

/// Live allocation counters, per memory kind.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    live_bytes: [AtomicUsize; 3],
    live_count: [AtomicUsize; 3],
    total_allocations: AtomicUsize,
}

impl AllocationLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_bytes(&self, kind: MemoryKind) -> usize {
        self.live_bytes[kind.slot()].load(Ordering::Acquire)
    }

    pub fn live_count(&self, kind: MemoryKind) -> usize {
        self.live_count[kind.slot()].load(Ordering::Acquire)
    }

    pub fn total_live_bytes(&self) -> usize {
        MemoryKind::ALL.iter().map(|k| self.live_bytes(*k)).sum()
    }

    pub fn total_live_count(&self) -> usize {
        MemoryKind::ALL.iter().map(|k| self.live_count(*k)).sum()
    }

    /// Number of allocations ever made through this ledger.
    pub fn total_allocations(&self) -> usize {
        self.total_allocations.load(Ordering::Acquire)
    }

    fn record_alloc(&self, kind: MemoryKind, len: usize) {
        self.live_bytes[kind.slot()].fetch_add(len, Ordering::AcqRel);
        self.live_count[kind.slot()].fetch_add(1, Ordering::AcqRel);
        self.total_allocations.fetch_add(1, Ordering::AcqRel);
    }

    fn record_release(&self, kind: MemoryKind, len: usize) {
        self.live_bytes[kind.slot()].fetch_sub(len, Ordering::AcqRel);
        self.live_count[kind.slot()].fetch_sub(1, Ordering::AcqRel);
    }
}

/// A zero-initialised byte region. Released (and un-pinned) on drop.
pub struct Allocation {
    bytes: Vec<u8>,
    kind: MemoryKind,
    ledger: Arc<AllocationLedger>,
}

impl Allocation {
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Deref for Allocation {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for Allocation {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        trace!("[ALLOC] release {} bytes of {} memory", self.bytes.len(), self.kind);
        self.ledger.record_release(self.kind, self.bytes.len());
    }
}

/// Allocation capability the pool and the device draw from.
pub trait Allocator: Send + Sync {
    fn allocate(&self, len: usize, kind: MemoryKind) -> Result<Allocation, AllocError>;
    fn ledger(&self) -> &Arc<AllocationLedger>;
}

/// Plain heap allocator. Pages are zeroed up front so they are fully
/// committed before the first transfer touches them.
#[derive(Debug, Clone)]
pub struct SystemAllocator {
    ledger: Arc<AllocationLedger>,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self { ledger: AllocationLedger::new() }
    }

    pub fn with_ledger(ledger: Arc<AllocationLedger>) -> Self {
        Self { ledger }
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, len: usize, kind: MemoryKind) -> Result<Allocation, AllocError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| AllocError::OutOfMemory { kind, requested: len })?;
        bytes.resize(len, 0);

        self.ledger.record_alloc(kind, len);
        trace!("[ALLOC] {} bytes of {} memory", len, kind);
        Ok(Allocation {
            bytes,
            kind,
            ledger: self.ledger.clone(),
        })
    }

    fn ledger(&self) -> &Arc<AllocationLedger> {
        &self.ledger
    }
}

/// System allocator capped at a fixed number of live bytes (all kinds).
/// Models boards with a small pinned/device memory window.
#[derive(Debug, Clone)]
pub struct LimitedAllocator {
    inner: SystemAllocator,
    limit: usize,
}

impl LimitedAllocator {
    pub fn new(limit: usize) -> Self {
        Self { inner: SystemAllocator::new(), limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Allocator for LimitedAllocator {
    fn allocate(&self, len: usize, kind: MemoryKind) -> Result<Allocation, AllocError> {
        let live = self.inner.ledger.total_live_bytes();
        let available = self.limit.saturating_sub(live);
        if len > available {
            return Err(AllocError::BudgetExhausted {
                kind,
                requested: len,
                available,
                limit: self.limit,
            });
        }
        self.inner.allocate(len, kind)
    }

    fn ledger(&self) -> &Arc<AllocationLedger> {
        self.inner.ledger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_tracks_alloc_and_release() {
        let alloc = SystemAllocator::new();
        let a = alloc.allocate(100, MemoryKind::Pinned).unwrap();
        let b = alloc.allocate(50, MemoryKind::Device).unwrap();
        assert_eq!(alloc.ledger().live_bytes(MemoryKind::Pinned), 100);
        assert_eq!(alloc.ledger().total_live_bytes(), 150);
        assert!(a.iter().all(|&x| x == 0));

        drop(a);
        assert_eq!(alloc.ledger().live_bytes(MemoryKind::Pinned), 0);
        drop(b);
        assert_eq!(alloc.ledger().total_live_count(), 0);
        assert_eq!(alloc.ledger().total_allocations(), 2);
    }

    #[test]
    fn limited_allocator_refuses_past_budget() {
        let alloc = LimitedAllocator::new(1000);
        let _a = alloc.allocate(600, MemoryKind::Pageable).unwrap();
        let err = alloc.allocate(600, MemoryKind::Pageable).unwrap_err();
        assert!(matches!(err, AllocError::BudgetExhausted { available: 400, .. }));
    }
}
