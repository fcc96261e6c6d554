//! memory/pool.rs
//! Ring of reusable buffer sets, one ring per engine.
//!
//! Iterations `0..depth` of an engine get freshly allocated buffer sets;
//! iteration `i >= depth` gets the set of `i % depth`. With the default depth
//! of three, peak memory is three sets per engine whatever the iteration
//! count. Reuse safety does not depend on the depth: the substrate orders a
//! new write into a set after every earlier access to it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{
    input_buffer_size, output_buffer_size, METADATA_RECORD_LEN, PARTIAL_CRC_LEN, RING_DEPTH,
};
use crate::memory::{AllocError, Allocator, InputImage, MemoryKind};
use crate::substrate::{BufferArena, BufferId, Device};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("cannot allocate buffer set {ring_index} for engine {engine}: {source}")]
    SetAllocation {
        engine: usize,
        ring_index: usize,
        #[source]
        source: AllocError,
    },

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error("engine {engine} out of range (pool has {engines})")]
    UnknownEngine { engine: usize, engines: usize },

    #[error("iteration {iteration} of engine {engine} acquired before its predecessors")]
    OutOfOrder { engine: usize, iteration: usize },

    #[error("ring depth must be at least 1")]
    ZeroDepth,
}

/// Byte sizes of every buffer in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub input_len: usize,
    pub device_input: usize,
    pub output: usize,
    pub metadata: usize,
    pub partial_crc: usize,
}

impl BufferLayout {
    pub fn for_input(input_len: usize) -> Self {
        Self {
            input_len,
            device_input: input_buffer_size(input_len),
            output: output_buffer_size(input_len),
            metadata: METADATA_RECORD_LEN,
            partial_crc: PARTIAL_CRC_LEN,
        }
    }

    /// Device bytes in one set.
    pub fn device_bytes(&self) -> usize {
        self.device_input + self.output + self.metadata + self.partial_crc
    }

    /// Host bytes in one set (the pooled output destination).
    pub fn host_bytes(&self) -> usize {
        self.output
    }

    pub fn set_bytes(&self) -> usize {
        self.device_bytes() + self.host_bytes()
    }
}

/// Identities of one physical buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSet {
    pub ring_index: usize,
    pub device_input: BufferId,
    pub device_output: BufferId,
    pub device_metadata: BufferId,
    pub device_crc: BufferId,
    pub host_output: BufferId,
}

impl BufferSet {
    pub fn ids(&self) -> [BufferId; 5] {
        [
            self.device_input,
            self.device_output,
            self.device_metadata,
            self.device_crc,
            self.host_output,
        ]
    }
}

/// Buffers and input view for one (engine, iteration) pair.
#[derive(Debug, Clone)]
pub struct WorkSlot {
    pub engine: usize,
    pub iteration: usize,
    pub set: BufferSet,
    pub input: Arc<InputImage>,
}

pub struct BufferPool {
    arena: Arc<BufferArena>,
    allocator: Arc<dyn Allocator>,
    layout: BufferLayout,
    host_kind: MemoryKind,
    depth: usize,
    rings: Vec<Vec<BufferSet>>,
}

impl BufferPool {
    /// Empty pool for `engines` engines; sets are allocated on first acquire.
    pub fn new(device: &Device, layout: BufferLayout, host_kind: MemoryKind, engines: usize) -> Self {
        Self {
            arena: device.arena().clone(),
            allocator: device.allocator().clone(),
            layout,
            host_kind,
            depth: RING_DEPTH,
            rings: vec![Vec::new(); engines],
        }
    }

    /// Override the ring depth. Only valid before the first acquire.
    pub fn with_ring_depth(mut self, depth: usize) -> Result<Self, PoolError> {
        if depth == 0 {
            return Err(PoolError::ZeroDepth);
        }
        self.depth = depth;
        Ok(self)
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn ring_depth(&self) -> usize {
        self.depth
    }

    pub fn host_kind(&self) -> MemoryKind {
        self.host_kind
    }

    /// Buffers for `iteration` of `engine`.
    ///
    /// Iterations must be acquired in order per engine; a fresh set is
    /// allocated while the ring is filling, afterwards the set at
    /// `iteration % depth` is handed out again.
    pub fn acquire(
        &mut self,
        engine: usize,
        iteration: usize,
        input: &Arc<InputImage>,
    ) -> Result<WorkSlot, PoolError> {
        let engines = self.rings.len();
        if engine >= engines {
            return Err(PoolError::UnknownEngine { engine, engines });
        }

        let ring_index = iteration % self.depth;
        let filled = self.rings[engine].len();
        let set = if ring_index < filled {
            self.rings[engine][ring_index]
        } else if ring_index == filled && iteration < self.depth {
            let set = self.allocate_set(engine, ring_index)?;
            self.rings[engine].push(set);
            set
        } else {
            return Err(PoolError::OutOfOrder { engine, iteration });
        };

        Ok(WorkSlot {
            engine,
            iteration,
            set,
            input: input.clone(),
        })
    }

    fn allocate_set(&self, engine: usize, ring_index: usize) -> Result<BufferSet, PoolError> {
        let wrap = |source| PoolError::SetAllocation { engine, ring_index, source };
        let device = MemoryKind::Device;

        // All five allocations succeed or none is registered; a partial set
        // is released when the locals drop.
        let device_input = self.allocator.allocate(self.layout.device_input, device).map_err(wrap)?;
        let device_output = self.allocator.allocate(self.layout.output, device).map_err(wrap)?;
        let device_metadata = self.allocator.allocate(self.layout.metadata, device).map_err(wrap)?;
        let device_crc = self.allocator.allocate(self.layout.partial_crc, device).map_err(wrap)?;
        let host_output = self.allocator.allocate(self.layout.output, self.host_kind).map_err(wrap)?;

        let set = BufferSet {
            ring_index,
            device_input: self.arena.register(device_input, "device-input"),
            device_output: self.arena.register(device_output, "device-output"),
            device_metadata: self.arena.register(device_metadata, "device-metadata"),
            device_crc: self.arena.register(device_crc, "device-crc"),
            host_output: self.arena.register(host_output, "host-output"),
        };
        debug!(
            "[POOL] engine {} set {} allocated ({} device + {} {} bytes)",
            engine,
            ring_index,
            self.layout.device_bytes(),
            self.layout.host_bytes(),
            self.host_kind
        );
        Ok(set)
    }

    /// Number of physically distinct sets currently held for `engine`.
    pub fn distinct_sets(&self, engine: usize) -> usize {
        self.rings.get(engine).map_or(0, Vec::len)
    }

    /// Return every set to the arena, dropping the underlying allocations.
    pub fn release(&mut self) {
        let mut released = 0;
        for ring in self.rings.iter_mut() {
            for set in ring.drain(..) {
                for id in set.ids() {
                    if self.arena.release(id) {
                        released += 1;
                    }
                }
            }
        }
        if released > 0 {
            info!("[POOL] released {} buffers", released);
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.release();
    }
}
