//! The accelerator as the orchestrator sees it: capabilities, one command
//! queue, a buffer arena and the allocator buffers are drawn from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MemoryPreference;
use crate::memory::{Allocator, MemoryKind, SystemAllocator};
use crate::substrate::{BufferArena, Queue, SubstrateError};

/// Capabilities probed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCaps {
    pub name: String,
    /// Device can transfer directly from host allocations (pre-pinning).
    pub host_allocations: bool,
}

impl DeviceCaps {
    pub fn emulator() -> Self {
        Self {
            name: "accel-gzip software emulator".to_string(),
            host_allocations: true,
        }
    }
}

pub struct Device {
    caps: DeviceCaps,
    allocator: Arc<dyn Allocator>,
    // Declared before the arena: dropping the queue joins the executors
    // while buffers are still registered.
    queue: Queue,
    arena: Arc<BufferArena>,
}

impl Device {
    pub fn new(
        caps: DeviceCaps,
        allocator: Arc<dyn Allocator>,
        executor_threads: usize,
    ) -> Result<Self, SubstrateError> {
        let arena = BufferArena::new();
        let queue = Queue::new(arena.clone(), executor_threads)?;
        info!("[DEVICE] {} ({} executor threads)", caps.name, queue.executor_threads());
        Ok(Self { caps, allocator, queue, arena })
    }

    /// Software device backed by the system allocator.
    pub fn emulator(executor_threads: usize) -> Result<Self, SubstrateError> {
        Self::new(DeviceCaps::emulator(), Arc::new(SystemAllocator::new()), executor_threads)
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn name(&self) -> &str {
        &self.caps.name
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn arena(&self) -> &Arc<BufferArena> {
        &self.arena
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Decide once per run whether host buffers are pinned.
    pub fn resolve_host_memory(&self, preference: MemoryPreference) -> MemoryKind {
        match (preference, self.caps.host_allocations) {
            (MemoryPreference::Pageable, _) => MemoryKind::Pageable,
            (_, true) => MemoryKind::Pinned,
            (MemoryPreference::Pinned, false) => {
                warn!(
                    "[DEVICE] host allocations are not supported on {}, pre-pinning disabled; \
                     transfers may be slower than expected",
                    self.caps.name
                );
                MemoryKind::Pageable
            }
            (MemoryPreference::Auto, false) => MemoryKind::Pageable,
        }
    }
}

/// Executor threads for `engines` engines: enough for every engine to have a
/// transfer and a compute in flight, at least the core count.
pub fn default_executor_threads(engines: usize) -> usize {
    num_cpus::get().max(engines * 2).max(2)
}
