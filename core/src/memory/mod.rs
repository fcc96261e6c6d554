//! Buffer lifecycle: allocation, the shared input image, and the per-engine
//! ring of reusable buffer sets.

pub mod alloc;
pub mod image;
pub mod pool;

pub use alloc::{AllocError, Allocation, AllocationLedger, Allocator, LimitedAllocator, MemoryKind, SystemAllocator};
pub use image::InputImage;
pub use pool::{BufferLayout, BufferPool, BufferSet, PoolError, WorkSlot};
