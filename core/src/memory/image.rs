//! The input file, loaded once and shared read-only by every engine.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::constants::{IN_OUT_PADDING, MIN_INPUT_SIZE};
use crate::memory::{Allocation, Allocator, MemoryKind};
use crate::types::{AccelError, AccelResult};

/// Contiguous copy of the input. Never mutated after load.
pub struct InputImage {
    alloc: Allocation,
    len: usize,
}

impl InputImage {
    /// Read `path` fully into a fresh allocation of `kind` memory.
    ///
    /// Inputs shorter than [`MIN_INPUT_SIZE`] are rejected before any buffer
    /// is allocated.
    pub fn load(path: &Path, allocator: &dyn Allocator, kind: MemoryKind) -> AccelResult<Arc<Self>> {
        let unreadable = |source| AccelError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(unreadable)?;
        let len = file.metadata().map_err(unreadable)?.len() as usize;
        if len < MIN_INPUT_SIZE {
            return Err(AccelError::InputTooSmall { len, min: MIN_INPUT_SIZE });
        }

        let mut alloc = allocator.allocate(len + IN_OUT_PADDING, kind)?;
        file.read_exact(&mut alloc[..len]).map_err(unreadable)?;
        debug!("[IMAGE] loaded {} bytes from {} into {} memory", len, path.display(), kind);

        Ok(Arc::new(Self { alloc, len }))
    }

    /// Build an image from bytes already in memory (same size rules as `load`).
    pub fn from_bytes(data: &[u8], allocator: &dyn Allocator, kind: MemoryKind) -> AccelResult<Arc<Self>> {
        if data.len() < MIN_INPUT_SIZE {
            return Err(AccelError::InputTooSmall { len: data.len(), min: MIN_INPUT_SIZE });
        }
        let mut alloc = allocator.allocate(data.len() + IN_OUT_PADDING, kind)?;
        alloc[..data.len()].copy_from_slice(data);
        Ok(Arc::new(Self { alloc, len: data.len() }))
    }

    /// The logical input bytes (padding excluded).
    pub fn as_bytes(&self) -> &[u8] {
        &self.alloc[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.alloc.kind()
    }
}

impl fmt::Debug for InputImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputImage")
            .field("len", &self.len)
            .field("kind", &self.alloc.kind())
            .finish()
    }
}
