use std::fmt;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::telemetry::StageTimes;

/// Result of one compute stage invocation.
#[derive(Debug, Clone, Default)]
pub struct CompressedBlock {
    /// Raw deflate stream (no container).
    pub data: Vec<u8>,
    /// CRC-32 over the block-aligned prefix of the input.
    pub partial_crc: u32,
    /// Optional sub-stage breakdown measured inside the invocation.
    pub sub_stages: StageTimes,
}

impl CompressedBlock {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The opaque compute stage (CRC + LZ77 + Huffman).
///
/// Implementations must be deterministic for identical input. They are shared
/// by every engine, so `compress` takes `&self`.
pub trait CompressionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Granularity of the stage's CRC; bytes past the last whole block are
    /// left for the host to fold in.
    fn crc_block_size(&self) -> usize;

    fn compress(&self, input: &[u8]) -> Result<CompressedBlock, BackendError>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("compute stage {stage} failed: {msg}")]
    StageFailed { stage: String, msg: String },
}

bitflags! {
    /// Status bits the compute stage reports next to the compressed size.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutStatus: u32 {
        const VALID    = 0x0001;
        /// Stream did not fit the output buffer and was truncated.
        const OVERFLOW = 0x0002;
    }
}

/// Device metadata record written by the compute stage.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GzipOutInfo {
    pub compression_sz: u64,
    pub status: u32,
    pub reserved: u32,
}

impl GzipOutInfo {
    pub fn new(compression_sz: u64, status: OutStatus) -> Self {
        Self {
            compression_sz,
            status: status.bits(),
            reserved: 0,
        }
    }

    pub fn status(&self) -> OutStatus {
        OutStatus::from_bits_truncate(self.status)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Decode from the head of a metadata buffer.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        let len = std::mem::size_of::<Self>();
        buf.get(..len).map(bytemuck::pod_read_unaligned)
    }
}

impl fmt::Debug for GzipOutInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipOutInfo")
            .field("compression_sz", &self.compression_sz)
            .field("status", &self.status())
            .finish()
    }
}
