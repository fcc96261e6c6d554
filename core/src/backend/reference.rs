//! Software compute stage: CRC via crc32fast, LZ77 + Huffman via flate2's
//! raw deflate encoder. Stands in for the accelerator kernels.

use std::io::Write;
use std::time::Instant;

use flate2::{write::DeflateEncoder, Compression};

use crate::backend::{BackendError, CompressedBlock, CompressionBackend};
use crate::constants::{DEFAULT_DEFLATE_LEVEL, NATIVE_VECTOR_WIDTH};
use crate::crc::{aligned_prefix_len, crc32};
use crate::telemetry::{Stage, StageTimes};

pub struct ReferenceBackend {
    level: Compression,
    crc_block: usize,
}

impl ReferenceBackend {
    pub fn new(level: u32) -> Self {
        let level = match level {
            0..=9 => Compression::new(level),
            _ => Compression::default(),
        };
        Self {
            level,
            crc_block: NATIVE_VECTOR_WIDTH,
        }
    }

    /// Use a different CRC block granularity (must be non-zero).
    pub fn with_crc_block(mut self, block: usize) -> Self {
        self.crc_block = block.max(1);
        self
    }

    fn stage_err(msg: impl ToString) -> BackendError {
        BackendError::StageFailed {
            stage: "deflate".into(),
            msg: msg.to_string(),
        }
    }
}

impl Default for ReferenceBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DEFLATE_LEVEL)
    }
}

impl CompressionBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference-deflate"
    }

    fn crc_block_size(&self) -> usize {
        self.crc_block
    }

    fn compress(&self, input: &[u8]) -> Result<CompressedBlock, BackendError> {
        let mut sub_stages = StageTimes::default();

        let start = Instant::now();
        let aligned = aligned_prefix_len(input.len(), self.crc_block);
        let partial_crc = crc32(&input[..aligned]);
        sub_stages.add(Stage::Crc, start.elapsed());

        let start = Instant::now();
        let mut enc = DeflateEncoder::new(Vec::with_capacity(input.len() / 2 + 64), self.level);
        enc.write_all(input).map_err(Self::stage_err)?;
        let data = enc.finish().map_err(Self::stage_err)?;
        sub_stages.add(Stage::Deflate, start.elapsed());

        Ok(CompressedBlock { data, partial_crc, sub_stages })
    }
}
