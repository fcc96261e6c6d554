//! crc/mod.rs
//! CRC-32 (gzip variant, reflected, poly 0xEDB88320) and reconciliation of
//! the compute stage's partial CRC with the host-side tail.
//!
//! The stage only checksums the prefix of the input that fills whole
//! processing blocks. The host extends that partial value over the remaining
//! bytes, using it as the initial CRC state, so the result is bit-identical to
//! a single pass over the whole input.

use crc32fast::Hasher;

/// One-pass CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Length of the largest prefix of `len` bytes made of whole `block`s.
pub fn aligned_prefix_len(len: usize, block: usize) -> usize {
    let block = block.max(1);
    len - len % block
}

/// Extend `partial_crc` (CRC-32 of `input[..aligned_len]`) over the rest of
/// `input`.
pub fn reconcile(partial_crc: u32, input: &[u8], aligned_len: usize) -> u32 {
    let tail = &input[aligned_len.min(input.len())..];
    let mut hasher = Hasher::new_with_initial(partial_crc);
    hasher.update(tail);
    hasher.finalize()
}

/// Reconciler bound to one compute stage's block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcReconciler {
    block_size: usize,
}

impl CrcReconciler {
    pub fn new(block_size: usize) -> Self {
        Self { block_size: block_size.max(1) }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn aligned_len(&self, len: usize) -> usize {
        aligned_prefix_len(len, self.block_size)
    }

    pub fn reconcile(&self, partial_crc: u32, input: &[u8]) -> u32 {
        reconcile(partial_crc, input, self.aligned_len(input.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn aligned_prefix_rounds_down() {
        assert_eq!(aligned_prefix_len(33, 16), 32);
        assert_eq!(aligned_prefix_len(32, 16), 32);
        assert_eq!(aligned_prefix_len(15, 16), 0);
        assert_eq!(aligned_prefix_len(15, 0), 15);
    }

    #[test]
    fn reconciler_extends_partial() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let r = CrcReconciler::new(16);
        let partial = crc32(&data[..r.aligned_len(data.len())]);
        assert_eq!(r.reconcile(partial, data), crc32(data));
    }
}
