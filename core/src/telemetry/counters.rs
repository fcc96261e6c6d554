//! telemetry/counters.rs
//! Byte counters accumulated iteration by iteration during validation.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Deterministic counters collected for one engine (or a whole run).
#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounters {
    pub iterations: u64,
    pub bytes_input: u64,
    pub bytes_compressed: u64,
}

impl EngineCounters {
    /// Record one validated iteration.
    pub fn add_iteration(&mut self, input_len: usize, compressed_len: u64) {
        self.iterations += 1;
        self.bytes_input += input_len as u64;
        self.bytes_compressed += compressed_len;
    }

    /// `compressed / input`; 0 when nothing was processed.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_input == 0 {
            return 0.0;
        }
        self.bytes_compressed as f64 / self.bytes_input as f64
    }

    pub fn merge(&mut self, other: &EngineCounters) {
        self.iterations += other.iterations;
        self.bytes_input += other.bytes_input;
        self.bytes_compressed += other.bytes_compressed;
    }
}

impl AddAssign for EngineCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
