//! telemetry/timers.rs
//! Stage timers for the transfer/compute chain.
//!
//! Summary: records execution time per pipeline stage. Durations are taken
//! from substrate event profiles, never re-measured around a wait.

use std::collections::{hash_map, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Host to device copy of the input image.
    InputTransfer,
    /// Whole compute stage invocation.
    Compute,
    /// Compute sub-stage: CRC over the aligned prefix.
    Crc,
    /// Compute sub-stage: LZ77 match finding + Huffman encoding, when a
    /// stage times them together.
    Deflate,
    /// Compute sub-stage: LZ77 match finding alone.
    Lz77,
    /// Compute sub-stage: Huffman encoding alone.
    Huffman,
    /// Device to host copy of the compressed bytes.
    OutputTransfer,
    /// Device to host copy of size + partial CRC.
    MetadataTransfer,
}

impl Stage {
    /// Stages listed in the per-engine throughput breakdown.
    pub const BREAKDOWN: [Stage; 7] = [
        Stage::Crc,
        Stage::Lz77,
        Stage::Huffman,
        Stage::Deflate,
        Stage::Compute,
        Stage::InputTransfer,
        Stage::OutputTransfer,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::InputTransfer    => "DMA host-to-device",
            Stage::Compute          => "Compute",
            Stage::Crc              => "CRC",
            Stage::Deflate          => "LZ77 + Huffman Encoding",
            Stage::Lz77             => "LZ77",
            Stage::Huffman          => "Huffman Encoding",
            Stage::OutputTransfer   => "DMA device-to-host",
            Stage::MetadataTransfer => "DMA metadata",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimes {
    times: HashMap<Stage, Duration>,
}

impl StageTimes {
    /// Add duration to a stage (accumulates if already present).
    pub fn add(&mut self, stage: Stage, dur: Duration) {
        *self.times.entry(stage).or_insert(Duration::ZERO) += dur;
    }

    /// Get total duration for a stage.
    pub fn get(&self, stage: Stage) -> Duration {
        self.times.get(&stage).copied().unwrap_or(Duration::ZERO)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.times.contains_key(&stage)
    }

    /// Fold another set of stage times into this one.
    pub fn merge(&mut self, other: &StageTimes) {
        for (stage, dur) in other {
            self.add(*stage, *dur);
        }
    }

    pub fn total(&self) -> Duration {
        self.times.values().copied().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stage, &Duration)> {
        self.times.iter()
    }
}

impl<'a> IntoIterator for &'a StageTimes {
    type Item = (&'a Stage, &'a Duration);
    type IntoIter = hash_map::Iter<'a, Stage, Duration>;

    fn into_iter(self) -> Self::IntoIter {
        self.times.iter()
    }
}

/// Wall-clock timer around the submit + wait window of one run.
#[derive(Clone, Debug)]
pub struct TelemetryTimer {
    pub start_time: Instant,
    pub end_time: Option<Instant>,
}

impl TelemetryTimer {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
        }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => Instant::now().duration_since(self.start_time),
        }
    }
}

impl Default for TelemetryTimer {
    fn default() -> Self {
        Self::new()
    }
}
