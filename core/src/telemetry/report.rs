//! telemetry/report.rs
//! Throughput and compression ratio report.
//!
//! Diagnostic only: nothing here affects pass/fail. Stage throughput is
//! `iterations * input_len / summed execution time`, which for bytes per
//! nanosecond reads directly as GB/s.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::telemetry::{EngineCounters, Stage, StageTimes};

/// Bytes per nanosecond, i.e. GB/s. Zero when no time was recorded.
pub fn gbps(bytes: u64, dur: Duration) -> f64 {
    let ns = dur.as_nanos();
    if ns == 0 {
        return 0.0;
    }
    bytes as f64 / ns as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineThroughput {
    pub engine: usize,
    pub stage_gbps: BTreeMap<Stage, f64>,
    pub stage_times: StageTimes,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThroughputReport {
    pub input_len: usize,
    pub iterations: usize,
    pub engines: Vec<EngineThroughput>,
    /// All engines together, from wall-clock time of the submit + wait window.
    pub total_gbps: f64,
    /// `total compressed / (input_len * iterations * engines)`.
    pub compression_ratio: f64,
    pub wall_time: Duration,
}

impl ThroughputReport {
    pub fn build(
        input_len: usize,
        iterations: usize,
        per_engine: &[StageTimes],
        totals: &EngineCounters,
        wall_time: Duration,
    ) -> Self {
        let per_engine_bytes = (iterations * input_len) as u64;

        let engines = per_engine
            .iter()
            .enumerate()
            .map(|(engine, times)| {
                let stage_gbps = Stage::BREAKDOWN
                    .iter()
                    .filter(|s| times.contains(**s))
                    .map(|s| (*s, gbps(per_engine_bytes, times.get(*s))))
                    .collect();
                EngineThroughput {
                    engine,
                    stage_gbps,
                    stage_times: times.clone(),
                }
            })
            .collect::<Vec<_>>();

        let total_bytes = per_engine_bytes * engines.len() as u64;

        Self {
            input_len,
            iterations,
            engines,
            total_gbps: gbps(total_bytes, wall_time),
            compression_ratio: totals.compression_ratio(),
            wall_time,
        }
    }

    pub fn ratio_percent(&self) -> f64 {
        self.compression_ratio * 100.0
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Throughput: {:.4} GB/s", self.total_gbps)?;
        writeln!(f)?;
        for engine in &self.engines {
            writeln!(f, "TP breakdown for engine #{} (GB/s)", engine.engine)?;
            for (stage, rate) in &engine.stage_gbps {
                writeln!(f, "{} = {:.4}", stage, rate)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Compression Ratio {:.2}%", self.ratio_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_rates_use_summed_exec_time() {
        let mut times = StageTimes::default();
        times.add(Stage::InputTransfer, Duration::from_nanos(2_000));
        times.add(Stage::Compute, Duration::from_nanos(8_000));

        let mut totals = EngineCounters::default();
        totals.add_iteration(1_000, 250);
        totals.add_iteration(1_000, 250);

        let report = ThroughputReport::build(1_000, 2, &[times], &totals, Duration::from_nanos(10_000));
        let engine = &report.engines[0];
        assert_eq!(engine.stage_gbps[&Stage::InputTransfer], 1.0);
        assert_eq!(engine.stage_gbps[&Stage::Compute], 0.25);
        assert!(!engine.stage_gbps.contains_key(&Stage::Crc));
        assert_eq!(report.total_gbps, 0.2);
        assert!((report.ratio_percent() - 25.0).abs() < 1e-9);

        let text = report.to_string();
        assert!(text.contains("TP breakdown for engine #0"));
        assert!(text.contains("Compression Ratio 25.00%"));
    }

    #[test]
    fn split_lz77_and_huffman_get_their_own_rows() {
        let mut times = StageTimes::default();
        times.add(Stage::Crc, Duration::from_nanos(1_000));
        times.add(Stage::Lz77, Duration::from_nanos(4_000));
        times.add(Stage::Huffman, Duration::from_nanos(2_000));

        let mut totals = EngineCounters::default();
        totals.add_iteration(1_000, 500);

        let report = ThroughputReport::build(1_000, 1, &[times], &totals, Duration::from_nanos(8_000));
        let engine = &report.engines[0];
        assert_eq!(engine.stage_gbps[&Stage::Lz77], 0.25);
        assert_eq!(engine.stage_gbps[&Stage::Huffman], 0.5);
        assert!(!engine.stage_gbps.contains_key(&Stage::Deflate));

        let text = report.to_string();
        assert!(text.contains("LZ77 = 0.2500"));
        assert!(text.contains("Huffman Encoding = 0.5000"));
        assert!(!text.contains("LZ77 + Huffman"));
    }
}
