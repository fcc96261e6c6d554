//! engine/completion.rs
//! The single wait barrier, then per-slot validation, CRC reconciliation and
//! per-engine aggregation.

use std::sync::PoisonError;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::backend::OutStatus;
use crate::crc::CrcReconciler;
use crate::engine::slot::{SlotSubmission, SlotTable};
use crate::memory::InputImage;
use crate::substrate::{BufferArena, SubstrateError};
use crate::telemetry::{EngineCounters, Stage, StageTimes};
use crate::types::{AccelError, AccelResult};

/// Outcome of one engine after validation.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResult {
    pub engine: usize,
    /// Compressed size of iteration 0 (the artifact).
    pub compressed_size: u64,
    /// Reconciled CRC-32 of the input, identical for every iteration.
    pub final_crc: u32,
    pub counters: EngineCounters,
    pub stage_times: StageTimes,
    /// Raw deflate payload of iteration 0.
    #[serde(skip)]
    pub artifact: Bytes,
}

impl EngineResult {
    pub fn total_compressed(&self) -> u64 {
        self.counters.bytes_compressed
    }
}

pub struct Completion {
    reconciler: CrcReconciler,
}

impl Completion {
    pub fn new(crc_block_size: usize) -> Self {
        Self {
            reconciler: CrcReconciler::new(crc_block_size),
        }
    }

    /// Block until every output and metadata transfer finished.
    ///
    /// Waits on all of them even after a failure so nothing is still running
    /// when the caller releases the pool. Returns the first failure.
    pub fn wait_all(&self, table: &SlotTable) -> Result<(), SubstrateError> {
        let mut first_err = None;
        for sub in table.iter() {
            for event in sub.handles.barrier() {
                if let Err(e) = event.wait() {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => {
                error!("[COMPLETION] {}", e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Wait, then validate every slot and aggregate per engine.
    pub fn collect(
        &self,
        table: &SlotTable,
        input: &InputImage,
        arena: &BufferArena,
    ) -> AccelResult<Vec<EngineResult>> {
        self.wait_all(table)?;
        (0..table.engines())
            .map(|engine| self.collect_engine(table, engine, input, arena))
            .collect()
    }

    fn collect_engine(
        &self,
        table: &SlotTable,
        engine: usize,
        input: &InputImage,
        arena: &BufferArena,
    ) -> AccelResult<EngineResult> {
        let mut counters = EngineCounters::default();
        let mut stage_times = StageTimes::default();
        let mut expected_crc: Option<u32> = None;
        let mut first: Option<(&SlotSubmission, u64)> = None;

        for sub in table.engine(engine) {
            let iteration = sub.slot.iteration;
            let rb = sub.readback.load();

            if rb.compressed_size > input.len() as u64 {
                error!(
                    "[COMPLETION] engine {} iteration {}: {} compressed bytes for {} input bytes",
                    engine,
                    iteration,
                    rb.compressed_size,
                    input.len()
                );
                return Err(AccelError::ContractViolation {
                    engine,
                    iteration,
                    compressed: rb.compressed_size,
                    input: input.len(),
                });
            }
            if rb.status().contains(OutStatus::OVERFLOW) {
                return Err(AccelError::OutputOverflow { engine, iteration });
            }

            let crc = self.reconciler.reconcile(rb.partial_crc, input.as_bytes());
            match expected_crc {
                None => expected_crc = Some(crc),
                Some(expected) if expected != crc => {
                    return Err(AccelError::Nondeterministic { engine, iteration, expected, got: crc });
                }
                Some(_) => {}
            }

            match first {
                None => first = Some((sub, rb.compressed_size)),
                Some((_, expected)) if expected != rb.compressed_size => {
                    error!(
                        "[COMPLETION] engine {} iteration {}: {} compressed bytes, iteration 0 had {}",
                        engine, iteration, rb.compressed_size, expected
                    );
                    return Err(AccelError::SizeDrift {
                        engine,
                        iteration,
                        expected,
                        got: rb.compressed_size,
                    });
                }
                Some(_) => {}
            }

            counters.add_iteration(input.len(), rb.compressed_size);
            stage_times.merge(&slot_exec_times(sub)?);
        }

        let (first, compressed_size) = match first {
            Some(f) => f,
            None => return Err(AccelError::Config(format!("engine {engine} has no submitted iterations"))),
        };
        let artifact = read_host_output(arena, first, compressed_size)?;
        debug!(
            "[COMPLETION] engine {}: {} iterations, crc {:#010x}, first size {}",
            engine, counters.iterations, expected_crc.unwrap_or(0), compressed_size
        );

        Ok(EngineResult {
            engine,
            compressed_size,
            final_crc: expected_crc.unwrap_or(0),
            counters,
            stage_times,
            artifact,
        })
    }
}

/// Execution time of each stage of one slot, from its event profiles.
fn slot_exec_times(sub: &SlotSubmission) -> Result<StageTimes, SubstrateError> {
    let mut times = StageTimes::default();
    let h = &sub.handles;
    for event in [&h.input, &h.compute, &h.output, &h.metadata] {
        let profile = event.profile()?;
        times.add(event.stage(), profile.exec);
        times.merge(&profile.sub_stages);
    }
    Ok(times)
}

/// Copy the first `len` bytes of a slot's pooled host output.
///
/// The set may have been reused by later iterations. Every iteration
/// reported the same compressed size and input CRC, so the bytes left there
/// are taken as iteration 0's; a stage whose output changes at equal size
/// goes unnoticed here and is caught only for verified artifacts.
fn read_host_output(arena: &BufferArena, sub: &SlotSubmission, len: u64) -> AccelResult<Bytes> {
    let id = sub.slot.set.host_output;
    let handle = arena.handle(id).ok_or(SubstrateError::UnknownBuffer(id))?;
    let buf = handle.read().unwrap_or_else(PoisonError::into_inner);
    let len = len as usize;
    if len > buf.len() {
        warn!("[COMPLETION] host output {} holds {} bytes, need {}", id, buf.len(), len);
        return Err(AccelError::OutputOverflow {
            engine: sub.slot.engine,
            iteration: sub.slot.iteration,
        });
    }
    Ok(Bytes::copy_from_slice(&buf[..len]))
}

/// Engine that spent the most time in compute.
pub fn busiest_engine(results: &[EngineResult]) -> Option<(usize, Duration)> {
    results
        .iter()
        .map(|r| (r.engine, r.stage_times.get(Stage::Compute)))
        .max_by_key(|(_, d)| *d)
}
