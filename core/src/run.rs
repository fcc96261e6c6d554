//! run.rs
//! One compression run end to end: load, acquire, submit, barrier, validate,
//! release, then artifacts, verification and the report.
//!
//! Warm-up and measurement are the same run with different `iterations` and
//! `report` settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{make_backend, CompressionBackend};
use crate::config::RunConfig;
use crate::engine::{busiest_engine, Completion, EngineResult, PipelineDriver};
use crate::gzip::{ArtifactVerifier, ArtifactWriter, GzipFileWriter, GzipMember, GzipVerifier};
use crate::memory::{BufferLayout, BufferPool, InputImage};
use crate::substrate::Device;
use crate::telemetry::{EngineCounters, StageTimes, TelemetryTimer, ThroughputReport};
use crate::types::{AccelError, AccelResult};
use crate::utils::format_bytes;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_len: usize,
    pub iterations: usize,
    pub engines: Vec<EngineResult>,
    /// Present in report mode only.
    pub report: Option<ThroughputReport>,
    /// Artifacts written, one per engine (empty without report).
    pub artifacts: Vec<PathBuf>,
    /// Verification ran and every checked artifact matched the input.
    pub passed: bool,
}

pub struct Runner<'d> {
    device: &'d Device,
    backend: Arc<dyn CompressionBackend>,
    writer: Arc<dyn ArtifactWriter>,
    verifier: Arc<dyn ArtifactVerifier>,
}

impl<'d> Runner<'d> {
    pub fn new(device: &'d Device, backend: Arc<dyn CompressionBackend>) -> Self {
        Self {
            device,
            backend,
            writer: Arc::new(GzipFileWriter),
            verifier: Arc::new(GzipVerifier),
        }
    }

    /// Runner with the compute stage named in `config`.
    pub fn from_config(device: &'d Device, config: &RunConfig) -> Self {
        Self::new(device, make_backend(config.backend))
    }

    pub fn with_writer(mut self, writer: Arc<dyn ArtifactWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ArtifactVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    /// Compress `input` `config.iterations` times on each of `config.engines`
    /// engines. In report mode `outputs` needs one path per engine.
    pub fn compress_file(&self, input: &Path, outputs: &[PathBuf], config: &RunConfig) -> AccelResult<RunSummary> {
        config.validate()?;
        if config.report && outputs.len() < config.engines {
            return Err(AccelError::Config(format!(
                "{} output paths for {} engines",
                outputs.len(),
                config.engines
            )));
        }

        let host_kind = self.device.resolve_host_memory(config.memory);
        let image = InputImage::load(input, self.device.allocator().as_ref(), host_kind)?;
        info!(
            "[RUN] {} ({}), {} engines x {} iterations, {} host memory",
            input.display(),
            format_bytes(image.len() as u64),
            config.engines,
            config.iterations,
            host_kind
        );

        let (results, wall) = self.execute(&image, config)?;
        let input_len = image.len();
        drop(image);

        if !config.report {
            return Ok(RunSummary {
                input_len,
                iterations: config.iterations,
                engines: results,
                report: None,
                artifacts: Vec::new(),
                passed: false,
            });
        }

        let artifacts = self.write_artifacts(input, input_len, outputs, &results)?;
        let checked = config.verify.engines(results.len());
        for artifact in &artifacts[..checked] {
            self.verifier.verify(artifact, input)?;
        }

        let per_engine: Vec<StageTimes> = results.iter().map(|r| r.stage_times.clone()).collect();
        let mut totals = EngineCounters::default();
        for r in &results {
            totals.merge(&r.counters);
        }
        let report = ThroughputReport::build(input_len, config.iterations, &per_engine, &totals, wall);
        if let Some((engine, compute)) = busiest_engine(&results) {
            debug!("[RUN] busiest engine #{} ({:?} in compute)", engine, compute);
        }

        Ok(RunSummary {
            input_len,
            iterations: config.iterations,
            engines: results,
            report: Some(report),
            artifacts,
            passed: checked > 0,
        })
    }

    /// Pool, submit, barrier, validate. The pool is released before
    /// returning, on success and on error.
    fn execute(
        &self,
        image: &Arc<InputImage>,
        config: &RunConfig,
    ) -> AccelResult<(Vec<EngineResult>, Duration)> {
        let layout = BufferLayout::for_input(image.len());
        let mut pool = BufferPool::new(self.device, layout, image.memory_kind(), config.engines)
            .with_ring_depth(config.ring_depth)?;
        let driver = PipelineDriver::new(self.device, self.backend.clone());
        let completion = Completion::new(self.backend.crc_block_size());

        let slots = driver.acquire_all(&mut pool, image, config.engines, config.iterations)?;
        let mut timer = TelemetryTimer::new();
        let table = driver.submit_all(slots, config.engines, config.iterations)?;
        let waited = completion.wait_all(&table);
        timer.finish();
        let collected = waited
            .map_err(AccelError::from)
            .and_then(|()| completion.collect(&table, image, self.device.arena()));

        // Barrier already passed (or drained on failure); nothing in flight.
        drop(table);
        pool.release();
        let results = collected?;
        Ok((results, timer.elapsed()))
    }

    fn write_artifacts(
        &self,
        input: &Path,
        input_len: usize,
        outputs: &[PathBuf],
        results: &[EngineResult],
    ) -> AccelResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(results.len());
        for (result, path) in results.iter().zip(outputs) {
            let member = GzipMember::for_input(input, result.final_crc, input_len);
            self.writer.write(path, &member, &result.artifact)?;
            written.push(path.clone());
        }
        Ok(written)
    }

    /// Warm-up (when enabled) then measurement, as a benchmark session does.
    pub fn run_benchmark(
        &self,
        input: &Path,
        outputs: &[PathBuf],
        config: &RunConfig,
        warmup: bool,
    ) -> AccelResult<RunSummary> {
        if warmup {
            let warm = config.as_warmup();
            match self.compress_file(input, outputs, &warm) {
                Ok(_) => debug!("[RUN] warm-up done"),
                Err(e) => {
                    warn!("[RUN] warm-up failed: {}", e);
                    return Err(e);
                }
            }
        }
        self.compress_file(input, outputs, config)
    }
}

/// Run `config` against `input` with the default gzip writer and verifier.
pub fn compress_file(
    device: &Device,
    backend: Arc<dyn CompressionBackend>,
    input: &Path,
    outputs: &[PathBuf],
    config: &RunConfig,
) -> AccelResult<RunSummary> {
    Runner::new(device, backend).compress_file(input, outputs, config)
}

/// Warm-up then measurement with the default gzip writer and verifier.
pub fn run_benchmark(
    device: &Device,
    backend: Arc<dyn CompressionBackend>,
    input: &Path,
    outputs: &[PathBuf],
    config: &RunConfig,
) -> AccelResult<RunSummary> {
    Runner::new(device, backend).run_benchmark(input, outputs, config, true)
}
