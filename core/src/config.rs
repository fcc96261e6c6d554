// ## config.rs: run configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    backend::BackendKind,
    constants::{DEFAULT_ENGINES, DEFAULT_MEASURE_ITERATIONS, RING_DEPTH, WARMUP_ITERATIONS},
    types::{AccelError, AccelResult},
};

/// Host memory for the input image and the pooled output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPreference {
    /// Pinned when the device supports host allocations.
    #[default]
    Auto,
    /// Ask for pinned memory; downgraded with a warning if unsupported.
    Pinned,
    Pageable,
}

/// Which engines' artifacts are decompressed and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    #[default]
    FirstEngine,
    AllEngines,
}

impl VerifyPolicy {
    pub fn engines(self, engines: usize) -> usize {
        match self {
            VerifyPolicy::FirstEngine => engines.min(1),
            VerifyPolicy::AllEngines => engines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub engines: usize,
    pub iterations: usize,
    /// Write artifacts, verify and build the throughput report.
    pub report: bool,
    pub memory: MemoryPreference,
    pub verify: VerifyPolicy,
    /// Executor threads of the emulated device; `None` sizes from the host.
    pub executor_threads: Option<usize>,
    /// Physically distinct buffer sets per engine.
    pub ring_depth: usize,
    pub backend: BackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::measure(DEFAULT_MEASURE_ITERATIONS)
    }
}

impl RunConfig {
    /// Single unreported iteration to warm caches and the device.
    pub fn warmup() -> Self {
        Self {
            report: false,
            ..Self::measure(WARMUP_ITERATIONS)
        }
    }

    pub fn measure(iterations: usize) -> Self {
        Self {
            engines: DEFAULT_ENGINES,
            iterations,
            report: true,
            memory: MemoryPreference::Auto,
            verify: VerifyPolicy::FirstEngine,
            executor_threads: None,
            ring_depth: RING_DEPTH,
            backend: BackendKind::default(),
        }
    }

    pub fn with_engines(mut self, engines: usize) -> Self {
        self.engines = engines;
        self
    }

    /// Warm-up counterpart of this config: same engines and resources, one
    /// iteration, no report.
    pub fn as_warmup(&self) -> Self {
        Self {
            iterations: WARMUP_ITERATIONS,
            report: false,
            ..self.clone()
        }
    }

    pub fn from_json_file(path: &Path) -> AccelResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| AccelError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| AccelError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AccelResult<()> {
        if self.engines == 0 {
            return Err(AccelError::Config("at least one engine is required".into()));
        }
        if self.iterations == 0 {
            return Err(AccelError::Config("at least one iteration is required".into()));
        }
        if self.ring_depth == 0 {
            return Err(AccelError::Config("ring depth must be at least 1".into()));
        }
        if self.executor_threads == Some(0) {
            return Err(AccelError::Config("executor threads must be at least 1".into()));
        }
        Ok(())
    }
}
