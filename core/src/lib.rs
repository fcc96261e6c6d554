//! accel-gzip-core
//!
//! Host-side orchestration of a multi-engine GZIP compression accelerator:
//! buffer lifecycle, asynchronous transfer/compute chains, CRC
//! reconciliation, validation and throughput reporting.
//! No CLI, no logging setup.

#![forbid(unsafe_code)]

// Shared and top level
pub mod config;
pub mod constants;
pub mod types;
pub mod utils;

// Building blocks
pub mod backend;
pub mod crc;
pub mod gzip;
pub mod memory;
pub mod substrate;
pub mod telemetry;

// Orchestration
pub mod engine;
pub mod run;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::backend::{make_backend, BackendKind, CompressionBackend, ReferenceBackend};
    pub use crate::config::{MemoryPreference, RunConfig, VerifyPolicy};
    pub use crate::run::{compress_file, run_benchmark, RunSummary, Runner};
    pub use crate::substrate::{default_executor_threads, Device, DeviceCaps};
    pub use crate::telemetry::ThroughputReport;
    pub use crate::types::{AccelError, AccelResult};
    pub use crate::utils::{default_output_base, output_file_names};
}
