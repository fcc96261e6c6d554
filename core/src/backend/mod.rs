//! Compute stage interface.
//!
//! Responsibilities:
//! - Define what the orchestrator needs from a compute stage
//! - Ship a software reference stage for hosts without hardware
//!
//! Non-responsibilities:
//! - Transfers, buffer reuse, validation

pub mod reference;
pub mod types;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DEFLATE_LEVEL;

pub use reference::ReferenceBackend;
pub use types::{BackendError, CompressedBlock, CompressionBackend, GzipOutInfo, OutStatus};

/// Selectable compute stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    Reference { level: u32 },
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Reference { level: DEFAULT_DEFLATE_LEVEL }
    }
}

/// Factory: build the compute stage shared by every engine.
pub fn make_backend(kind: BackendKind) -> Arc<dyn CompressionBackend> {
    match kind {
        BackendKind::Reference { level } => Arc::new(ReferenceBackend::new(level)),
    }
}
