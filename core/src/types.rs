use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{
    backend::BackendError,
    gzip::{GzipWriteError, VerifyError},
    memory::{AllocError, PoolError},
    substrate::SubstrateError,
};

/// Unified run error covering configuration, resources, the compute stage
/// contract and verification.
/// - `From<T>` impls enable `?` across the layers.
/// - Every variant is terminal for the run; nothing is retried.
#[derive(Debug, Error)]
pub enum AccelError {
    /// Input file could not be read.
    #[error("cannot read input file {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input below the stage's minimum size.
    #[error("minimum filesize for compression is {min} bytes, got {len}")]
    InputTooSmall { len: usize, min: usize },

    /// Invalid run configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Buffer pool / allocation failure.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Execution substrate failure (a submitted command failed).
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// Compute stage reported more bytes than it was given.
    #[error(
        "unsupported: compressed size {compressed} larger than input {input} \
         (engine {engine}, iteration {iteration})"
    )]
    ContractViolation {
        engine: usize,
        iteration: usize,
        compressed: u64,
        input: usize,
    },

    /// Compute stage wrote past its output buffer.
    #[error("compute stage overflowed its output buffer (engine {engine}, iteration {iteration})")]
    OutputOverflow { engine: usize, iteration: usize },

    /// Two iterations over identical input reconciled to different CRCs.
    #[error("nondeterministic compute stage: engine {engine} iteration {iteration} crc {got:#010x} != {expected:#010x}")]
    Nondeterministic {
        engine: usize,
        iteration: usize,
        expected: u32,
        got: u32,
    },

    /// Two iterations over identical input reported different compressed
    /// sizes, so the reused host output no longer holds one artifact.
    #[error("nondeterministic compute stage: engine {engine} iteration {iteration} produced {got} bytes, iteration 0 produced {expected}")]
    SizeDrift {
        engine: usize,
        iteration: usize,
        expected: u64,
        got: u64,
    },

    /// Compute stage itself failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// gzip artifact could not be written.
    #[error(transparent)]
    Write(#[from] GzipWriteError),

    /// Round-trip verification failed.
    #[error(transparent)]
    Verification(#[from] VerifyError),
}

impl From<AllocError> for AccelError {
    fn from(e: AllocError) -> Self {
        AccelError::Pool(PoolError::Alloc(e))
    }
}

pub type AccelResult<T> = Result<T, AccelError>;
