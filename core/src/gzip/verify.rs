//! Round-trip check: decompress an artifact and compare it against the input
//! as it is on disk.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{artifact} is not a valid gzip stream: {source}")]
    Decode {
        artifact: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{artifact} decompresses to {got} bytes, input has {expected}")]
    LengthMismatch {
        artifact: PathBuf,
        expected: usize,
        got: usize,
    },

    #[error("{artifact} differs from the input at offset {offset}")]
    ContentMismatch { artifact: PathBuf, offset: usize },
}

pub trait ArtifactVerifier: Send + Sync {
    fn verify(&self, artifact: &Path, original: &Path) -> Result<(), VerifyError>;
}

/// Decodes with flate2, which also checks the trailer CRC and ISIZE.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipVerifier;

impl GzipVerifier {
    pub fn decompress(artifact: &Path) -> Result<Vec<u8>, VerifyError> {
        let file = File::open(artifact).map_err(|source| VerifyError::Io {
            path: artifact.to_path_buf(),
            source,
        })?;
        let mut out = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut out)
            .map_err(|source| VerifyError::Decode {
                artifact: artifact.to_path_buf(),
                source,
            })?;
        Ok(out)
    }
}

impl ArtifactVerifier for GzipVerifier {
    fn verify(&self, artifact: &Path, original: &Path) -> Result<(), VerifyError> {
        let decoded = Self::decompress(artifact)?;
        let expected = fs::read(original).map_err(|source| VerifyError::Io {
            path: original.to_path_buf(),
            source,
        })?;

        if let Some(offset) = decoded.iter().zip(&expected).position(|(a, b)| a != b) {
            return Err(VerifyError::ContentMismatch {
                artifact: artifact.to_path_buf(),
                offset,
            });
        }
        if decoded.len() != expected.len() {
            return Err(VerifyError::LengthMismatch {
                artifact: artifact.to_path_buf(),
                expected: expected.len(),
                got: decoded.len(),
            });
        }

        info!("[VERIFY] {} matches {}", artifact.display(), original.display());
        Ok(())
    }
}
