//! gzip container output and round-trip verification.

pub mod verify;
pub mod writer;

pub use verify::{ArtifactVerifier, GzipVerifier, VerifyError};
pub use writer::{ArtifactWriter, GzipFileWriter, GzipMember, GzipWriteError};
