//! gzip/writer.rs
//! Wraps a raw deflate payload in a single RFC 1952 member.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use byteorder::{LittleEndian, WriteBytesExt};
use thiserror::Error;
use tracing::debug;

use crate::constants::gzip::{CM_DEFLATE, FLAG_FNAME, MAGIC, OS_UNIX};

#[derive(Debug, Error)]
pub enum GzipWriteError {
    #[error("cannot write gzip artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file name {0:?} contains a NUL byte")]
    InvalidName(String),
}

/// Header and trailer fields of one gzip member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GzipMember {
    /// Original file name (FNAME). Omitted when `None`.
    pub file_name: Option<String>,
    /// Modification time of the original file, seconds since the epoch.
    pub mtime: u32,
    pub crc32: u32,
    /// Uncompressed length modulo 2^32.
    pub isize: u32,
}

impl GzipMember {
    /// Member fields for `input`: its base name, its mtime (0 when unknown)
    /// and the given checksum and length.
    pub fn for_input(input: &Path, crc32: u32, input_len: usize) -> Self {
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let mtime = fs::metadata(input)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as u32);
        Self {
            file_name,
            mtime,
            crc32,
            isize: input_len as u32,
        }
    }

    /// Serialize the 10-byte header plus the optional FNAME field.
    pub fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let flags = if self.file_name.is_some() { FLAG_FNAME } else { 0 };
        w.write_all(&MAGIC)?;
        w.write_u8(CM_DEFLATE)?;
        w.write_u8(flags)?;
        w.write_u32::<LittleEndian>(self.mtime)?;
        w.write_u8(0)?; // XFL
        w.write_u8(OS_UNIX)?;
        if let Some(name) = &self.file_name {
            w.write_all(name.as_bytes())?;
            w.write_u8(0)?;
        }
        Ok(())
    }

    pub fn write_trailer<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.isize)
    }
}

/// Destination of the per-engine artifacts.
pub trait ArtifactWriter: Send + Sync {
    fn write(&self, path: &Path, member: &GzipMember, deflate: &[u8]) -> Result<(), GzipWriteError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GzipFileWriter;

impl ArtifactWriter for GzipFileWriter {
    fn write(&self, path: &Path, member: &GzipMember, deflate: &[u8]) -> Result<(), GzipWriteError> {
        if let Some(name) = &member.file_name {
            if name.as_bytes().contains(&0) {
                return Err(GzipWriteError::InvalidName(name.clone()));
            }
        }
        let io_err = |source| GzipWriteError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(io_err)?;
        let mut w = BufWriter::new(file);
        member.write_header(&mut w).map_err(io_err)?;
        w.write_all(deflate).map_err(io_err)?;
        member.write_trailer(&mut w).map_err(io_err)?;
        w.flush().map_err(io_err)?;

        debug!("[GZIP] wrote {} ({} payload bytes)", path.display(), deflate.len());
        Ok(())
    }
}
