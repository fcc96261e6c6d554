//! Sizing constants shared by the pool, the driver and the compute stage.

/// Bytes the compute stage consumes per cycle (its native vector width).
pub const NATIVE_VECTOR_WIDTH: usize = 16;

/// Padding added to input/output buffers so the stage's widest write burst
/// never runs past the end of an allocation.
pub const IN_OUT_PADDING: usize = 16 * NATIVE_VECTOR_WIDTH;

/// Floor for device output buffers (16 KiB).
pub const MIN_BUFFER_SIZE: usize = 16 * 1024;

/// Smallest accepted input file.
pub const MIN_INPUT_SIZE: usize = NATIVE_VECTOR_WIDTH + 1;

/// Number of physically distinct buffer sets per engine (triple buffering).
pub const RING_DEPTH: usize = 3;

/// Defaults when the config leaves a value unset
pub const DEFAULT_ENGINES: usize = 1;
pub const DEFAULT_MEASURE_ITERATIONS: usize = 200;
pub const WARMUP_ITERATIONS: usize = 1;
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// Size of the compute stage's metadata record on the device.
pub const METADATA_RECORD_LEN: usize = 16;

/// Size of the partial CRC accumulator on the device.
pub const PARTIAL_CRC_LEN: usize = 4;

/// Output buffer size for an input of `input_len` bytes.
pub fn output_buffer_size(input_len: usize) -> usize {
    (input_len + IN_OUT_PADDING).max(MIN_BUFFER_SIZE)
}

/// Device input buffer size for an input of `input_len` bytes.
pub fn input_buffer_size(input_len: usize) -> usize {
    input_len + IN_OUT_PADDING
}

/// gzip container constants (RFC 1952).
pub mod gzip {
    pub const MAGIC: [u8; 2] = [0x1f, 0x8b];
    pub const CM_DEFLATE: u8 = 8;
    pub const FLAG_FNAME: u8 = 0x08;
    pub const OS_UNIX: u8 = 3;
}
