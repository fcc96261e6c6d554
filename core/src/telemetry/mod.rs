//! telemetry/mod.rs
//! Stage timers, byte counters and the throughput/ratio report.

pub mod counters;
pub mod report;
pub mod timers;

pub use counters::*;
pub use report::*;
pub use timers::*;
