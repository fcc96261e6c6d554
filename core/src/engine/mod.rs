//! Engine pipeline: submission of per-slot chains and the completion barrier.

pub mod completion;
pub mod driver;
pub mod slot;

pub use completion::{busiest_engine, Completion, EngineResult};
pub use driver::PipelineDriver;
pub use slot::{ReadbackCell, SlotHandles, SlotReadback, SlotSubmission, SlotTable};
