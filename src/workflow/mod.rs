pub mod delta_buffer;
pub mod generation_flow;
pub mod task_ctx;

pub use delta_buffer::DeltaBuffer;
pub use generation_flow::{FlowSettings, GenerationFlow, TaskOutcome};
pub use task_ctx::{short_id, TaskCtx};
