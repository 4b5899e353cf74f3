//! 基础设施层（Infrastructure）
//!
//! 持有共享资源，只暴露能力：
//! - `JobRegistry` - 任务状态与事件日志
//! - `QuestionBank` - 章节与题目存储

pub mod job_registry;
pub mod question_bank;

pub use job_registry::{EventBatch, JobRegistry, JobUpdate, DEFAULT_EVENT_CAP};
pub use question_bank::{MemoryQuestionBank, QuestionBank};
