//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和状态推进，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `job_pool` - 生成任务工作池
//! - 调用方入口：submit / get_snapshot / stream_events
//! - 提交校验（不合法的请求不进入注册表）
//! - FIFO 排队，Semaphore 控制并发数量
//!
//! ### `job_runner` - 单个任务执行器
//! - 推进任务状态 Queued → Running → {Done, Error}
//! - 按规则分配题量，逐个章节任务调用 GenerationFlow
//! - 缺题策略、入库、进度事件
//!
//! ### `progress_stream` - 进度流
//! - 基于游标轮询事件日志，直到任务终态
//!
//! ## 层次关系
//!
//! ```text
//! job_pool (处理 Vec<Job>)
//!     ↓
//! job_runner (处理 Vec<Rule> × Vec<LeafQuota>)
//!     ↓
//! workflow::GenerationFlow (处理单个章节任务)
//!     ↓
//! services (能力层：apportion / extractor / collector / prompt)
//!     ↓
//! infrastructure (基础设施：JobRegistry / QuestionBank)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：job_pool 管调度，job_runner 管单个任务
//! 2. **唯一写者**：一个任务只由一个执行器修改，其他协程只读快照
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod job_pool;
pub mod job_runner;
pub mod progress_stream;

// 重新导出主要类型
pub use job_pool::JobPool;
pub use job_runner::{JobRunner, ShortfallPolicy, WorkerSettings};
pub use progress_stream::{stream_events, EventStream};
