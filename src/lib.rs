//! # Question Gen
//!
//! 一个用于 AI 批量出题的异步任务编排库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享资源，只暴露能力
//! - `JobRegistry` - 任务状态与事件日志，唯一的共享可变资源
//! - `QuestionBank` - 章节与题目存储（外部协作方接口）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `apportion` - 题量按章节权重分配到叶子章节
//! - `output_extractor` - 从模型输出中抢救 JSON 数组
//! - `item_collector` - 字段映射与任务内去重
//! - `prompt_builder` - 出题提示词
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个章节任务"的完整出题流程
//! - `TaskCtx` - 上下文封装（job_id + 规则 + 章节）
//! - `GenerationFlow` - 有界补题循环（stream → extract → collect → retry）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_pool` - 工作池，调用方入口，管理并发
//! - `orchestrator/job_runner` - 单个任务执行器，遍历规则与章节
//! - `orchestrator/progress_stream` - 进度流
//!
//! 文本生成服务通过 `clients::TextGenerator` 接入。
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{LlmClient, TextGenerator};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{JobRegistry, MemoryQuestionBank, QuestionBank};
pub use models::{ChapterWeight, Event, EventKind, GenerationRequest, GenerationRule, Job, JobStatus};
pub use orchestrator::{JobPool, ShortfallPolicy};
pub use workflow::{GenerationFlow, TaskCtx};
