//! 生成任务与进度事件

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// 任务状态
///
/// 只允许 Queued → Running → {Done, Error}，终态不可再变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// 判断状态迁移是否合法
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done | JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStart,
    ChapterStart,
    RuleStart,
    AiStart,
    AiDelta,
    AiEnd,
    ParseOk,
    RuleProgress,
    RuleRetry,
    RuleWarn,
    RuleError,
    Progress,
    RuleEnd,
    JobDone,
    JobError,
    Warn,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::JobStart => "job_start",
            EventKind::ChapterStart => "chapter_start",
            EventKind::RuleStart => "rule_start",
            EventKind::AiStart => "ai_start",
            EventKind::AiDelta => "ai_delta",
            EventKind::AiEnd => "ai_end",
            EventKind::ParseOk => "parse_ok",
            EventKind::RuleProgress => "rule_progress",
            EventKind::RuleRetry => "rule_retry",
            EventKind::RuleWarn => "rule_warn",
            EventKind::RuleError => "rule_error",
            EventKind::Progress => "progress",
            EventKind::RuleEnd => "rule_end",
            EventKind::JobDone => "job_done",
            EventKind::JobError => "job_error",
            EventKind::Warn => "warn",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进度事件
///
/// `id` 在同一任务内从 1 开始严格递增，截断日志后也不会复用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub ts: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "【{}】#{} {}", self.ts.format("%H:%M:%S"), self.id, self.kind)?;
        if let Some(message) = &self.message {
            write!(f, " {}", message)?;
        }
        Ok(())
    }
}

/// 生成任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub inserted_count: u32,
    pub result_ids: Vec<i64>,
    pub error: Option<String>,
    pub event_sequence: u64,
    pub events: Vec<Event>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            created_at: Local::now(),
            started_at: None,
            finished_at: None,
            inserted_count: 0,
            result_ids: Vec::new(),
            error: None,
            event_sequence: 0,
            events: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// 取出游标之后的事件（按 id 升序）
    pub fn events_after(&self, last_event_id: u64) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.id > last_event_id)
    }
}
