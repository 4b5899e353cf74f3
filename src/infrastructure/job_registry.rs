//! 任务注册表 - 基础设施层
//!
//! 进程内唯一的共享可变资源：所有写操作与快照读取都经过同一把互斥锁，
//! 读者不会看到正在扩容或截断中的事件日志。

use chrono::Local;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::RegistryError;
use crate::models::job::{Event, EventKind, Job, JobStatus};

/// 默认事件日志上限
pub const DEFAULT_EVENT_CAP: usize = 4000;

/// 任务字段的部分更新
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub inserted_count: Option<u32>,
    /// 追加到 `result_ids` 末尾
    pub result_ids: Vec<i64>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// 一次轮询读取到的事件
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub status: JobStatus,
    pub events: Vec<Event>,
}

pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Job>>,
    event_cap: usize,
}

impl JobRegistry {
    pub fn new(event_cap: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            event_cap: event_cap.max(2),
        }
    }

    // 单次操作内数据始终一致，锁中毒时直接取回内部数据
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建一个 Queued 状态的空任务
    pub fn create(&self, job_id: impl Into<String>) -> Job {
        let job = Job::new(job_id);
        self.lock().insert(job.id.clone(), job.clone());
        debug!("[任务 {}] 已创建", job.id);
        job
    }

    /// 合并字段更新；状态迁移必须合法
    pub fn update(&self, job_id: &str, update: JobUpdate) -> Result<(), RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::not_found(job_id))?;
        check_transition(job, update.status)?;
        apply_update(job, update);
        Ok(())
    }

    /// 追加事件，返回分配的事件 id
    ///
    /// 超过上限时只保留最近一半，id 序列不受影响
    pub fn append_event(
        &self,
        job_id: &str,
        kind: EventKind,
        message: Option<String>,
        data: Option<JsonValue>,
    ) -> Result<u64, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::not_found(job_id))?;
        Ok(self.push_event(job, kind, message, data))
    }

    /// 在同一次加锁内追加终态事件并切换状态
    ///
    /// 读者看到终态时，终态事件一定已经在日志里；迁移不合法时不写入任何内容
    pub fn finish(
        &self,
        job_id: &str,
        update: JobUpdate,
        kind: EventKind,
        message: Option<String>,
        data: Option<JsonValue>,
    ) -> Result<u64, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::not_found(job_id))?;
        check_transition(job, update.status)?;
        let id = self.push_event(job, kind, message, data);
        apply_update(job, update);
        Ok(id)
    }

    fn push_event(
        &self,
        job: &mut Job,
        kind: EventKind,
        message: Option<String>,
        data: Option<JsonValue>,
    ) -> u64 {
        job.event_sequence += 1;
        let id = job.event_sequence;
        job.events.push(Event {
            id,
            ts: Local::now(),
            kind,
            message,
            data,
        });

        if job.events.len() > self.event_cap {
            let keep = self.event_cap / 2;
            let drop_count = job.events.len() - keep;
            job.events.drain(..drop_count);
            debug!("[任务 {}] 事件日志截断，保留 {} 条", job.id, keep);
        }
        id
    }

    /// 只读快照
    pub fn snapshot(&self, job_id: &str) -> Result<Job, RegistryError> {
        self.lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(job_id))
    }

    /// 读取游标之后的事件与当前状态
    pub fn events_after(&self, job_id: &str, last_event_id: u64) -> Result<EventBatch, RegistryError> {
        let jobs = self.lock();
        let job = jobs
            .get(job_id)
            .ok_or_else(|| RegistryError::not_found(job_id))?;
        Ok(EventBatch {
            status: job.status,
            events: job.events_after(last_event_id).cloned().collect(),
        })
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清理结束时间早于 `ttl` 之前的终态任务，返回清理数量
    pub fn evict_finished(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Local::now() - ttl;
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) if job.is_finished() => finished_at > cutoff,
            _ => true,
        });
        before - jobs.len()
    }
}

fn check_transition(job: &Job, next: Option<JobStatus>) -> Result<(), RegistryError> {
    match next {
        Some(next) if !job.status.can_transition_to(next) => Err(RegistryError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status.to_string(),
            to: next.to_string(),
        }),
        _ => Ok(()),
    }
}

fn apply_update(job: &mut Job, update: JobUpdate) {
    if let Some(next) = update.status {
        job.status = next;
        match next {
            JobStatus::Running => job.started_at = Some(Local::now()),
            JobStatus::Done | JobStatus::Error => job.finished_at = Some(Local::now()),
            JobStatus::Queued => {}
        }
    }
    if let Some(count) = update.inserted_count {
        job.inserted_count = count;
    }
    job.result_ids.extend(update.result_ids);
    if update.error.is_some() {
        job.error = update.error;
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_starts_queued_with_empty_log() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.events.is_empty());
        assert_eq!(job.event_sequence, 0);
    }

    #[test]
    fn test_snapshot_unknown_job_is_not_found() {
        let registry = JobRegistry::default();
        assert_eq!(
            registry.snapshot("missing").unwrap_err(),
            RegistryError::not_found("missing")
        );
        assert!(registry
            .append_event("missing", EventKind::Warn, None, None)
            .is_err());
    }

    #[test]
    fn test_update_merges_fields_and_stamps_times() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        registry.update("job-1", JobUpdate::status(JobStatus::Running)).unwrap();
        registry
            .update(
                "job-1",
                JobUpdate {
                    inserted_count: Some(2),
                    result_ids: vec![10, 11],
                    ..Default::default()
                },
            )
            .unwrap();
        registry
            .update(
                "job-1",
                JobUpdate {
                    inserted_count: Some(3),
                    result_ids: vec![12],
                    ..Default::default()
                },
            )
            .unwrap();

        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());
        assert_eq!(job.inserted_count, 3);
        assert_eq!(job.result_ids, vec![10, 11, 12]);

        registry.update("job-1", JobUpdate::status(JobStatus::Done)).unwrap();
        assert!(registry.snapshot("job-1").unwrap().finished_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        assert!(matches!(
            registry.update("job-1", JobUpdate::status(JobStatus::Done)),
            Err(RegistryError::InvalidTransition { .. })
        ));
        registry.update("job-1", JobUpdate::status(JobStatus::Running)).unwrap();
        registry.update("job-1", JobUpdate::status(JobStatus::Error)).unwrap();
        assert!(registry
            .update("job-1", JobUpdate::status(JobStatus::Done))
            .is_err());
        assert_eq!(registry.snapshot("job-1").unwrap().status, JobStatus::Error);
    }

    #[test]
    fn test_event_ids_survive_truncation() {
        let registry = JobRegistry::new(10);
        registry.create("job-1");
        for _ in 0..11 {
            registry
                .append_event("job-1", EventKind::AiDelta, None, None)
                .unwrap();
        }

        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.events.len(), 5);
        let ids: Vec<u64> = job.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 8, 9, 10, 11]);

        let next = registry
            .append_event("job-1", EventKind::Progress, None, None)
            .unwrap();
        assert_eq!(next, 12);
        assert_eq!(registry.snapshot("job-1").unwrap().event_sequence, 12);
    }

    #[test]
    fn test_events_after_cursor() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        for kind in [EventKind::JobStart, EventKind::RuleStart, EventKind::JobDone] {
            registry.append_event("job-1", kind, None, None).unwrap();
        }
        let batch = registry.events_after("job-1", 1).unwrap();
        let kinds: Vec<EventKind> = batch.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::RuleStart, EventKind::JobDone]);
        assert_eq!(batch.status, JobStatus::Queued);
    }

    #[test]
    fn test_concurrent_appends_keep_ids_unique() {
        let registry = Arc::new(JobRegistry::default());
        registry.create("job-1");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry
                            .append_event("job-1", EventKind::AiDelta, None, None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.events.len(), 400);
        assert!(job.events.windows(2).all(|w| w[1].id == w[0].id + 1));
    }

    #[test]
    fn test_evict_finished_keeps_active_jobs() {
        let registry = JobRegistry::default();
        registry.create("running");
        registry.create("done");
        registry.update("running", JobUpdate::status(JobStatus::Running)).unwrap();
        registry.update("done", JobUpdate::status(JobStatus::Running)).unwrap();
        registry.update("done", JobUpdate::status(JobStatus::Done)).unwrap();

        assert_eq!(registry.evict_finished(chrono::Duration::hours(1)), 0);
        assert_eq!(registry.evict_finished(chrono::Duration::seconds(-1)), 1);
        assert!(registry.contains("running"));
        assert!(!registry.contains("done"));
    }

    #[test]
    fn test_finish_appends_terminal_event_with_status() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        registry.update("job-1", JobUpdate::status(JobStatus::Running)).unwrap();
        registry
            .append_event("job-1", EventKind::Progress, None, None)
            .unwrap();

        let update = JobUpdate {
            status: Some(JobStatus::Error),
            error: Some("boom".to_string()),
            ..Default::default()
        };
        let id = registry
            .finish("job-1", update, EventKind::JobError, Some("boom".into()), None)
            .unwrap();
        assert_eq!(id, 2);

        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.events.last().map(|e| e.kind), Some(EventKind::JobError));
    }

    #[test]
    fn test_invalid_finish_writes_nothing() {
        let registry = JobRegistry::default();
        registry.create("job-1");
        let result = registry.finish(
            "job-1",
            JobUpdate::status(JobStatus::Done),
            EventKind::JobDone,
            None,
            None,
        );
        assert!(matches!(result, Err(RegistryError::InvalidTransition { .. })));

        let job = registry.snapshot("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.events.is_empty());
        assert_eq!(job.event_sequence, 0);
    }

    #[test]
    fn test_reader_never_sees_terminal_status_without_terminal_event() {
        let registry = Arc::new(JobRegistry::default());
        let job_ids: Vec<String> = (0..200).map(|i| format!("job-{}", i)).collect();
        for job_id in &job_ids {
            registry.create(job_id.clone());
            registry.update(job_id, JobUpdate::status(JobStatus::Running)).unwrap();
        }

        let writer = {
            let registry = Arc::clone(&registry);
            let job_ids = job_ids.clone();
            std::thread::spawn(move || {
                for job_id in &job_ids {
                    registry
                        .finish(job_id, JobUpdate::status(JobStatus::Done), EventKind::JobDone, None, None)
                        .unwrap();
                }
            })
        };

        let mut finished = 0;
        while finished < job_ids.len() {
            finished = 0;
            for job_id in &job_ids {
                let batch = registry.events_after(job_id, 0).unwrap();
                if batch.status.is_terminal() {
                    assert_eq!(batch.events.last().map(|e| e.kind), Some(EventKind::JobDone));
                    finished += 1;
                }
            }
        }
        writer.join().unwrap();
    }
}
