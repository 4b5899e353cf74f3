//! 生成任务工作池 - 编排层
//!
//! ## 职责
//!
//! 本模块是调用方的唯一入口，负责任务的提交、调度和进度查询。
//!
//! ## 核心功能
//!
//! 1. **提交校验**：结构校验 + 题库校验（章节存在、同一教材），不合法的请求不进入注册表
//! 2. **排队调度**：单个调度协程按提交顺序（FIFO）取任务，使用 Semaphore 限制并发数量
//! 3. **状态查询**：`get_snapshot` 返回只读快照
//! 4. **进度订阅**：`stream_events` 返回轮询事件流
//!
//! 每个任务在一个工作协程里运行到终态，中途不让出工作位。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::TextGenerator;
use crate::config::Config;
use crate::error::{AppError, AppResult, RegistryError, ValidationError};
use crate::infrastructure::{JobRegistry, QuestionBank};
use crate::models::job::Job;
use crate::models::request::GenerationRequest;
use crate::orchestrator::job_runner::{JobRunner, WorkerSettings};
use crate::orchestrator::progress_stream::{self, EventStream};
use crate::workflow::short_id;

struct QueuedJob {
    job_id: String,
    request: GenerationRequest,
}

/// 生成任务工作池
pub struct JobPool {
    registry: Arc<JobRegistry>,
    bank: Arc<dyn QuestionBank>,
    queue: mpsc::UnboundedSender<QueuedJob>,
    poll_interval: Duration,
}

impl JobPool {
    /// 创建工作池并启动调度协程（必须在 tokio 运行时内调用）
    pub fn new(generator: Arc<dyn TextGenerator>, bank: Arc<dyn QuestionBank>, config: &Config) -> Self {
        let registry = Arc::new(JobRegistry::new(config.event_log_cap));
        let runner = Arc::new(JobRunner::new(
            generator,
            bank.clone(),
            registry.clone(),
            WorkerSettings::from_config(config),
        ));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (queue, receiver) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(receiver, semaphore, runner));
        info!("📊 工作池已启动，最大并发任务数: {}", config.max_concurrent_jobs.max(1));

        Self {
            registry,
            bank,
            queue,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// 提交生成请求，返回任务 ID
    pub fn submit(&self, request: GenerationRequest) -> AppResult<String> {
        self.validate(&request)?;

        let job_id = Uuid::new_v4().to_string();
        self.registry.create(job_id.clone());
        info!(
            "[任务 {}] 📥 已提交：{} 条规则，{} 个章节，共 {} 道题",
            short_id(&job_id),
            request.rules.len(),
            request.chapter_weights.len(),
            request.total_count()
        );

        self.queue
            .send(QueuedJob {
                job_id: job_id.clone(),
                request,
            })
            .map_err(|_| AppError::PoolClosed)?;
        Ok(job_id)
    }

    /// 结构校验之外，再确认章节都存在且属于同一本教材
    fn validate(&self, request: &GenerationRequest) -> AppResult<()> {
        request.validate()?;

        let mut textbook_id: Option<i64> = None;
        for weight in &request.chapter_weights {
            let chapter = self
                .bank
                .chapter(weight.chapter_id)?
                .ok_or(ValidationError::UnknownChapter {
                    chapter_id: weight.chapter_id,
                })?;
            match textbook_id {
                None => textbook_id = Some(chapter.textbook_id),
                Some(first) if first != chapter.textbook_id => {
                    return Err(ValidationError::MixedTextbooks {
                        first,
                        other: chapter.textbook_id,
                    }
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn get_snapshot(&self, job_id: &str) -> Result<Job, RegistryError> {
        self.registry.snapshot(job_id)
    }

    /// 订阅任务进度，`last_event_id` 为 0 时从头开始
    pub fn stream_events(&self, job_id: &str, last_event_id: u64) -> Result<EventStream, RegistryError> {
        progress_stream::stream_events(self.registry.clone(), job_id, last_event_id, self.poll_interval)
    }
}

/// 调度协程：按提交顺序取任务，拿到工作位后再启动
async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    semaphore: Arc<Semaphore>,
    runner: Arc<JobRunner>,
) {
    while let Some(job) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                runner.finish_error(&job.job_id, &format!("无法获取工作位: {}", e));
                continue;
            }
        };

        let runner = runner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let job_id = job.job_id.clone();

            let worker = {
                let runner = runner.clone();
                tokio::spawn(async move { runner.run(&job.job_id, &job.request).await })
            };

            if let Err(e) = worker.await {
                error!("[任务 {}] 工作协程异常退出: {}", short_id(&job_id), e);
                runner.finish_error(&job_id, &format!("工作协程异常退出: {}", e));
            }
        });
    }
}
