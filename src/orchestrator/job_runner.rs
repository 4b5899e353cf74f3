//! 单个生成任务执行器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责把一个生成任务从 Queued 推进到终态，是任务级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **状态推进**：Queued → Running → {Done, Error}
//! 2. **题量分配**：每条规则按章节权重分配到叶子章节
//! 3. **流程调度**：为每个（规则, 叶子章节）任务调用 `GenerationFlow`
//! 4. **缺题策略**：补题耗尽仍不足时按 `ShortfallPolicy` 中止或继续
//! 5. **入库**：收集到的题目以待审核状态写入题库并记录到任务上
//! 6. **进度事件**：job_start / rule_start / progress / rule_end / job_done / job_error

use chrono::Local;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::TextGenerator;
use crate::config::Config;
use crate::error::{JobError, RegistryError};
use crate::infrastructure::{JobRegistry, JobUpdate, QuestionBank};
use crate::models::job::{EventKind, JobStatus};
use crate::models::question::{NewQuestion, ReviewStatus};
use crate::models::request::GenerationRequest;
use crate::services::apportion;
use crate::workflow::{short_id, FlowSettings, GenerationFlow, TaskCtx, TaskOutcome};

/// 补题耗尽仍不足目标时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShortfallPolicy {
    /// 发出 rule_warn，保留已收集的题目，继续后续任务
    #[default]
    Continue,
    /// 发出 rule_error，丢弃当前任务的题目，整个任务以 Error 结束
    Abort,
}

impl FromStr for ShortfallPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(ShortfallPolicy::Continue),
            "abort" => Ok(ShortfallPolicy::Abort),
            other => Err(format!("未知的缺题策略: {}", other)),
        }
    }
}

impl fmt::Display for ShortfallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortfallPolicy::Continue => f.write_str("continue"),
            ShortfallPolicy::Abort => f.write_str("abort"),
        }
    }
}

/// 工作线程参数
#[derive(Debug, Clone, Default)]
pub struct WorkerSettings {
    pub flow: FlowSettings,
    pub shortfall_policy: ShortfallPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flow: FlowSettings::from_config(config),
            shortfall_policy: config.shortfall_policy,
        }
    }
}

/// 任务执行器（一个任务只由一个执行器修改）
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    bank: Arc<dyn QuestionBank>,
    flow: GenerationFlow,
    policy: ShortfallPolicy,
}

impl JobRunner {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        bank: Arc<dyn QuestionBank>,
        registry: Arc<JobRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        let flow = GenerationFlow::new(generator, bank.clone(), registry.clone(), settings.flow);
        Self {
            registry,
            bank,
            flow,
            policy: settings.shortfall_policy,
        }
    }

    fn emit(
        &self,
        job_id: &str,
        kind: EventKind,
        message: Option<String>,
        data: JsonValue,
    ) -> Result<(), RegistryError> {
        self.registry
            .append_event(job_id, kind, message, Some(data))
            .map(|_| ())
    }

    /// 执行任务直到终态
    pub async fn run(&self, job_id: &str, request: &GenerationRequest) {
        if let Err(e) = self.registry.update(job_id, JobUpdate::status(JobStatus::Running)) {
            error!("[任务 {}] ❌ 无法开始: {}", short_id(job_id), e);
            return;
        }
        info!("[任务 {}] 🚀 开始执行，共 {} 条规则", short_id(job_id), request.rules.len());

        match self.execute(job_id, request).await {
            Ok(question_ids) => self.finish_done(job_id, question_ids),
            Err(e) => self.finish_error(job_id, &e.to_string()),
        }
    }

    fn finish_done(&self, job_id: &str, question_ids: Vec<i64>) {
        let inserted = question_ids.len();
        let result = self.registry.finish(
            job_id,
            JobUpdate::status(JobStatus::Done),
            EventKind::JobDone,
            Some(format!("完成，共入库 {} 道题", inserted)),
            Some(json!({ "inserted": inserted, "question_ids": question_ids })),
        );
        match result {
            Ok(_) => info!("[任务 {}] ✅ 完成，共入库 {} 道题", short_id(job_id), inserted),
            Err(e) => error!("[任务 {}] 无法标记完成: {}", short_id(job_id), e),
        }
    }

    /// 标记任务失败（Queued 状态的任务先推进到 Running）
    pub fn finish_error(&self, job_id: &str, message: &str) {
        error!("[任务 {}] ❌ 失败: {}", short_id(job_id), message);

        if let Ok(job) = self.registry.snapshot(job_id) {
            if job.status == JobStatus::Queued {
                if let Err(e) = self.registry.update(job_id, JobUpdate::status(JobStatus::Running)) {
                    warn!("[任务 {}] 无法推进到 Running: {}", short_id(job_id), e);
                }
            }
        }
        let update = JobUpdate {
            status: Some(JobStatus::Error),
            error: Some(message.to_string()),
            ..Default::default()
        };
        let result = self.registry.finish(
            job_id,
            update,
            EventKind::JobError,
            Some(message.to_string()),
            Some(json!({ "error": message })),
        );
        if let Err(e) = result {
            error!("[任务 {}] 无法标记失败: {}", short_id(job_id), e);
        }
    }

    async fn execute(&self, job_id: &str, request: &GenerationRequest) -> Result<Vec<i64>, JobError> {
        let total_count = request.total_count();
        self.emit(
            job_id,
            EventKind::JobStart,
            Some(format!("开始生成，共 {} 道题", total_count)),
            json!({ "total_count": total_count }),
        )?;

        // 提交时已校验所有章节属于同一教材
        let first_chapter_id = request
            .chapter_weights
            .first()
            .map(|w| w.chapter_id)
            .unwrap_or_default();
        let nodes = match self.bank.chapter(first_chapter_id)? {
            Some(chapter) => self.bank.chapter_nodes(chapter.textbook_id)?,
            None => {
                return Err(JobError::ChapterMissing {
                    chapter_id: first_chapter_id,
                })
            }
        };

        let mut inserted_ids: Vec<i64> = Vec::new();

        for (rule_index, rule) in request.rules.iter().enumerate() {
            let quotas = apportion(rule.count, &request.chapter_weights, &nodes);
            info!(
                "[任务 {}] 📋 规则 {}/{}：题型 {} 难度 {} 共 {} 道，分配到 {} 个章节",
                short_id(job_id),
                rule_index + 1,
                request.rules.len(),
                rule.type_id,
                rule.difficulty_id,
                rule.count,
                quotas.len()
            );
            self.emit(
                job_id,
                EventKind::RuleStart,
                Some(format!("规则 {} 开始", rule_index + 1)),
                json!({
                    "rule_index": rule_index,
                    "type_id": rule.type_id,
                    "difficulty_id": rule.difficulty_id,
                    "count": rule.count,
                    "allocations": &quotas,
                }),
            )?;

            let mut rule_inserted = 0usize;
            for quota in quotas {
                let ctx = TaskCtx::new(
                    job_id,
                    rule_index,
                    quota.chapter_id,
                    rule.type_id,
                    rule.difficulty_id,
                    quota.count,
                );
                let outcome = self.flow.run(&ctx).await?;

                if outcome.accepted() < ctx.target {
                    self.handle_shortfall(&ctx, &outcome)?;
                }

                rule_inserted += self.persist(&ctx, request, &outcome, &mut inserted_ids)?;
                self.emit(
                    job_id,
                    EventKind::Progress,
                    Some(format!("已入库 {}/{}", inserted_ids.len(), total_count)),
                    json!({ "inserted": inserted_ids.len(), "total_count": total_count }),
                )?;
            }

            self.emit(
                job_id,
                EventKind::RuleEnd,
                Some(format!("规则 {} 结束，入库 {} 道", rule_index + 1, rule_inserted)),
                json!({ "inserted": rule_inserted }),
            )?;
        }

        Ok(inserted_ids)
    }

    fn handle_shortfall(&self, ctx: &TaskCtx, outcome: &TaskOutcome) -> Result<(), JobError> {
        let shortfall = JobError::InsufficientResults {
            chapter_id: ctx.chapter_id,
            target: ctx.target,
            accepted: outcome.accepted(),
        };
        let data = json!({
            "chapter_id": ctx.chapter_id,
            "target": ctx.target,
            "accepted": outcome.accepted(),
            "attempts": outcome.attempts,
        });

        match self.policy {
            ShortfallPolicy::Continue => {
                warn!("{} ⚠️ {}，保留已收集的题目继续", ctx, shortfall);
                self.emit(&ctx.job_id, EventKind::RuleWarn, Some(shortfall.to_string()), data)?;
                Ok(())
            }
            ShortfallPolicy::Abort => {
                self.emit(&ctx.job_id, EventKind::RuleError, Some(shortfall.to_string()), data)?;
                Err(shortfall)
            }
        }
    }

    /// 逐道写入题库，每写入一道就记录到任务上，返回本次写入数量
    fn persist(
        &self,
        ctx: &TaskCtx,
        request: &GenerationRequest,
        outcome: &TaskOutcome,
        inserted_ids: &mut Vec<i64>,
    ) -> Result<usize, JobError> {
        for item in &outcome.items {
            let question_id = self.bank.insert_question(NewQuestion {
                subject_id: request.subject_id,
                chapter_id: ctx.chapter_id,
                type_id: item.type_id,
                difficulty_id: ctx.difficulty_id,
                content: item.content.clone(),
                answer: item.answer.clone(),
                analysis: item.analysis.clone(),
                score: item.score,
                is_ai_generated: true,
                review_status: ReviewStatus::Pending,
                source_question_ids: outcome.source_question_ids.clone(),
                create_user: request.create_user.clone(),
                create_time: Local::now(),
            })?;
            inserted_ids.push(question_id);
            self.registry.update(
                &ctx.job_id,
                JobUpdate {
                    inserted_count: Some(inserted_ids.len() as u32),
                    result_ids: vec![question_id],
                    ..Default::default()
                },
            )?;
        }
        Ok(outcome.items.len())
    }
}
