//! 章节出题流程 - 流程层
//!
//! 核心职责：定义"一个章节任务"的完整出题流程
//!
//! 流程顺序：
//! 1. 取章节信息与风格参考题
//! 2. 有界补题循环：每轮只请求仍缺少的数量，优先流式调用，失败回退阻塞调用
//! 3. 解析输出 → 字段映射 → 任务内去重
//!
//! 写入题库与缺题策略由编排层决定，这里只返回收集结果

use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clients::TextGenerator;
use crate::config::Config;
use crate::error::{JobError, RegistryError};
use crate::infrastructure::{JobRegistry, QuestionBank};
use crate::models::job::EventKind;
use crate::models::question::CollectedItem;
use crate::services::{build_user_prompt, extract_json_array, ItemCollector, PromptInput, SYSTEM_PROMPT};
use crate::utils::logging::truncate_text;
use crate::workflow::delta_buffer::DeltaBuffer;
use crate::workflow::task_ctx::TaskCtx;

/// 出题流程参数
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub max_attempts: u32,
    pub style_examples: usize,
    pub temperature: f32,
    pub delta_flush_chars: usize,
    pub delta_flush_interval: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            style_examples: config.style_examples,
            temperature: config.llm_temperature,
            delta_flush_chars: config.delta_flush_chars,
            delta_flush_interval: Duration::from_millis(config.delta_flush_ms),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 单个章节任务的收集结果（尚未写入题库）
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub items: Vec<CollectedItem>,
    /// 风格参考题 ID
    pub source_question_ids: Vec<i64>,
    /// 实际调用模型的轮数
    pub attempts: u32,
}

impl TaskOutcome {
    pub fn accepted(&self) -> u32 {
        self.items.len() as u32
    }
}

/// 章节出题流程
///
/// - 编排单个章节任务的补题循环
/// - 决定何时流式、何时回退、何时停止
/// - 只通过注册表发出进度事件，不修改任务状态
pub struct GenerationFlow {
    generator: Arc<dyn TextGenerator>,
    bank: Arc<dyn QuestionBank>,
    registry: Arc<JobRegistry>,
    settings: FlowSettings,
}

impl GenerationFlow {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        bank: Arc<dyn QuestionBank>,
        registry: Arc<JobRegistry>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            generator,
            bank,
            registry,
            settings,
        }
    }

    fn emit(
        &self,
        ctx: &TaskCtx,
        kind: EventKind,
        message: Option<String>,
        data: JsonValue,
    ) -> Result<(), RegistryError> {
        self.registry
            .append_event(&ctx.job_id, kind, message, Some(data))
            .map(|_| ())
    }

    pub async fn run(&self, ctx: &TaskCtx) -> Result<TaskOutcome, JobError> {
        let chapter = self
            .bank
            .chapter(ctx.chapter_id)?
            .ok_or(JobError::ChapterMissing {
                chapter_id: ctx.chapter_id,
            })?;
        let examples =
            self.bank
                .recent_accepted(ctx.chapter_id, ctx.type_id, self.settings.style_examples)?;
        let source_question_ids: Vec<i64> = examples.iter().map(|q| q.question_id).collect();

        info!(
            "{} 📚 开始出题：{}，目标 {} 道，参考题 {} 道",
            ctx,
            chapter.chapter_name,
            ctx.target,
            examples.len()
        );
        self.emit(
            ctx,
            EventKind::ChapterStart,
            Some(format!("章节「{}」开始出题", chapter.chapter_name)),
            json!({ "chapter_id": ctx.chapter_id, "target": ctx.target }),
        )?;

        let target = ctx.target as usize;
        let mut collector = ItemCollector::new();
        let mut attempts = 0;

        for attempt in 1..=self.settings.max_attempts {
            let missing = target.saturating_sub(collector.len());
            if missing == 0 {
                break;
            }
            attempts = attempt;

            if attempt > 1 {
                info!("{} 🔄 第 {} 轮补题，还缺 {} 道", ctx, attempt, missing);
                self.emit(
                    ctx,
                    EventKind::RuleRetry,
                    Some(format!("第 {} 轮补题，还缺 {} 道", attempt, missing)),
                    json!({ "attempt": attempt, "missing": missing }),
                )?;
            }

            let accepted_stems: Vec<String> = collector.stems().map(str::to_string).collect();
            let user_prompt = build_user_prompt(&PromptInput {
                chapter: &chapter,
                type_id: ctx.type_id,
                difficulty_id: ctx.difficulty_id,
                count: missing,
                attempt,
                examples: &examples,
                accepted_stems: &accepted_stems,
            });

            self.emit(
                ctx,
                EventKind::AiStart,
                None,
                json!({ "attempt": attempt, "requested": missing }),
            )?;
            let text = self.generate(ctx, &user_prompt).await?;
            self.emit(
                ctx,
                EventKind::AiEnd,
                None,
                json!({ "chars": text.chars().count() }),
            )?;

            match extract_json_array(&text) {
                Ok(values) => {
                    let stats = collector.admit_all(&values, ctx.type_id, target);
                    debug!(
                        "{} 解析 {} 条，收录 {}，重复 {}，无效 {}",
                        ctx, stats.parsed, stats.accepted, stats.duplicates, stats.rejected
                    );
                    self.emit(
                        ctx,
                        EventKind::ParseOk,
                        Some(format!("解析 {} 条，收录 {} 条", stats.parsed, stats.accepted)),
                        json!({
                            "parsed": stats.parsed,
                            "accepted": stats.accepted,
                            "duplicates": stats.duplicates,
                            "rejected": stats.rejected,
                        }),
                    )?;
                }
                Err(e) => {
                    warn!(
                        "{} ⚠️ 第 {} 轮输出无法解析: {}，内容: {}",
                        ctx,
                        attempt,
                        e,
                        truncate_text(&text, 80)
                    );
                    self.emit(
                        ctx,
                        EventKind::Warn,
                        Some(format!("第 {} 轮输出无法解析: {}", attempt, e)),
                        json!({ "attempt": attempt }),
                    )?;
                }
            }

            self.emit(
                ctx,
                EventKind::RuleProgress,
                None,
                json!({ "accepted": collector.len(), "target": target }),
            )?;
        }

        info!(
            "{} ✓ 收集完成：{}/{} 道（{} 轮）",
            ctx,
            collector.len(),
            target,
            attempts
        );

        Ok(TaskOutcome {
            items: collector.into_items(),
            source_question_ids,
            attempts,
        })
    }

    /// 取得一轮完整输出：优先流式，流式失败则回退阻塞调用并整体作为一条增量发出
    ///
    /// 流式中途失败时，回退警告带 `reset: true`，订阅方应丢弃本轮已收到的增量
    async fn generate(&self, ctx: &TaskCtx, user_prompt: &str) -> Result<String, JobError> {
        let mut deltas_sent = 0usize;
        match self.stream_text(ctx, user_prompt, &mut deltas_sent).await {
            Ok(text) => return Ok(text),
            Err(JobError::Transport(e)) => {
                warn!("{} ⚠️ 流式调用失败（已发出 {} 条增量），改用阻塞调用: {}", ctx, deltas_sent, e);
                self.emit(
                    ctx,
                    EventKind::Warn,
                    Some(format!("流式调用失败，改用阻塞调用: {}", e)),
                    json!({
                        "fallback": "complete",
                        "reset": deltas_sent > 0,
                        "discarded_deltas": deltas_sent,
                    }),
                )?;
            }
            Err(other) => return Err(other),
        }

        let text = self
            .generator
            .complete(SYSTEM_PROMPT, user_prompt, self.settings.temperature)
            .await?;
        self.emit(ctx, EventKind::AiDelta, None, json!({ "text": text }))?;
        Ok(text)
    }

    async fn stream_text(
        &self,
        ctx: &TaskCtx,
        user_prompt: &str,
        deltas_sent: &mut usize,
    ) -> Result<String, JobError> {
        let mut stream = self
            .generator
            .complete_stream(SYSTEM_PROMPT, user_prompt, self.settings.temperature)
            .await?;

        let mut buffer = DeltaBuffer::new(
            self.settings.delta_flush_chars,
            self.settings.delta_flush_interval,
        );
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            full.push_str(&chunk);
            if let Some(text) = buffer.push(&chunk, Instant::now()) {
                self.emit(ctx, EventKind::AiDelta, None, json!({ "text": text }))?;
                *deltas_sent += 1;
            }
        }
        if let Some(text) = buffer.finish() {
            self.emit(ctx, EventKind::AiDelta, None, json!({ "text": text }))?;
            *deltas_sent += 1;
        }

        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::TextStream;
    use crate::error::TransportError;
    use crate::infrastructure::MemoryQuestionBank;
    use crate::models::chapter::Chapter;
    use crate::models::job::Event;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预设文本的生成器
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
        stream_fails: bool,
        stream_breaks: bool,
    }

    impl ScriptedGenerator {
        fn new(responses: &[&str], stream_fails: bool) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
                stream_fails,
                stream_breaks: false,
            }
        }

        /// 流式调用先吐出一段文本再断开，阻塞调用取下一条预设文本
        fn breaking(responses: &[&str]) -> Self {
            Self {
                stream_breaks: true,
                ..Self::new(responses, false)
            }
        }

        fn next_response(&self, user_prompt: &str) -> Result<String, TransportError> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TransportError::EmptyContent { model: "fake".into() })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, _: &str, user_prompt: &str, _: f32) -> Result<String, TransportError> {
            self.next_response(user_prompt)
        }

        async fn complete_stream(
            &self,
            _: &str,
            user_prompt: &str,
            _: f32,
        ) -> Result<TextStream, TransportError> {
            if self.stream_fails {
                return Err(TransportError::api_call_failed("fake", "stream unsupported"));
            }
            let text = self.next_response(user_prompt)?;
            let mut chunks: Vec<Result<String, TransportError>> = text
                .chars()
                .collect::<Vec<_>>()
                .chunks(7)
                .map(|c| Ok(c.iter().collect()))
                .collect();
            if self.stream_breaks {
                chunks.push(Err(TransportError::api_call_failed("fake", "connection reset")));
            }
            Ok(stream::iter(chunks).boxed())
        }
    }

    fn setup(generator: Arc<ScriptedGenerator>) -> (GenerationFlow, Arc<JobRegistry>, TaskCtx) {
        let bank = Arc::new(MemoryQuestionBank::new());
        bank.add_chapter(Chapter {
            chapter_id: 7,
            textbook_id: 1,
            parent_chapter_id: None,
            chapter_name: "函数".to_string(),
            summary: String::new(),
        });
        bank.add_approved(7, 1, 1, "参考题", Some("A".into()), None);

        let registry = Arc::new(JobRegistry::default());
        registry.create("job-flow");
        let flow = GenerationFlow::new(generator, bank, registry.clone(), FlowSettings::default());
        (flow, registry, TaskCtx::new("job-flow", 0, 7, 1, 1, 5))
    }

    fn events(registry: &JobRegistry) -> Vec<Event> {
        registry.snapshot("job-flow").unwrap().events
    }

    #[tokio::test]
    async fn test_backfill_requests_only_missing_count() {
        let first = r#"[
            {"question_content": "题目一"},
            {"question_content": "题目二"},
            {"question_content": "题目三"},
            {"question_content": "  题目一 "},
            {"question_answer": "没有题干"}
        ]"#;
        let second = r#"[{"question_content": "题目四"}, {"question_content": "题目五"}]"#;
        let generator = Arc::new(ScriptedGenerator::new(&[first, second], false));
        let (flow, registry, ctx) = setup(generator.clone());

        let outcome = flow.run(&ctx).await.unwrap();
        assert_eq!(outcome.accepted(), 5);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.source_question_ids.len(), 1);

        let prompts = generator.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("目标数量：5"));
        assert!(prompts[1].contains("目标数量：2"));
        assert!(prompts[1].contains("1. 题目一"));

        let events = events(&registry);
        let parse_ok = events.iter().find(|e| e.kind == EventKind::ParseOk).unwrap();
        let data = parse_ok.data.as_ref().unwrap();
        assert_eq!(data["accepted"], 3);
        assert_eq!(data["duplicates"], 1);
        assert_eq!(data["rejected"], 1);

        let retry = events.iter().find(|e| e.kind == EventKind::RuleRetry).unwrap();
        assert_eq!(retry.data.as_ref().unwrap()["missing"], 2);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let generator = Arc::new(ScriptedGenerator::new(
            &["没有数组", "[BAD]", r#"[{"content": "唯一一道"}]"#, "[]"],
            false,
        ));
        let (flow, registry, ctx) = setup(generator.clone());

        let outcome = flow.run(&ctx).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.accepted(), 1);
        assert_eq!(generator.prompts.lock().unwrap().len(), 3);

        let warns = events(&registry)
            .iter()
            .filter(|e| e.kind == EventKind::Warn)
            .count();
        assert_eq!(warns, 2);
    }

    #[tokio::test]
    async fn test_stream_failure_falls_back_to_single_delta() {
        let text = r#"[{"content": "第一题"},
{"content": "第二题"}]"#;
        let generator = Arc::new(ScriptedGenerator::new(&[text], true));
        let (flow, registry, mut ctx) = setup(generator);
        ctx.target = 2;

        let outcome = flow.run(&ctx).await.unwrap();
        assert_eq!(outcome.accepted(), 2);

        let deltas: Vec<Event> = events(&registry)
            .into_iter()
            .filter(|e| e.kind == EventKind::AiDelta)
            .collect();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].data.as_ref().unwrap()["text"], text);
    }

    #[tokio::test]
    async fn test_streamed_deltas_reassemble_output() {
        let text = r#"[{"content": "流式第一题"}, {"content": "流式第二题"}]"#;
        let generator = Arc::new(ScriptedGenerator::new(&[text], false));
        let (flow, registry, mut ctx) = setup(generator);
        ctx.target = 2;

        flow.run(&ctx).await.unwrap();

        let joined: String = events(&registry)
            .iter()
            .filter(|e| e.kind == EventKind::AiDelta)
            .filter_map(|e| e.data.as_ref()?["text"].as_str().map(str::to_string))
            .collect();
        assert_eq!(joined, text);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let generator = Arc::new(ScriptedGenerator::new(&[], true));
        let (flow, _registry, ctx) = setup(generator);
        let err = flow.run(&ctx).await.unwrap_err();
        assert!(matches!(err, JobError::Transport(_)));
    }

    #[tokio::test]
    async fn test_broken_stream_marks_earlier_deltas_for_reset() {
        let partial = "[{\"content\": \"半截\"},\n";
        let full = r#"[{"content": "完整第一题"}, {"content": "完整第二题"}]"#;
        let generator = Arc::new(ScriptedGenerator::breaking(&[partial, full]));
        let (flow, registry, mut ctx) = setup(generator);
        ctx.target = 2;

        let outcome = flow.run(&ctx).await.unwrap();
        assert_eq!(outcome.accepted(), 2);
        assert_eq!(outcome.items[0].content, "完整第一题");

        let events = events(&registry);
        let fallback = events
            .iter()
            .position(|e| {
                e.kind == EventKind::Warn
                    && e.data.as_ref().map(|d| d["fallback"] == "complete").unwrap_or(false)
            })
            .unwrap();
        let data = events[fallback].data.as_ref().unwrap();
        assert_eq!(data["reset"], true);
        assert_eq!(data["discarded_deltas"], 1);

        let before: Vec<&Event> = events[..fallback]
            .iter()
            .filter(|e| e.kind == EventKind::AiDelta)
            .collect();
        assert_eq!(before.len(), 1);

        // 订阅方从回退点起重新拼接即可得到完整输出
        let after: String = events[fallback..]
            .iter()
            .filter(|e| e.kind == EventKind::AiDelta)
            .filter_map(|e| e.data.as_ref()?["text"].as_str().map(str::to_string))
            .collect();
        assert_eq!(after, full);
    }

    #[tokio::test]
    async fn test_unavailable_stream_fallback_needs_no_reset() {
        let text = r#"[{"content": "第一题"}]"#;
        let generator = Arc::new(ScriptedGenerator::new(&[text], true));
        let (flow, registry, mut ctx) = setup(generator);
        ctx.target = 1;

        flow.run(&ctx).await.unwrap();
        let warn = events(&registry)
            .into_iter()
            .find(|e| e.kind == EventKind::Warn)
            .unwrap();
        assert_eq!(warn.data.as_ref().unwrap()["reset"], false);
    }
}
