use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use question_gen::models::load_plan;
use question_gen::utils::logging;
use question_gen::{Config, EventKind, JobPool, LlmClient, MemoryQuestionBank};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(config.max_concurrent_jobs, &config.llm_model_name);

    let plan_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("用法: question-gen <plan.toml>")?;
    let plan = load_plan(&plan_path).await?;

    if config.llm_api_key.is_empty() {
        warn!("⚠️ 未设置 LLM_API_KEY，调用可能失败");
    }

    let bank = Arc::new(MemoryQuestionBank::from_plan(&plan));
    let generator = Arc::new(LlmClient::from_config(&config));
    let pool = JobPool::new(generator, bank.clone(), &config);

    let total = plan.request.total_count();
    let job_id = pool.submit(plan.request)?;
    info!("✓ 任务已提交: {}", job_id);

    let mut events = pool.stream_events(&job_id, 0)?;
    while let Some(event) = events.next().await {
        match event.kind {
            // 流式增量只在详细日志下打印
            EventKind::AiDelta if !config.verbose_logging => {}
            _ => info!("{}", event),
        }
    }

    let job = pool.get_snapshot(&job_id)?;
    logging::print_job_summary(&job.id, &job.status.to_string(), job.inserted_count, total);
    if let Some(error) = &job.error {
        warn!("❌ 错误: {}", error);
    }

    for (question_id, question) in bank.inserted() {
        info!(
            "  #{} [章节 {}] {}",
            question_id,
            question.chapter_id,
            logging::truncate_text(&question.content, 40)
        );
    }

    Ok(())
}
