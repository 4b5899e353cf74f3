/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；未设置时默认 `info`，`verbose` 为真时为 `debug`。
/// 重复调用不会报错（测试中可多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 工作池大小
/// - `model_name`: 使用的模型
pub fn log_startup(max_concurrent: usize, model_name: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 出题任务模式");
    info!("📊 最大并发任务数: {}", max_concurrent);
    info!("🤖 模型: {}", model_name);
    info!("{}", "=".repeat(60));
}

/// 打印任务最终统计
///
/// # 参数
/// - `job_id`: 任务 ID
/// - `status`: 终态
/// - `inserted`: 入库题数
/// - `total`: 目标题数
pub fn print_job_summary(job_id: &str, status: &str, inserted: u32, total: u32) {
    info!("\n{}", "=".repeat(60));
    info!("📊 任务完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("任务: {}", job_id);
    info!("状态: {}", status);
    info!("✅ 入库: {}/{}", inserted, total);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
        assert_eq!(truncate_text("短", 3), "短");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
    }
}
